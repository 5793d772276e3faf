use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BookingId, FlightId, SeatId, UserId};

/// Current claim on a seat. Exactly one claimant at a time by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatState {
    Available,
    Held {
        holder_id: UserId,
        hold_expires_at: DateTime<Utc>,
    },
    Reserved {
        booking_id: BookingId,
    },
    Booked {
        booking_id: BookingId,
    },
}

impl SeatState {
    pub fn label(&self) -> &'static str {
        match self {
            SeatState::Available => "AVAILABLE",
            SeatState::Held { .. } => "HELD",
            SeatState::Reserved { .. } => "RESERVED",
            SeatState::Booked { .. } => "BOOKED",
        }
    }

    /// An expired hold is as good as no hold.
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self {
            SeatState::Available => true,
            SeatState::Held { hold_expires_at, .. } => *hold_expires_at <= now,
            SeatState::Reserved { .. } | SeatState::Booked { .. } => false,
        }
    }

    pub fn is_expired_hold(&self, now: DateTime<Utc>) -> bool {
        matches!(self, SeatState::Held { hold_expires_at, .. } if *hold_expires_at <= now)
    }

    pub fn holder(&self) -> Option<UserId> {
        match self {
            SeatState::Held { holder_id, .. } => Some(*holder_id),
            _ => None,
        }
    }

    pub fn booking_id(&self) -> Option<BookingId> {
        match self {
            SeatState::Reserved { booking_id } | SeatState::Booked { booking_id } => Some(*booking_id),
            _ => None,
        }
    }
}

impl std::fmt::Display for SeatState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: SeatId,
    pub flight_id: FlightId,
    pub seat_number: String,
    #[serde(flatten)]
    pub state: SeatState,
    /// Minor currency units.
    pub fare_amount: i64,
    /// Compare-and-set token, bumped on every state write.
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl Seat {
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        self.state.is_claimable(now)
    }
}

/// A seat row waiting to be inserted by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSeat {
    pub flight_id: FlightId,
    pub seat_number: String,
    pub fare_amount: i64,
}

/// Cabin layout used when a flight's seat map is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatMapLayout {
    pub rows: u32,
    pub letters: String,
}

impl SeatMapLayout {
    pub fn new(rows: u32, letters: impl Into<String>) -> Self {
        Self { rows, letters: letters.into() }
    }

    /// Seat numbers in row-major order: `1A, 1B, ..., 10F`.
    pub fn seat_numbers(&self) -> Vec<String> {
        (1..=self.rows)
            .flat_map(|row| self.letters.chars().map(move |letter| format!("{}{}", row, letter)))
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.rows as usize * self.letters.chars().count()
    }
}

impl Default for SeatMapLayout {
    fn default() -> Self {
        Self::new(10, "ABCDEF")
    }
}
