use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use skyseat_shared::pii::Masked;
use std::collections::HashSet;

use crate::ids::{BookingId, FlightId, SeatId, UserId};
use crate::InventoryError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Paid,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Paid => "PAID",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(BookingStatus::Pending),
            "PAID" => Some(BookingStatus::Paid),
            "CANCELLED" => Some(BookingStatus::Cancelled),
            _ => None,
        }
    }

    /// PENDING -> {PAID, CANCELLED}, PAID -> CANCELLED.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Paid)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Paid, BookingStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traveller occupying one seat of a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Passenger {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<Masked<String>>,
    #[serde(default)]
    pub phone: Option<Masked<String>>,
    #[serde(default)]
    pub age: Option<u32>,
    pub seat_id: SeatId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub user_id: UserId,
    pub flight_id: FlightId,
    /// Insertion order is preserved, ids are unique.
    pub seat_ids: Vec<SeatId>,
    pub passengers: Vec<Passenger>,
    pub status: BookingStatus,
    /// Minor currency units.
    pub total_amount: i64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(
        id: BookingId,
        user_id: UserId,
        flight_id: FlightId,
        seat_ids: Vec<SeatId>,
        passengers: Vec<Passenger>,
        total_amount: i64,
        currency: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            flight_id,
            seat_ids,
            passengers,
            status: BookingStatus::Pending,
            total_amount,
            currency: currency.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status != BookingStatus::Cancelled
    }

    pub fn holds_seat(&self, seat_id: SeatId) -> bool {
        self.seat_ids.contains(&seat_id)
    }
}

/// Checks the seat list of a booking request: non-empty and free of duplicates.
pub fn validate_seat_selection(seat_ids: &[SeatId]) -> Result<(), InventoryError> {
    if seat_ids.is_empty() {
        return Err(InventoryError::BookingValidationFailed("at least one seat is required".to_string()));
    }

    let mut seen = HashSet::new();
    for seat_id in seat_ids {
        if !seen.insert(*seat_id) {
            return Err(InventoryError::BookingValidationFailed(format!("seat {} requested twice", seat_id)));
        }
    }
    Ok(())
}

/// Passenger data, when supplied, must cover every requested seat exactly once.
pub fn validate_passengers(seat_ids: &[SeatId], passengers: &[Passenger]) -> Result<(), InventoryError> {
    if passengers.len() != seat_ids.len() {
        return Err(InventoryError::BookingValidationFailed(format!(
            "expected {} passengers, got {}",
            seat_ids.len(),
            passengers.len()
        )));
    }

    let requested: HashSet<SeatId> = seat_ids.iter().copied().collect();
    let mut assigned = HashSet::new();

    for passenger in passengers {
        if passenger.first_name.trim().is_empty() || passenger.last_name.trim().is_empty() {
            return Err(InventoryError::BookingValidationFailed(format!(
                "passenger for seat {} is missing a name",
                passenger.seat_id
            )));
        }
        if !requested.contains(&passenger.seat_id) {
            return Err(InventoryError::BookingValidationFailed(format!(
                "passenger assigned to seat {} which is not part of the booking",
                passenger.seat_id
            )));
        }
        if !assigned.insert(passenger.seat_id) {
            return Err(InventoryError::BookingValidationFailed(format!(
                "seat {} has more than one passenger",
                passenger.seat_id
            )));
        }
    }
    Ok(())
}
