use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a seat changed, as shown to seat-map viewers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeatUpdateKind {
    Held,
    Released,
    HoldExpired,
    Reserved,
    Booked,
    /// Returned to sale by a user cancellation.
    Available,
    FixedInconsistency,
}

impl SeatUpdateKind {
    /// Whether a seat in this state can be picked by another viewer.
    pub fn is_available(self) -> bool {
        matches!(
            self,
            SeatUpdateKind::Released
                | SeatUpdateKind::HoldExpired
                | SeatUpdateKind::Available
                | SeatUpdateKind::FixedInconsistency
        )
    }

    pub fn label(self) -> &'static str {
        match self {
            SeatUpdateKind::Held => "HELD",
            SeatUpdateKind::Released => "RELEASED",
            SeatUpdateKind::HoldExpired => "HOLD_EXPIRED",
            SeatUpdateKind::Reserved => "RESERVED",
            SeatUpdateKind::Booked => "BOOKED",
            SeatUpdateKind::Available => "AVAILABLE",
            SeatUpdateKind::FixedInconsistency => "FIXED_INCONSISTENCY",
        }
    }
}

impl std::fmt::Display for SeatUpdateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Broadcast to every viewer of a flight's seat map.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct SeatUpdateEvent {
    pub flight_id: i64,
    pub seat_id: i64,
    pub available: bool,
    pub status: SeatUpdateKind,
    /// Unix epoch milliseconds.
    pub timestamp: i64,
}

impl SeatUpdateEvent {
    pub fn new(flight_id: i64, seat_id: i64, status: SeatUpdateKind, at: DateTime<Utc>) -> Self {
        Self {
            flight_id,
            seat_id,
            available: status.is_available(),
            status,
            timestamp: at.timestamp_millis(),
        }
    }
}
