pub mod booking;
pub mod events;
pub mod ids;
pub mod mailer;
pub mod payment;
pub mod repository;
pub mod seat;

pub use booking::{Booking, BookingStatus, Passenger};
pub use events::{EventSinkError, SeatEventSink};
pub use ids::{BookingId, FlightId, SeatId, UserId};
pub use seat::{NewSeat, Seat, SeatMapLayout, SeatState};

/// Boxed error returned across collaborator boundaries (storage, payment, mail).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Why a cancellation request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancellationRefusal {
    NotOwner,
    NotPaid(BookingStatus),
}

impl std::fmt::Display for CancellationRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancellationRefusal::NotOwner => write!(f, "booking belongs to another user"),
            CancellationRefusal::NotPaid(status) => write!(f, "booking is {}, only PAID bookings can be cancelled", status),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Seat {seat_id} not found on flight {flight_id}")]
    SeatNotFound { seat_id: SeatId, flight_id: FlightId },

    #[error("Seat {seat_id} on flight {flight_id} is not available: {reason}")]
    SeatNotAvailable {
        seat_id: SeatId,
        flight_id: FlightId,
        reason: String,
    },

    #[error("Booking validation failed: {0}")]
    BookingValidationFailed(String),

    #[error("Booking {booking_id} is not eligible for cancellation: {reason}")]
    BookingNotEligibleForCancellation {
        booking_id: BookingId,
        reason: CancellationRefusal,
    },

    #[error("Booking not found: {0}")]
    BookingNotFound(BookingId),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Flight {0} already has a seat map")]
    FlightAlreadyInitialized(FlightId),

    #[error("Invalid seat map: {0}")]
    InvalidSeatMap(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<BoxError> for InventoryError {
    fn from(err: BoxError) -> Self {
        InventoryError::Storage(err.to_string())
    }
}

pub type InventoryResult<T> = Result<T, InventoryError>;
