use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::booking::{Booking, BookingStatus};
use crate::ids::{BookingId, FlightId, SeatId, UserId};
use crate::seat::{NewSeat, Seat, SeatState};
use crate::BoxError;

pub type RepositoryResult<T> = Result<T, BoxError>;

/// Durable seat store. Pure data access: every policy decision lives in the hold manager.
#[async_trait]
pub trait SeatRepository: Send + Sync {
    /// Inserts the seats of one flight in a single unit; returns them with ids assigned.
    async fn create_seats(&self, seats: &[NewSeat]) -> RepositoryResult<Vec<Seat>>;

    async fn get_seat(&self, id: SeatId) -> RepositoryResult<Option<Seat>>;

    /// Ordered by seat id.
    async fn list_seats(&self, flight_id: FlightId) -> RepositoryResult<Vec<Seat>>;

    /// Writes `state` only if the stored version still equals `expected_version`.
    /// Returns the updated row, or `None` when another writer got there first.
    async fn compare_and_set(
        &self,
        id: SeatId,
        expected_version: i64,
        state: &SeatState,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Seat>>;

    /// Held seats whose expiry is strictly before `now`.
    async fn find_expired_holds(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Seat>>;

    /// Reserved or booked seats last written before `cutoff`.
    async fn find_claimed_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Seat>>;

    /// Removes the flight's seat map. Returns how many seats were deleted.
    async fn delete_flight(&self, flight_id: FlightId) -> RepositoryResult<u64>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Allocates an id before the booking row exists so seats can reference it.
    async fn next_booking_id(&self) -> RepositoryResult<BookingId>;

    async fn insert_booking(&self, booking: &Booking) -> RepositoryResult<()>;

    async fn get_booking(&self, id: BookingId) -> RepositoryResult<Option<Booking>>;

    /// Newest first.
    async fn list_bookings_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Booking>>;

    /// Moves the booking from `from` to `to` only if it is still in `from`.
    /// A move to `Cancelled` deletes the passenger records in the same unit.
    async fn transition_status(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool>;

    async fn find_pending_created_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Booking>>;
}
