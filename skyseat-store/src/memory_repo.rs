//! Process-local repositories.
//!
//! Same contracts as the Postgres stores, including compare-and-set semantics,
//! so the managers behave identically on either backend. Used for tests and the
//! `memory` storage backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use skyseat_core::repository::{BookingRepository, RepositoryResult, SeatRepository};
use skyseat_core::{Booking, BookingId, BookingStatus, FlightId, NewSeat, Seat, SeatId, SeatState, UserId};

pub struct InMemorySeatRepository {
    seats: RwLock<BTreeMap<SeatId, Seat>>,
    next_id: AtomicI64,
}

impl InMemorySeatRepository {
    pub fn new() -> Self {
        Self {
            seats: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Overwrites a seat without any version check. Lets tests stage states
    /// that normal transitions would never produce (orphans, aged rows).
    pub async fn force_seat(&self, seat: Seat) {
        self.seats.write().await.insert(seat.id, seat);
    }
}

impl Default for InMemorySeatRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeatRepository for InMemorySeatRepository {
    async fn create_seats(&self, seats: &[NewSeat]) -> RepositoryResult<Vec<Seat>> {
        let mut map = self.seats.write().await;

        for new in seats {
            let clash = map
                .values()
                .any(|s| s.flight_id == new.flight_id && s.seat_number == new.seat_number);
            if clash {
                return Err(format!("seat {} already exists on flight {}", new.seat_number, new.flight_id).into());
            }
        }

        let now = Utc::now();
        let mut created = Vec::with_capacity(seats.len());
        for new in seats {
            let seat = Seat {
                id: SeatId(self.next_id.fetch_add(1, Ordering::SeqCst)),
                flight_id: new.flight_id,
                seat_number: new.seat_number.clone(),
                state: SeatState::Available,
                fare_amount: new.fare_amount,
                version: 0,
                updated_at: now,
            };
            map.insert(seat.id, seat.clone());
            created.push(seat);
        }
        Ok(created)
    }

    async fn get_seat(&self, id: SeatId) -> RepositoryResult<Option<Seat>> {
        Ok(self.seats.read().await.get(&id).cloned())
    }

    async fn list_seats(&self, flight_id: FlightId) -> RepositoryResult<Vec<Seat>> {
        let map = self.seats.read().await;
        Ok(map.values().filter(|s| s.flight_id == flight_id).cloned().collect())
    }

    async fn compare_and_set(
        &self,
        id: SeatId,
        expected_version: i64,
        state: &SeatState,
        at: DateTime<Utc>,
    ) -> RepositoryResult<Option<Seat>> {
        let mut map = self.seats.write().await;
        match map.get_mut(&id) {
            Some(seat) if seat.version == expected_version => {
                seat.state = state.clone();
                seat.version += 1;
                seat.updated_at = at;
                Ok(Some(seat.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn find_expired_holds(&self, now: DateTime<Utc>) -> RepositoryResult<Vec<Seat>> {
        let map = self.seats.read().await;
        Ok(map
            .values()
            .filter(|s| matches!(s.state, SeatState::Held { hold_expires_at, .. } if hold_expires_at < now))
            .cloned()
            .collect())
    }

    async fn find_claimed_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Seat>> {
        let map = self.seats.read().await;
        Ok(map
            .values()
            .filter(|s| s.state.booking_id().is_some() && s.updated_at < cutoff)
            .cloned()
            .collect())
    }

    async fn delete_flight(&self, flight_id: FlightId) -> RepositoryResult<u64> {
        let mut map = self.seats.write().await;
        let before = map.len();
        map.retain(|_, s| s.flight_id != flight_id);
        Ok((before - map.len()) as u64)
    }
}

pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<BookingId, Booking>>,
    next_id: AtomicI64,
}

impl InMemoryBookingRepository {
    pub fn new() -> Self {
        Self {
            bookings: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Rewrites `created_at`; tests use it to age a booking past the payment timeout.
    pub async fn backdate(&self, id: BookingId, created_at: DateTime<Utc>) {
        if let Some(booking) = self.bookings.write().await.get_mut(&id) {
            booking.created_at = created_at;
        }
    }
}

impl Default for InMemoryBookingRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookingRepository for InMemoryBookingRepository {
    async fn next_booking_id(&self) -> RepositoryResult<BookingId> {
        Ok(BookingId(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn insert_booking(&self, booking: &Booking) -> RepositoryResult<()> {
        let mut map = self.bookings.write().await;
        if map.contains_key(&booking.id) {
            return Err(format!("booking {} already exists", booking.id).into());
        }
        map.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: BookingId) -> RepositoryResult<Option<Booking>> {
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn list_bookings_for_user(&self, user_id: UserId) -> RepositoryResult<Vec<Booking>> {
        let map = self.bookings.read().await;
        let mut bookings: Vec<Booking> = map.values().filter(|b| b.user_id == user_id).cloned().collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn transition_status(
        &self,
        id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let mut map = self.bookings.write().await;
        match map.get_mut(&id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                booking.updated_at = at;
                if to == BookingStatus::Cancelled {
                    booking.passengers.clear();
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn find_pending_created_before(&self, cutoff: DateTime<Utc>) -> RepositoryResult<Vec<Booking>> {
        let map = self.bookings.read().await;
        let mut pending: Vec<Booking> = map
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < cutoff)
            .cloned()
            .collect();
        pending.sort_by_key(|b| b.created_at);
        Ok(pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use skyseat_core::Passenger;

    fn new_seats(flight: i64, numbers: &[&str]) -> Vec<NewSeat> {
        numbers
            .iter()
            .map(|n| NewSeat { flight_id: FlightId(flight), seat_number: n.to_string(), fare_amount: 10_000 })
            .collect()
    }

    #[tokio::test]
    async fn test_compare_and_set_rejects_stale_version() {
        let repo = InMemorySeatRepository::new();
        let seat = repo.create_seats(&new_seats(500, &["1A"])).await.unwrap().remove(0);
        let held = SeatState::Held { holder_id: UserId(1), hold_expires_at: Utc::now() + Duration::minutes(5) };

        let first = repo.compare_and_set(seat.id, 0, &held, Utc::now()).await.unwrap();
        assert_eq!(first.map(|s| s.version), Some(1));

        // Second writer still believes version 0
        let second = repo.compare_and_set(seat.id, 0, &SeatState::Available, Utc::now()).await.unwrap();
        assert!(second.is_none());
        assert_eq!(repo.get_seat(seat.id).await.unwrap().unwrap().state, held);
    }

    #[tokio::test]
    async fn test_duplicate_seat_numbers_are_rejected_per_flight() {
        let repo = InMemorySeatRepository::new();
        repo.create_seats(&new_seats(500, &["1A", "1B"])).await.unwrap();

        assert!(repo.create_seats(&new_seats(500, &["1B"])).await.is_err());
        assert!(repo.create_seats(&new_seats(501, &["1B"])).await.is_ok());
        assert_eq!(repo.list_seats(FlightId(500)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_expired_hold_scan_is_strict() {
        let repo = InMemorySeatRepository::new();
        let seats = repo.create_seats(&new_seats(500, &["1A", "1B"])).await.unwrap();
        let now = Utc::now();

        let past = SeatState::Held { holder_id: UserId(1), hold_expires_at: now - Duration::seconds(1) };
        let exact = SeatState::Held { holder_id: UserId(2), hold_expires_at: now };
        repo.compare_and_set(seats[0].id, 0, &past, now).await.unwrap();
        repo.compare_and_set(seats[1].id, 0, &exact, now).await.unwrap();

        let expired = repo.find_expired_holds(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, seats[0].id);
    }

    #[tokio::test]
    async fn test_delete_flight_only_touches_that_flight() {
        let repo = InMemorySeatRepository::new();
        repo.create_seats(&new_seats(500, &["1A", "1B"])).await.unwrap();
        repo.create_seats(&new_seats(501, &["1A"])).await.unwrap();

        assert_eq!(repo.delete_flight(FlightId(500)).await.unwrap(), 2);
        assert!(repo.list_seats(FlightId(500)).await.unwrap().is_empty());
        assert_eq!(repo.list_seats(FlightId(501)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_cancel_transition_drops_passengers() {
        let repo = InMemoryBookingRepository::new();
        let id = repo.next_booking_id().await.unwrap();
        let passenger = Passenger {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: None,
            phone: None,
            age: None,
            seat_id: SeatId(1),
        };
        let booking = Booking::new(id, UserId(1), FlightId(500), vec![SeatId(1)], vec![passenger], 10_000, "USD");
        repo.insert_booking(&booking).await.unwrap();

        assert!(repo.transition_status(id, BookingStatus::Pending, BookingStatus::Paid, Utc::now()).await.unwrap());
        // Stale expectation loses
        assert!(!repo.transition_status(id, BookingStatus::Pending, BookingStatus::Cancelled, Utc::now()).await.unwrap());
        assert!(repo.transition_status(id, BookingStatus::Paid, BookingStatus::Cancelled, Utc::now()).await.unwrap());

        let stored = repo.get_booking(id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        assert!(stored.passengers.is_empty());
    }

    #[tokio::test]
    async fn test_pending_scan_uses_created_at() {
        let repo = InMemoryBookingRepository::new();
        let now = Utc::now();
        for _ in 0..2 {
            let id = repo.next_booking_id().await.unwrap();
            repo.insert_booking(&Booking::new(id, UserId(1), FlightId(500), vec![SeatId(id.get())], vec![], 0, "USD"))
                .await
                .unwrap();
        }
        repo.backdate(BookingId(1), now - Duration::minutes(40)).await;

        let stale = repo.find_pending_created_before(now - Duration::minutes(30)).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, BookingId(1));
    }
}
