use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use skyseat_core::repository::{BookingRepository, SeatRepository};
use skyseat_core::{
    BookingId, BookingStatus, FlightId, InventoryError, InventoryResult, NewSeat, Seat, SeatEventSink, SeatId,
    SeatMapLayout, SeatState, UserId,
};
use skyseat_shared::SeatUpdateKind;

use crate::emit;

/// Attempts per claim before a lost compare-and-set race is reported as unavailable.
const MAX_CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct HoldSettings {
    pub hold_ttl: Duration,
    /// Minimum age of a reserved/booked seat before the repair pass may touch it.
    pub orphan_grace: Duration,
    pub expiry_timers: bool,
}

impl Default for HoldSettings {
    fn default() -> Self {
        Self {
            hold_ttl: Duration::minutes(5),
            orphan_grace: Duration::minutes(5),
            expiry_timers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HoldResult {
    pub seat: Seat,
    pub hold_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub repaired: usize,
    pub failed: usize,
}

/// Owns the seat state machine.
///
/// Every write is a compare-and-set on the seat's version, so concurrent
/// claims on one seat serialize in the registry rather than in this process.
#[derive(Clone)]
pub struct HoldManager {
    seats: Arc<dyn SeatRepository>,
    bookings: Arc<dyn BookingRepository>,
    events: Arc<dyn SeatEventSink>,
    settings: HoldSettings,
}

impl HoldManager {
    pub fn new(
        seats: Arc<dyn SeatRepository>,
        bookings: Arc<dyn BookingRepository>,
        events: Arc<dyn SeatEventSink>,
        settings: HoldSettings,
    ) -> Self {
        Self { seats, bookings, events, settings }
    }

    pub fn hold_ttl(&self) -> Duration {
        self.settings.hold_ttl
    }

    // ---- seat map ----

    pub async fn initialize_flight(
        &self,
        flight_id: FlightId,
        layout: &SeatMapLayout,
        fare_amount: i64,
    ) -> InventoryResult<Vec<Seat>> {
        if layout.capacity() == 0 {
            return Err(InventoryError::InvalidSeatMap("layout has no seats".to_string()));
        }
        if !layout.letters.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(InventoryError::InvalidSeatMap(format!("seat letters must be A-Z, got {}", layout.letters)));
        }
        if fare_amount < 0 {
            return Err(InventoryError::InvalidSeatMap("fare cannot be negative".to_string()));
        }

        if !self.seats.list_seats(flight_id).await?.is_empty() {
            return Err(InventoryError::FlightAlreadyInitialized(flight_id));
        }

        let new_seats: Vec<NewSeat> = layout
            .seat_numbers()
            .into_iter()
            .map(|seat_number| NewSeat { flight_id, seat_number, fare_amount })
            .collect();

        let created = self.seats.create_seats(&new_seats).await?;
        info!(flight_id = %flight_id, seats = created.len(), "Seat map initialized");
        Ok(created)
    }

    /// Full snapshot, used by viewers to resync after reconnecting.
    pub async fn seat_map(&self, flight_id: FlightId) -> InventoryResult<Vec<Seat>> {
        Ok(self.seats.list_seats(flight_id).await?)
    }

    pub async fn delete_flight(&self, flight_id: FlightId) -> InventoryResult<u64> {
        let removed = self.seats.delete_flight(flight_id).await?;
        info!(flight_id = %flight_id, removed, "Seat map deleted");
        Ok(removed)
    }

    /// Loads a seat and checks it belongs to `flight_id`.
    pub async fn seat(&self, seat_id: SeatId, flight_id: FlightId) -> InventoryResult<Seat> {
        match self.seats.get_seat(seat_id).await? {
            Some(seat) if seat.flight_id == flight_id => Ok(seat),
            _ => Err(InventoryError::SeatNotFound { seat_id, flight_id }),
        }
    }

    // ---- holds ----

    pub async fn hold(&self, seat_id: SeatId, flight_id: FlightId, holder_id: UserId) -> InventoryResult<HoldResult> {
        self.hold_at(seat_id, flight_id, holder_id, Utc::now()).await
    }

    pub async fn hold_at(
        &self,
        seat_id: SeatId,
        flight_id: FlightId,
        holder_id: UserId,
        now: DateTime<Utc>,
    ) -> InventoryResult<HoldResult> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let seat = self.seat(seat_id, flight_id).await?;

            if !seat.state.is_claimable(now) {
                warn!(seat_id = %seat_id, flight_id = %flight_id, holder_id = %holder_id, state = %seat.state, "Hold rejected");
                return Err(InventoryError::SeatNotAvailable {
                    seat_id,
                    flight_id,
                    reason: format!("seat is {}", seat.state),
                });
            }

            let hold_expires_at = now + self.settings.hold_ttl;
            let next = SeatState::Held { holder_id, hold_expires_at };

            match self.seats.compare_and_set(seat_id, seat.version, &next, now).await? {
                Some(updated) => {
                    info!(seat_id = %seat_id, flight_id = %flight_id, holder_id = %holder_id, expires_at = %hold_expires_at, "Seat held");
                    emit(self.events.as_ref(), flight_id, seat_id, SeatUpdateKind::Held, now);
                    if self.settings.expiry_timers {
                        self.spawn_expiry_timer(seat_id, holder_id, hold_expires_at);
                    }
                    return Ok(HoldResult { seat: updated, hold_expires_at });
                }
                None => debug!(seat_id = %seat_id, attempt, "Hold lost a version race, re-reading"),
            }
        }

        Err(InventoryError::SeatNotAvailable {
            seat_id,
            flight_id,
            reason: "seat changed concurrently".to_string(),
        })
    }

    /// Idempotent. Returns whether this call released the seat.
    pub async fn release(&self, seat_id: SeatId, flight_id: FlightId, holder_id: UserId) -> InventoryResult<bool> {
        self.release_at(seat_id, flight_id, holder_id, Utc::now()).await
    }

    pub async fn release_at(
        &self,
        seat_id: SeatId,
        flight_id: FlightId,
        holder_id: UserId,
        now: DateTime<Utc>,
    ) -> InventoryResult<bool> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let seat = self.seat(seat_id, flight_id).await?;

            // The holder may always let go; anyone may clear a dead hold.
            let releasable = match &seat.state {
                SeatState::Held { holder_id: owner, hold_expires_at } => *owner == holder_id || *hold_expires_at <= now,
                _ => false,
            };
            if !releasable {
                debug!(seat_id = %seat_id, holder_id = %holder_id, state = %seat.state, "Release is a no-op");
                return Ok(false);
            }

            if self.seats.compare_and_set(seat_id, seat.version, &SeatState::Available, now).await?.is_some() {
                info!(seat_id = %seat_id, flight_id = %flight_id, holder_id = %holder_id, "Seat released");
                emit(self.events.as_ref(), flight_id, seat_id, SeatUpdateKind::Released, now);
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Turns the caller's live hold into a reservation for `booking_id`.
    /// Publishing is left to the booking manager, which knows when the booking is durable.
    pub async fn finalize_as_reservation(
        &self,
        seat_id: SeatId,
        flight_id: FlightId,
        booking_id: BookingId,
        holder_id: UserId,
        now: DateTime<Utc>,
    ) -> InventoryResult<Seat> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let seat = self.seat(seat_id, flight_id).await?;

            let reason = match &seat.state {
                SeatState::Held { holder_id: owner, hold_expires_at } if *owner == holder_id && *hold_expires_at > now => None,
                SeatState::Held { holder_id: owner, .. } if *owner == holder_id => Some("hold expired".to_string()),
                SeatState::Held { .. } => Some("held by another user".to_string()),
                other => Some(format!("seat is {}, not held", other)),
            };
            if let Some(reason) = reason {
                return Err(InventoryError::SeatNotAvailable { seat_id, flight_id, reason });
            }

            let next = SeatState::Reserved { booking_id };
            if let Some(updated) = self.seats.compare_and_set(seat_id, seat.version, &next, now).await? {
                debug!(seat_id = %seat_id, booking_id = %booking_id, "Seat reserved");
                return Ok(updated);
            }
        }

        Err(InventoryError::SeatNotAvailable {
            seat_id,
            flight_id,
            reason: "seat changed concurrently".to_string(),
        })
    }

    /// `RESERVED{b} -> BOOKED{b}`. False when the seat no longer references `b`.
    pub async fn confirm_booked(&self, seat_id: SeatId, booking_id: BookingId, now: DateTime<Utc>) -> InventoryResult<bool> {
        self.move_booked_seat(seat_id, booking_id, now, |state| match state {
            SeatState::Reserved { booking_id: b } => Some(SeatState::Booked { booking_id: *b }),
            _ => None,
        })
        .await
    }

    /// `RESERVED{b} | BOOKED{b} -> AVAILABLE`. False when the seat no longer references `b`.
    pub async fn revert_to_available(&self, seat_id: SeatId, booking_id: BookingId, now: DateTime<Utc>) -> InventoryResult<bool> {
        self.move_booked_seat(seat_id, booking_id, now, |state| match state {
            SeatState::Reserved { .. } | SeatState::Booked { .. } => Some(SeatState::Available),
            _ => None,
        })
        .await
    }

    async fn move_booked_seat<F>(&self, seat_id: SeatId, booking_id: BookingId, now: DateTime<Utc>, next: F) -> InventoryResult<bool>
    where
        F: Fn(&SeatState) -> Option<SeatState> + Send + Sync,
    {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let Some(seat) = self.seats.get_seat(seat_id).await? else {
                warn!(seat_id = %seat_id, booking_id = %booking_id, "Seat vanished while updating its booking");
                return Ok(false);
            };
            if seat.state.booking_id() != Some(booking_id) {
                return Ok(false);
            }
            let Some(target) = next(&seat.state) else {
                return Ok(false);
            };
            if self.seats.compare_and_set(seat_id, seat.version, &target, now).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    // ---- reconciliation ----

    pub async fn run_expiry_sweep(&self) -> InventoryResult<SweepReport> {
        self.run_expiry_sweep_at(Utc::now()).await
    }

    /// Releases every lapsed hold, then repairs orphan reservations.
    /// Per-seat failures are counted and logged; they never stop the sweep.
    pub async fn run_expiry_sweep_at(&self, now: DateTime<Utc>) -> InventoryResult<SweepReport> {
        let mut report = SweepReport::default();

        for seat in self.seats.find_expired_holds(now).await? {
            match self.expire_hold(&seat, now).await {
                Ok(true) => report.expired += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(seat_id = %seat.id, "Failed to expire hold: {}", e);
                    report.failed += 1;
                }
            }
        }

        let cutoff = now - self.settings.orphan_grace;
        for seat in self.seats.find_claimed_before(cutoff).await? {
            match self.repair_if_orphaned(&seat, now).await {
                Ok(true) => report.repaired += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(seat_id = %seat.id, "Failed to repair seat: {}", e);
                    report.failed += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(expired = report.expired, repaired = report.repaired, failed = report.failed, "Hold sweep finished");
        }
        Ok(report)
    }

    async fn expire_hold(&self, seat: &Seat, now: DateTime<Utc>) -> InventoryResult<bool> {
        if !seat.state.is_expired_hold(now) {
            return Ok(false);
        }
        // A lost race means someone else already moved the seat on.
        let released = self
            .seats
            .compare_and_set(seat.id, seat.version, &SeatState::Available, now)
            .await?
            .is_some();
        if released {
            info!(seat_id = %seat.id, flight_id = %seat.flight_id, "Hold expired");
            emit(self.events.as_ref(), seat.flight_id, seat.id, SeatUpdateKind::HoldExpired, now);
        }
        Ok(released)
    }

    async fn repair_if_orphaned(&self, seat: &Seat, now: DateTime<Utc>) -> InventoryResult<bool> {
        let Some(booking_id) = seat.state.booking_id() else {
            return Ok(false);
        };

        let orphaned = match self.bookings.get_booking(booking_id).await? {
            None => true,
            Some(booking) => booking.status == BookingStatus::Cancelled || !booking.holds_seat(seat.id),
        };
        if !orphaned {
            return Ok(false);
        }

        let repaired = self
            .seats
            .compare_and_set(seat.id, seat.version, &SeatState::Available, now)
            .await?
            .is_some();
        if repaired {
            warn!(seat_id = %seat.id, flight_id = %seat.flight_id, booking_id = %booking_id, "Repaired orphan reservation");
            emit(self.events.as_ref(), seat.flight_id, seat.id, SeatUpdateKind::FixedInconsistency, now);
        }
        Ok(repaired)
    }

    fn spawn_expiry_timer(&self, seat_id: SeatId, holder_id: UserId, hold_expires_at: DateTime<Utc>) {
        let manager = self.clone();
        tokio::spawn(async move {
            let wait = (hold_expires_at - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            if let Err(e) = manager.expire_if_unchanged(seat_id, holder_id, hold_expires_at).await {
                error!(seat_id = %seat_id, "Hold expiry timer failed: {}", e);
            }
        });
    }

    /// Only touches the exact hold the timer was started for.
    async fn expire_if_unchanged(&self, seat_id: SeatId, holder_id: UserId, hold_expires_at: DateTime<Utc>) -> InventoryResult<bool> {
        let Some(seat) = self.seats.get_seat(seat_id).await? else {
            return Ok(false);
        };
        let same_hold = seat.state == SeatState::Held { holder_id, hold_expires_at };
        if !same_hold {
            return Ok(false);
        }
        self.expire_hold(&seat, Utc::now()).await
    }
}
