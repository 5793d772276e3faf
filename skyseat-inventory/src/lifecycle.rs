use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use skyseat_core::booking::{validate_passengers, validate_seat_selection};
use skyseat_core::mailer::BookingMailer;
use skyseat_core::repository::BookingRepository;
use skyseat_core::{
    Booking, BookingId, BookingStatus, CancellationRefusal, FlightId, InventoryError, InventoryResult, Passenger,
    SeatEventSink, SeatId, UserId,
};
use skyseat_shared::SeatUpdateKind;

use crate::emit;
use crate::hold::HoldManager;

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub payment_timeout: Duration,
    pub currency: String,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            payment_timeout: Duration::minutes(30),
            currency: "USD".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Notice {
    Confirmation,
    Cancellation,
    PaymentTimeout,
}

/// Drives bookings through `PENDING -> PAID -> CANCELLED` and keeps their
/// seats in step. Status writes are compare-and-set on the current status,
/// so a payment callback and the timeout sweep can never both win.
#[derive(Clone)]
pub struct BookingManager {
    bookings: Arc<dyn BookingRepository>,
    holds: HoldManager,
    events: Arc<dyn SeatEventSink>,
    mailer: Arc<dyn BookingMailer>,
    settings: BookingSettings,
}

impl BookingManager {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        holds: HoldManager,
        events: Arc<dyn SeatEventSink>,
        mailer: Arc<dyn BookingMailer>,
        settings: BookingSettings,
    ) -> Self {
        Self { bookings, holds, events, mailer, settings }
    }

    pub async fn booking(&self, booking_id: BookingId) -> InventoryResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or(InventoryError::BookingNotFound(booking_id))
    }

    pub async fn bookings_for_user(&self, user_id: UserId) -> InventoryResult<Vec<Booking>> {
        Ok(self.bookings.list_bookings_for_user(user_id).await?)
    }

    pub async fn create_booking(
        &self,
        user_id: UserId,
        flight_id: FlightId,
        seat_ids: Vec<SeatId>,
        passengers: Option<Vec<Passenger>>,
    ) -> InventoryResult<Booking> {
        self.create_booking_at(user_id, flight_id, seat_ids, passengers, Utc::now()).await
    }

    /// All or nothing: either every seat ends up `RESERVED` for the new booking,
    /// or every seat finalized by this call is returned to sale and nothing is stored.
    pub async fn create_booking_at(
        &self,
        user_id: UserId,
        flight_id: FlightId,
        seat_ids: Vec<SeatId>,
        passengers: Option<Vec<Passenger>>,
        now: DateTime<Utc>,
    ) -> InventoryResult<Booking> {
        validate_seat_selection(&seat_ids)?;
        if let Some(passengers) = &passengers {
            validate_passengers(&seat_ids, passengers)?;
        }

        let mut total_amount = 0;
        for seat_id in &seat_ids {
            let seat = self.holds.seat(*seat_id, flight_id).await.map_err(as_validation)?;
            total_amount += seat.fare_amount;
        }

        let booking_id = self.bookings.next_booking_id().await?;
        let mut finalized = Vec::with_capacity(seat_ids.len());

        for seat_id in &seat_ids {
            match self.holds.finalize_as_reservation(*seat_id, flight_id, booking_id, user_id, now).await {
                Ok(_) => finalized.push(*seat_id),
                Err(e) => {
                    warn!(booking_id = %booking_id, seat_id = %seat_id, "Booking aborted: {}", e);
                    self.roll_back(flight_id, booking_id, &finalized, now).await;
                    return Err(as_validation(e));
                }
            }
        }

        let mut booking = Booking::new(
            booking_id,
            user_id,
            flight_id,
            seat_ids,
            passengers.unwrap_or_default(),
            total_amount,
            self.settings.currency.clone(),
        );
        booking.created_at = now;
        booking.updated_at = now;

        if let Err(e) = self.bookings.insert_booking(&booking).await {
            error!(booking_id = %booking_id, "Failed to persist booking: {}", e);
            self.roll_back(flight_id, booking_id, &finalized, now).await;
            return Err(e.into());
        }

        for seat_id in &booking.seat_ids {
            emit(self.events.as_ref(), flight_id, *seat_id, SeatUpdateKind::Reserved, now);
        }
        info!(
            booking_id = %booking_id,
            user_id = %user_id,
            flight_id = %flight_id,
            seats = booking.seat_ids.len(),
            total = booking.total_amount,
            "Booking created, awaiting payment"
        );
        Ok(booking)
    }

    pub async fn record_payment_result(&self, booking_id: BookingId, success: bool) -> InventoryResult<Booking> {
        self.record_payment_result_at(booking_id, success, Utc::now()).await
    }

    pub async fn record_payment_result_at(
        &self,
        booking_id: BookingId,
        success: bool,
        now: DateTime<Utc>,
    ) -> InventoryResult<Booking> {
        let booking = self.booking(booking_id).await?;
        let target = if success { BookingStatus::Paid } else { BookingStatus::Cancelled };

        if booking.status != BookingStatus::Pending {
            return Err(InventoryError::InvalidTransition {
                from: booking.status.to_string(),
                to: target.to_string(),
            });
        }

        if !success {
            return match self.cancel_pending(booking, now).await? {
                Some(cancelled) => Ok(cancelled),
                None => Err(self.lost_race(booking_id, target).await),
            };
        }

        if !self.move_status(booking_id, BookingStatus::Pending, BookingStatus::Paid, now).await? {
            return Err(self.lost_race(booking_id, target).await);
        }

        for seat_id in &booking.seat_ids {
            match self.holds.confirm_booked(*seat_id, booking_id, now).await {
                Ok(true) => emit(self.events.as_ref(), booking.flight_id, *seat_id, SeatUpdateKind::Booked, now),
                Ok(false) => warn!(booking_id = %booking_id, seat_id = %seat_id, "Seat no longer reserved for paid booking"),
                Err(e) => error!(booking_id = %booking_id, seat_id = %seat_id, "Failed to mark seat booked: {}", e),
            }
        }

        let paid = Booking { status: BookingStatus::Paid, updated_at: now, ..booking };
        info!(booking_id = %booking_id, "Payment succeeded, booking PAID");
        self.send_notice(&paid, Notice::Confirmation);
        Ok(paid)
    }

    /// Cancels a paid booking on behalf of its owner and returns the seats to sale.
    pub async fn cancel(&self, booking_id: BookingId, requesting_user: UserId) -> InventoryResult<Booking> {
        self.cancel_at(booking_id, requesting_user, Utc::now()).await
    }

    pub async fn cancel_at(
        &self,
        booking_id: BookingId,
        requesting_user: UserId,
        now: DateTime<Utc>,
    ) -> InventoryResult<Booking> {
        let booking = self.booking(booking_id).await?;

        if booking.user_id != requesting_user {
            return Err(InventoryError::BookingNotEligibleForCancellation {
                booking_id,
                reason: CancellationRefusal::NotOwner,
            });
        }
        if booking.status != BookingStatus::Paid {
            return Err(InventoryError::BookingNotEligibleForCancellation {
                booking_id,
                reason: CancellationRefusal::NotPaid(booking.status),
            });
        }

        if !self.move_status(booking_id, BookingStatus::Paid, BookingStatus::Cancelled, now).await? {
            let current = self.booking(booking_id).await?.status;
            return Err(InventoryError::BookingNotEligibleForCancellation {
                booking_id,
                reason: CancellationRefusal::NotPaid(current),
            });
        }

        self.release_seats(&booking, SeatUpdateKind::Available, now).await;

        let cancelled = Booking {
            status: BookingStatus::Cancelled,
            passengers: Vec::new(),
            updated_at: now,
            ..booking
        };
        info!(booking_id = %booking_id, user_id = %requesting_user, "Booking cancelled by user");
        self.send_notice(&cancelled, Notice::Cancellation);
        Ok(cancelled)
    }

    pub async fn run_payment_timeout_sweep(&self) -> InventoryResult<usize> {
        self.run_payment_timeout_sweep_at(Utc::now()).await
    }

    /// Cancels every `PENDING` booking older than the payment timeout as a payment failure.
    pub async fn run_payment_timeout_sweep_at(&self, now: DateTime<Utc>) -> InventoryResult<usize> {
        let cutoff = now - self.settings.payment_timeout;
        let stale = self.bookings.find_pending_created_before(cutoff).await?;
        let mut expired = 0;

        for booking in stale {
            let booking_id = booking.id;
            match self.cancel_pending(booking, now).await {
                Ok(Some(cancelled)) => {
                    expired += 1;
                    info!(booking_id = %booking_id, "Booking payment timed out");
                    self.send_notice(&cancelled, Notice::PaymentTimeout);
                }
                Ok(None) => debug!(booking_id = %booking_id, "Booking settled before timeout could apply"),
                Err(e) => error!(booking_id = %booking_id, "Failed to expire booking: {}", e),
            }
        }

        if expired > 0 {
            info!(expired, "Payment timeout sweep finished");
        }
        Ok(expired)
    }

    /// `PENDING -> CANCELLED` plus seat release. `None` when the status moved first.
    async fn cancel_pending(&self, booking: Booking, now: DateTime<Utc>) -> InventoryResult<Option<Booking>> {
        if !self.move_status(booking.id, BookingStatus::Pending, BookingStatus::Cancelled, now).await? {
            return Ok(None);
        }

        self.release_seats(&booking, SeatUpdateKind::Released, now).await;
        info!(booking_id = %booking.id, "Unpaid booking cancelled, seats released");

        Ok(Some(Booking {
            status: BookingStatus::Cancelled,
            passengers: Vec::new(),
            updated_at: now,
            ..booking
        }))
    }

    /// Status compare-and-set, refusing edges the booking state machine does not have.
    /// False when the stored status is no longer `from`.
    async fn move_status(
        &self,
        booking_id: BookingId,
        from: BookingStatus,
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> InventoryResult<bool> {
        if !from.can_transition_to(to) {
            return Err(InventoryError::InvalidTransition { from: from.to_string(), to: to.to_string() });
        }
        Ok(self.bookings.transition_status(booking_id, from, to, now).await?)
    }

    async fn release_seats(&self, booking: &Booking, kind: SeatUpdateKind, now: DateTime<Utc>) {
        for seat_id in &booking.seat_ids {
            match self.holds.revert_to_available(*seat_id, booking.id, now).await {
                Ok(true) => emit(self.events.as_ref(), booking.flight_id, *seat_id, kind, now),
                Ok(false) => debug!(booking_id = %booking.id, seat_id = %seat_id, "Seat already detached from booking"),
                Err(e) => error!(booking_id = %booking.id, seat_id = %seat_id, "Failed to release seat: {}", e),
            }
        }
    }

    async fn roll_back(&self, flight_id: FlightId, booking_id: BookingId, finalized: &[SeatId], now: DateTime<Utc>) {
        for seat_id in finalized {
            match self.holds.revert_to_available(*seat_id, booking_id, now).await {
                Ok(true) => emit(self.events.as_ref(), flight_id, *seat_id, SeatUpdateKind::Released, now),
                Ok(false) => {}
                // The repair pass picks this seat up once the grace period passes.
                Err(e) => error!(booking_id = %booking_id, seat_id = %seat_id, "Rollback failed: {}", e),
            }
        }
    }

    async fn lost_race(&self, booking_id: BookingId, target: BookingStatus) -> InventoryError {
        let from = match self.bookings.get_booking(booking_id).await {
            Ok(Some(current)) => current.status.to_string(),
            _ => "UNKNOWN".to_string(),
        };
        InventoryError::InvalidTransition { from, to: target.to_string() }
    }

    fn send_notice(&self, booking: &Booking, notice: Notice) {
        let mailer = self.mailer.clone();
        let booking = booking.clone();
        tokio::spawn(async move {
            let result = match notice {
                Notice::Confirmation => mailer.send_booking_confirmation(&booking).await,
                Notice::Cancellation => mailer.send_cancellation_notice(&booking).await,
                Notice::PaymentTimeout => mailer.send_payment_timeout_notice(&booking).await,
            };
            if let Err(e) = result {
                error!(booking_id = %booking.id, ?notice, "Failed to send booking mail: {}", e);
            }
        });
    }
}

/// Seat problems during booking are reported as a failed booking request.
fn as_validation(err: InventoryError) -> InventoryError {
    match err {
        InventoryError::SeatNotFound { .. } | InventoryError::SeatNotAvailable { .. } => {
            InventoryError::BookingValidationFailed(err.to_string())
        }
        other => other,
    }
}
