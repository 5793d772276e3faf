use skyseat_core::payment::{PaymentAdapter, PaymentRequest, PaymentStatus};
use skyseat_core::{Booking, BoxError, InventoryResult};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::lifecycle::BookingManager;

/// Charges bookings out-of-band and feeds the outcome back into the lifecycle.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
    bookings: BookingManager,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>, bookings: BookingManager) -> Self {
        Self { adapter, bookings }
    }

    /// Charges the booking total. A gateway error counts as a declined payment.
    pub async fn settle(&self, booking: &Booking) -> InventoryResult<Booking> {
        let request = PaymentRequest {
            booking_id: booking.id,
            user_id: booking.user_id,
            amount: booking.total_amount,
            currency: booking.currency.clone(),
            reference: PaymentRequest::reference_for(booking.id),
        };

        let success = match self.adapter.charge(&request).await {
            Ok(status) => status.is_success(),
            Err(e) => {
                tracing::warn!(booking_id = %booking.id, "Payment gateway error, treating as failure: {}", e);
                false
            }
        };

        tracing::info!(booking_id = %booking.id, amount = booking.total_amount, success, "Payment attempt finished");
        self.bookings.record_payment_result(booking.id, success).await
    }

    /// Fire-and-forget variant used by request handlers.
    pub fn spawn_settlement(&self, booking: Booking) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.settle(&booking).await {
                tracing::error!(booking_id = %booking.id, "Failed to record payment result: {}", e);
            }
        })
    }
}

/// What the mock gateway answers for every charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutcome {
    Approve,
    Decline,
    /// Simulated gateway outage.
    Error,
}

pub struct MockPaymentAdapter {
    outcome: MockOutcome,
}

impl MockPaymentAdapter {
    pub fn new(outcome: MockOutcome) -> Self {
        Self { outcome }
    }

    pub fn approving() -> Self {
        Self::new(MockOutcome::Approve)
    }
}

#[async_trait::async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    async fn charge(&self, request: &PaymentRequest) -> Result<PaymentStatus, BoxError> {
        tracing::info!(
            reference = %request.reference,
            amount = request.amount,
            currency = %request.currency,
            outcome = ?self.outcome,
            "Mock payment gateway charging"
        );
        match self.outcome {
            MockOutcome::Approve => Ok(PaymentStatus::Succeeded),
            MockOutcome::Decline => Ok(PaymentStatus::Failed),
            MockOutcome::Error => Err("Simulated Payment Gateway Failure".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use skyseat_core::{BookingStatus, FlightId, SeatState, UserId};

    async fn pending_booking(fx: &Fixture) -> Booking {
        let seats = fx.flight(500).await;
        fx.holds.hold(seats[0].id, FlightId(500), UserId(1)).await.unwrap();
        fx.manager.create_booking(UserId(1), FlightId(500), vec![seats[0].id], None).await.unwrap()
    }

    #[tokio::test]
    async fn test_approved_charge_marks_booking_paid() {
        let fx = Fixture::new();
        let booking = pending_booking(&fx).await;
        let orchestrator = PaymentOrchestrator::new(Arc::new(MockPaymentAdapter::approving()), fx.manager.clone());

        let settled = orchestrator.settle(&booking).await.unwrap();
        assert_eq!(settled.status, BookingStatus::Paid);
    }

    #[tokio::test]
    async fn test_gateway_error_is_a_failed_payment() {
        let fx = Fixture::new();
        let booking = pending_booking(&fx).await;
        let orchestrator = PaymentOrchestrator::new(Arc::new(MockPaymentAdapter::new(MockOutcome::Error)), fx.manager.clone());

        orchestrator.spawn_settlement(booking.clone()).await.unwrap();

        let stored = fx.manager.booking(booking.id).await.unwrap();
        assert_eq!(stored.status, BookingStatus::Cancelled);
        let seat = fx.holds.seat(booking.seat_ids[0], FlightId(500)).await.unwrap();
        assert_eq!(seat.state, SeatState::Available);
    }
}
