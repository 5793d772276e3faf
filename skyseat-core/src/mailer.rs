use async_trait::async_trait;

use crate::booking::Booking;
use crate::BoxError;

/// Outbound booking mail. Callers fire and forget; failures are logged, never escalated.
#[async_trait]
pub trait BookingMailer: Send + Sync {
    async fn send_booking_confirmation(&self, booking: &Booking) -> Result<(), BoxError>;

    async fn send_cancellation_notice(&self, booking: &Booking) -> Result<(), BoxError>;

    async fn send_payment_timeout_notice(&self, booking: &Booking) -> Result<(), BoxError>;
}

/// Mailer that only writes a log line. Stands in for the SMTP/PDF collaborator.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl BookingMailer for LogMailer {
    async fn send_booking_confirmation(&self, booking: &Booking) -> Result<(), BoxError> {
        tracing::info!(
            booking_id = %booking.id,
            user_id = %booking.user_id,
            seats = booking.seat_ids.len(),
            "Mock mailer: sending booking confirmation"
        );
        Ok(())
    }

    async fn send_cancellation_notice(&self, booking: &Booking) -> Result<(), BoxError> {
        tracing::info!(booking_id = %booking.id, user_id = %booking.user_id, "Mock mailer: sending cancellation notice");
        Ok(())
    }

    async fn send_payment_timeout_notice(&self, booking: &Booking) -> Result<(), BoxError> {
        tracing::info!(booking_id = %booking.id, user_id = %booking.user_id, "Mock mailer: sending payment timeout notice");
        Ok(())
    }
}
