use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use serde::Deserialize;

use skyseat_core::payment::PaymentStatus;
use skyseat_core::{Booking, BookingId};

use crate::error::AppError;
use crate::state::AppState;

pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

#[derive(Debug, Deserialize)]
pub struct PaymentWebhook {
    pub booking_id: BookingId,
    pub status: PaymentStatus,
}

/// Compares without short-circuiting on the first differing byte.
fn secrets_match(expected: &str, provided: &str) -> bool {
    expected.len() == provided.len()
        && expected
            .bytes()
            .zip(provided.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

fn verify_provider(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let expected = state.auth.webhook_secret.as_str();
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if expected.is_empty() || !secrets_match(expected, provided) {
        tracing::warn!("Rejected payment webhook with missing or wrong secret");
        return Err(AppError::AuthenticationError("Invalid webhook secret".to_string()));
    }
    Ok(())
}

/// POST /v1/webhooks/payments
/// Payment provider callback, authenticated by the shared secret header.
/// A second delivery for the same booking gets 409.
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PaymentWebhook>,
) -> Result<Json<Booking>, AppError> {
    verify_provider(&state, &headers)?;
    tracing::info!(booking_id = %payload.booking_id, status = ?payload.status, "Received payment webhook");

    let booking = state
        .bookings
        .record_payment_result(payload.booking_id, payload.status.is_success())
        .await?;
    Ok(Json(booking))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3creT"));
        assert!(!secrets_match("s3cret", "s3cre"));
        assert!(!secrets_match("s3cret", ""));
    }
}
