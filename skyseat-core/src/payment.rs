use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::ids::{BookingId, UserId};
use crate::BoxError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Succeeded,
    Failed,
}

impl PaymentStatus {
    pub fn is_success(self) -> bool {
        self == PaymentStatus::Succeeded
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub booking_id: BookingId,
    pub user_id: UserId,
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    /// Idempotency reference handed to the provider.
    pub reference: String,
}

impl PaymentRequest {
    pub fn reference_for(booking_id: BookingId) -> String {
        format!("SKY-{:08}", booking_id.get())
    }
}

/// Black-box payment gateway. An `Err` is treated exactly like `PaymentStatus::Failed`.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    async fn charge(&self, request: &PaymentRequest) -> Result<PaymentStatus, BoxError>;
}
