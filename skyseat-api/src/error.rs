use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skyseat_core::{CancellationRefusal, InventoryError};

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            },
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            },
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<InventoryError> for AppError {
    fn from(err: InventoryError) -> Self {
        let msg = err.to_string();
        match err {
            InventoryError::SeatNotFound { .. } | InventoryError::BookingNotFound(_) => AppError::NotFoundError(msg),
            InventoryError::SeatNotAvailable { .. }
            | InventoryError::InvalidTransition { .. }
            | InventoryError::FlightAlreadyInitialized(_) => AppError::ConflictError(msg),
            InventoryError::BookingValidationFailed(_) | InventoryError::InvalidSeatMap(_) => AppError::ValidationError(msg),
            InventoryError::BookingNotEligibleForCancellation { reason, .. } => match reason {
                CancellationRefusal::NotOwner => AppError::AuthorizationError(msg),
                CancellationRefusal::NotPaid(_) => AppError::ConflictError(msg),
            },
            InventoryError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
