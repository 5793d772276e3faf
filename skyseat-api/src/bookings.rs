use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;

use skyseat_core::{Booking, BookingId, FlightId, Passenger, SeatId};

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings", post(create_booking).get(list_bookings))
        .route("/v1/bookings/{booking_id}", get(get_booking))
        .route("/v1/bookings/{booking_id}/cancel", post(cancel_booking))
}

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub flight_id: FlightId,
    pub seat_ids: Vec<SeatId>,
    #[serde(default)]
    pub passengers: Option<Vec<Passenger>>,
}

/// POST /v1/bookings
/// Converts the caller's holds into a PENDING booking. When a gateway is
/// configured the charge runs in the background.
async fn create_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<Booking>), AppError> {
    let booking = state
        .bookings
        .create_booking(user.user_id, req.flight_id, req.seat_ids, req.passengers)
        .await?;

    if let Some(payments) = &state.payments {
        payments.spawn_settlement(booking.clone());
    }

    Ok((StatusCode::CREATED, Json(booking)))
}

async fn list_bookings(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Booking>>, AppError> {
    Ok(Json(state.bookings.bookings_for_user(user.user_id).await?))
}

/// Other users' bookings look missing rather than forbidden.
async fn get_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<i64>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.booking(BookingId(booking_id)).await?;
    if booking.user_id != user.user_id && !user.is_admin {
        return Err(AppError::NotFoundError(format!("Booking {} not found", booking_id)));
    }
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(booking_id): Path<i64>,
) -> Result<Json<Booking>, AppError> {
    let booking = state.bookings.cancel(BookingId(booking_id), user.user_id).await?;
    Ok(Json(booking))
}
