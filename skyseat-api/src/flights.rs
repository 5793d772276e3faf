use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use skyseat_core::{FlightId, Seat, SeatMapLayout};

use crate::error::AppError;
use crate::state::AppState;

/// Seat map administration, mounted behind the admin auth middleware.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/admin/flights/{flight_id}/seats",
        post(initialize_seat_map).delete(delete_seat_map),
    )
}

/// Omitted fields fall back to the configured default layout.
#[derive(Debug, Default, Deserialize)]
pub struct InitializeSeatMapRequest {
    pub rows: Option<u32>,
    pub letters: Option<String>,
    pub fare_amount: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DeleteSeatMapResponse {
    pub flight_id: FlightId,
    pub deleted: u64,
}

async fn initialize_seat_map(
    State(state): State<AppState>,
    Path(flight_id): Path<i64>,
    Json(req): Json<InitializeSeatMapRequest>,
) -> Result<(StatusCode, Json<Vec<Seat>>), AppError> {
    let defaults = &state.seat_map;
    let layout = SeatMapLayout::new(
        req.rows.unwrap_or(defaults.rows),
        req.letters.unwrap_or_else(|| defaults.letters.clone()),
    );
    let fare = req.fare_amount.unwrap_or(defaults.default_fare);

    let seats = state.holds.initialize_flight(FlightId(flight_id), &layout, fare).await?;
    Ok((StatusCode::CREATED, Json(seats)))
}

async fn delete_seat_map(
    State(state): State<AppState>,
    Path(flight_id): Path<i64>,
) -> Result<Json<DeleteSeatMapResponse>, AppError> {
    let flight_id = FlightId(flight_id);
    let deleted = state.holds.delete_flight(flight_id).await?;
    if deleted == 0 {
        return Err(AppError::NotFoundError(format!("No seat map for flight {}", flight_id)));
    }
    Ok(Json(DeleteSeatMapResponse { flight_id, deleted }))
}
