use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Extension, Json, Router,
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use uuid::Uuid;

use skyseat_core::{FlightId, Seat, SeatId, UserId};
use skyseat_inventory::NotificationBus;

use crate::error::AppError;
use crate::middleware::auth::{authenticate, AuthUser};
use crate::state::AppState;

/// Public seat-map routes: snapshot and live stream.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flights/{flight_id}/seats", get(seat_map))
        .route("/v1/flights/{flight_id}/seats/stream", get(stream_seats))
}

/// Hold routes, mounted behind the customer auth middleware.
pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/v1/flights/{flight_id}/seats/{seat_id}/hold",
        post(hold_seat).delete(release_seat),
    )
}

#[derive(Debug, Deserialize)]
pub struct ClientQuery {
    /// Live-stream session that should get the seat back if it disconnects.
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub client_id: Option<String>,
    /// EventSource cannot set headers, so the token may ride in the query string.
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SeatMapResponse {
    pub flight_id: FlightId,
    pub available: usize,
    pub seats: Vec<Seat>,
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub seat: Seat,
    pub hold_expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub seat_id: SeatId,
    pub released: bool,
}

async fn seat_map(
    State(state): State<AppState>,
    Path(flight_id): Path<i64>,
) -> Result<Json<SeatMapResponse>, AppError> {
    let flight_id = FlightId(flight_id);
    let seats = state.holds.seat_map(flight_id).await?;
    if seats.is_empty() {
        return Err(AppError::NotFoundError(format!("No seat map for flight {}", flight_id)));
    }

    let now = Utc::now();
    let available = seats.iter().filter(|s| s.is_available_at(now)).count();
    Ok(Json(SeatMapResponse { flight_id, available, seats }))
}

async fn hold_seat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((flight_id, seat_id)): Path<(i64, i64)>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<HoldResponse>, AppError> {
    let (flight_id, seat_id) = (FlightId(flight_id), SeatId(seat_id));
    let result = state.holds.hold(seat_id, flight_id, user.user_id).await?;

    if let Some(client_id) = query.client_id.as_deref() {
        state.bus.track_hold(client_id, seat_id, flight_id, Some(user.user_id)).await;
    }

    Ok(Json(HoldResponse {
        seat: result.seat,
        hold_expires_at: result.hold_expires_at,
    }))
}

async fn release_seat(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path((flight_id, seat_id)): Path<(i64, i64)>,
    Query(query): Query<ClientQuery>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let (flight_id, seat_id) = (FlightId(flight_id), SeatId(seat_id));
    let released = state.holds.release(seat_id, flight_id, user.user_id).await?;

    if let Some(client_id) = query.client_id.as_deref() {
        state.bus.untrack_hold(client_id, seat_id).await;
    }

    Ok(Json(ReleaseResponse { seat_id, released }))
}

/// Closes this connection's bus session when the SSE response stream is dropped.
struct DisconnectGuard {
    bus: Arc<NotificationBus>,
    client_id: String,
    flight_id: FlightId,
    generation: u64,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let bus = self.bus.clone();
        let client_id = std::mem::take(&mut self.client_id);
        let flight_id = self.flight_id;
        let generation = self.generation;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    bus.detach(&client_id, flight_id, generation).await;
                });
            }
            Err(_) => tracing::warn!(client_id = %client_id, "No runtime to release holds on disconnect; expiry sweep will reclaim them"),
        }
    }
}

async fn stream_seats(
    State(state): State<AppState>,
    Path(flight_id): Path<i64>,
    Query(query): Query<StreamQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let flight_id = FlightId(flight_id);

    let token = query
        .token
        .or_else(|| bearer.map(|TypedHeader(Authorization(b))| b.token().to_string()));
    let holder: Option<UserId> = match token {
        Some(token) => Some(
            authenticate(&state.auth.secret, &token)
                .map_err(|_| AppError::AuthenticationError("Invalid token".to_string()))?
                .user_id,
        ),
        None => None,
    };

    let client_id = query.client_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let attachment = state.bus.attach(&client_id, flight_id, holder).await?;

    let hello = Event::default()
        .event("connected")
        .json_data(serde_json::json!({ "client_id": client_id, "flight_id": flight_id }))
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;

    let guard = DisconnectGuard {
        bus: state.bus.clone(),
        client_id,
        flight_id,
        generation: attachment.generation,
    };

    let updates = BroadcastStream::new(attachment.receiver).filter_map(move |result| {
        // The guard lives exactly as long as the stream.
        let _session = &guard;
        let event = match result {
            Ok(update) => Event::default().event("seat_update").json_data(&update).ok(),
            Err(BroadcastStreamRecvError::Lagged(missed)) => {
                // Viewer fell behind; it should refetch the snapshot.
                Event::default()
                    .event("lagged")
                    .json_data(serde_json::json!({ "missed": missed }))
                    .ok()
            }
        };
        async move { event.map(Ok) }
    });

    let connected = stream::once(async move { Ok::<_, Infallible>(hello) });
    Ok(Sse::new(connected.chain(updates)).keep_alive(KeepAlive::default()))
}
