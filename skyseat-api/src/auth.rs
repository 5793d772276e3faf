use axum::{extract::State, routing::post, Json, Router};
use serde::Serialize;
use uuid::Uuid;

use skyseat_core::UserId;

use crate::{
    error::AppError,
    middleware::auth::{issue_token, ROLE_GUEST},
    state::AppState,
};

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    user_id: UserId,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/auth/guest", post(login_guest))
}

/// Guest ids are random positive integers so they never collide with the
/// small sequential ids handed out to registered customers.
fn guest_user_id() -> UserId {
    let raw = (Uuid::new_v4().as_u128() as u64) & (i64::MAX as u64);
    UserId(raw.max(1) as i64)
}

async fn login_guest(State(state): State<AppState>) -> Result<Json<AuthResponse>, AppError> {
    let user_id = guest_user_id();
    let token = issue_token(&state.auth.secret, user_id, ROLE_GUEST, state.auth.expiration)
        .map_err(|e| AppError::InternalServerError(format!("Token encoding failed: {}", e)))?;

    tracing::debug!(user_id = %user_id, "Issued guest token");
    Ok(Json(AuthResponse { token, user_id }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_ids_are_positive() {
        for _ in 0..100 {
            assert!(guest_user_id().get() > 0);
        }
    }
}
