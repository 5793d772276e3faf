use axum::{http::Method, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod bookings;
pub mod error;
pub mod flights;
pub mod holds;
pub mod middleware;
pub mod state;
pub mod webhooks;
pub mod worker;

pub use state::AppState;

use crate::middleware::{admin_auth_middleware, customer_auth_middleware};

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    let customer = Router::new()
        .merge(holds::routes())
        .merge(bookings::routes())
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), customer_auth_middleware));

    let admin = flights::routes()
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(auth::routes())
        .merge(holds::public_routes())
        .merge(webhooks::routes())
        .merge(customer)
        .merge(admin)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
