//! Axum router construction for the Havn API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /api/health` -- liveness and hub status
/// - `POST /api/v1/occupancy/checkin` -- open a session
/// - `POST /api/v1/occupancy/checkout` -- close the caller's session
/// - `GET /api/v1/spots/{id}` -- spot status
/// - `POST /api/v1/spots/{id}/update` -- availability report
/// - `GET /ws` -- observer `WebSocket` stream
///
/// CORS allows any origin; the mobile client and the admin dashboard are
/// served from different hosts.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(handlers::health))
        // Occupancy
        .route("/api/v1/occupancy/checkin", post(handlers::check_in))
        .route("/api/v1/occupancy/checkout", post(handlers::check_out))
        // Spots
        .route("/api/v1/spots/{id}", get(handlers::get_spot))
        .route("/api/v1/spots/{id}/update", post(handlers::update_availability))
        // WebSocket
        .route("/ws", get(ws::ws_spots))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
