//! Route definitions

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::handlers::{
    health, list_users, sync_status, sync_users, user_events, volumetry_analyze,
    volumetry_metrics, volumetry_user_sample,
};
use crate::middleware::auth::auth_middleware;
use crate::server::AppState;

/// Create the API router
pub fn routes(state: &AppState) -> Router<AppState> {
    let api = Router::new()
        .route("/api/users", get(list_users))
        .route("/api/users/sync", post(sync_users))
        .route("/api/users/sync-status", get(sync_status))
        .route("/api/users/{id}/events", get(user_events))
        .route("/api/volumetry/analyze", get(volumetry_analyze))
        .route("/api/volumetry/metrics", get(volumetry_metrics))
        .route("/api/volumetry/users/sample", get(volumetry_user_sample))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        // Health check (unauthenticated)
        .route("/health", get(health))
        .merge(api)
}
