//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    let casino = Router::new()
        .route("/start", post(start_game_handler))
        .route("/stop", post(stop_game_handler))
        .route("/games", get(user_games_handler))
        .route("/settings", get(settings_handler))
        .route("/active-games", get(active_games_handler))
        .route("/game/:id", get(game_status_handler))
        .route("/game/:id/crash-info", get(crash_info_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .nest("/api/casino", casino)
        .with_state(state)
}
