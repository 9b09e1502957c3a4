//! Request Handlers
//!
//! Thin adapters between HTTP and [`GameService`]: extract the caller and
//! request id, call the engine, wrap the result in the response envelope.

use super::{
    errors::ApiError,
    middleware::{CallerId, RequestId},
    models::*,
};
use crate::games::service::{ActiveGameView, CrashInfo, GameService, GameView, SettingsView, StartedGame};
use crate::games::types::SettlementResult;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    pub games: Arc<GameService>,
    pub version: String,
    pub enable_metrics: bool,
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
        active_games: state.games.registry().len(),
        sweeper_running: state.games.sweeper().is_running(),
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    if !state.enable_metrics {
        return StatusCode::NOT_FOUND.into_response();
    }
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.games.metrics().to_prometheus_format(),
    )
        .into_response()
}

/// POST /api/casino/start
pub async fn start_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    payload: Result<Json<StartGameRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<StartedGame>>), ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))?;

    let started = state
        .games
        .start(user_id, req.bet_amount)
        .await
        .map_err(|e| ApiError::from_crash(request_id.0.clone(), e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("Game started successfully", started)),
    ))
}

/// POST /api/casino/stop
pub async fn stop_game_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    payload: Result<Json<StopGameRequest>, JsonRejection>,
) -> ApiResult<SettlementResult> {
    let Json(req) = payload.map_err(|e| ApiError::bad_request(request_id.0.clone(), e.body_text()))?;

    let result = state
        .games
        .stop(user_id, req.game_id)
        .await
        .map_err(|e| ApiError::from_crash(request_id.0.clone(), e))?;

    Ok(Json(ApiResponse::ok(result.message(), result)))
}

/// GET /api/casino/game/:id
pub async fn game_status_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Path(game_id): Path<u64>,
) -> ApiResult<GameView> {
    let view = state
        .games
        .status(user_id, game_id)
        .map_err(|e| ApiError::from_crash(request_id.0, e))?;
    Ok(Json(ApiResponse::ok("Game retrieved successfully", view)))
}

/// GET /api/casino/game/:id/crash-info
pub async fn crash_info_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
    Path(game_id): Path<u64>,
) -> ApiResult<CrashInfo> {
    let info = state
        .games
        .crash_info(user_id, game_id)
        .map_err(|e| ApiError::from_crash(request_id.0, e))?;
    Ok(Json(ApiResponse::ok("Crash info retrieved successfully", info)))
}

/// GET /api/casino/games
pub async fn user_games_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    CallerId(user_id): CallerId,
) -> ApiResult<Vec<GameView>> {
    let games = state
        .games
        .user_games(user_id)
        .map_err(|e| ApiError::from_crash(request_id.0, e))?;
    Ok(Json(ApiResponse::ok("Games retrieved successfully", games)))
}

/// GET /api/casino/active-games
pub async fn active_games_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<ActiveGameView>> {
    let games = state
        .games
        .list_active()
        .map_err(|e| ApiError::from_crash(request_id.0, e))?;
    Ok(Json(ApiResponse::ok("Active games retrieved successfully", games)))
}

/// GET /api/casino/settings
pub async fn settings_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<SettingsView> {
    let settings = state
        .games
        .game_settings()
        .map_err(|e| ApiError::from_crash(request_id.0, e))?;
    Ok(Json(ApiResponse::ok("Game settings retrieved successfully", settings)))
}
