//! Tunehall // API
//!
//! The HTTP + WebSocket control surface. Every handler here is a thin
//! translation layer: extract and validate input, forward to the engine via
//! [`crate::engine::EngineHandle`], and shape the response. No business
//! logic lives in this module.

mod http;
mod ws;

use std::collections::HashMap;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::error::EngineError;

pub fn router(app: App) -> Router {
    Router::new()
        .route("/playlist", get(http::get_playlist))
        .route("/queue/add", post(http::queue_add))
        .route("/queue/skip", post(http::queue_skip))
        .route("/queue/stop", post(http::queue_stop))
        .route("/queue/remove", post(http::queue_remove))
        .route("/queue/move", post(http::queue_move))
        .route("/playlist/play", post(http::playlist_play))
        .route("/playlist/play_at", post(http::playlist_play_at))
        .route("/playlist/toggle_pause", post(http::playlist_toggle_pause))
        .route("/playlist/repeat", post(http::playlist_repeat))
        .route("/playlist/restart", post(http::playlist_restart))
        .route("/voice/join", post(http::voice_join))
        .route("/voice/debug", get(http::voice_debug))
        .route("/roles/sync", post(http::roles_sync))
        .route("/roles/forget", post(http::roles_forget))
        .route("/ws", get(ws::upgrade))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app)
}

/// `body field > query string > header`, the precedence documented for every
/// endpoint that needs a `guild_id`/`user_id`.
fn resolve_field(
    name: &str,
    body: &serde_json::Value,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Option<String> {
    body.get(name)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| query.get(name).cloned())
        .or_else(|| {
            let header_name = format!("x-{}", name.replace('_', "-"));
            headers
                .get(header_name.as_str())
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
        })
}

pub(crate) fn require_guild_id(
    body: &serde_json::Value,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<String, EngineError> {
    resolve_field("guild_id", body, query, headers).ok_or(EngineError::MissingGuildId)
}

pub(crate) fn require_user_id(
    body: &serde_json::Value,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Result<String, EngineError> {
    resolve_field("user_id", body, query, headers).ok_or(EngineError::MissingUserId)
}

pub(crate) fn optional_user_id(
    body: &serde_json::Value,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> Option<String> {
    resolve_field("user_id", body, query, headers)
}
