//! Tunehall // API // HTTP
//!
//! REST handlers. Each one resolves `guild_id`/`user_id`, forwards to the
//! guild's [`crate::engine::EngineHandle`], and shapes a `{ok, result,
//! state?}` response.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::app::App;
use crate::engine::{EngineHandle, RepeatToggle};
use crate::error::{EngineError, Result};
use crate::roles::RoleRecord;
use crate::track::RawTrackItem;

use super::{optional_user_id, require_guild_id, require_user_id};

/// Folds `query` into the track item, so either field can supply the track
/// descriptor the way `{query|url|title}` is documented.
fn track_item_from_body(mut body: Value) -> RawTrackItem {
    if let Value::Object(map) = &mut body {
        if !map.contains_key("url") {
            if let Some(query) = map.get("query").cloned() {
                map.insert("url".to_owned(), query);
            }
        }
    }
    RawTrackItem::Object(body)
}

async fn with_state(handle: &EngineHandle, mut result: Value) -> Value {
    if let Ok(state) = handle.get_state().await {
        if let Ok(state_value) = serde_json::to_value(state) {
            if let Value::Object(map) = &mut result {
                map.insert("state".to_owned(), state_value);
            }
        }
    }
    result
}

pub async fn get_playlist(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&Value::Null, &query, &headers)?;
    let handle = app.registry.get_or_spawn(&guild_id);
    let state = handle.get_state().await?;
    Ok(Json(json!({ "ok": true, "result": state })))
}

pub async fn queue_add(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = require_user_id(&body, &query, &headers)?;
    let voice_channel = optional_user_id_field(&body, "voice_channel_id");

    let handle = app.registry.get_or_spawn(&guild_id);
    let item = track_item_from_body(body);
    let outcome = handle.enqueue(user_id, item, voice_channel).await?;

    let response = json!({
        "ok": true,
        "result": { "track": outcome.track, "inserted_at": outcome.inserted_at },
        "autoplay": outcome.autoplay,
    });
    Ok(Json(with_state(&handle, response).await))
}

fn optional_user_id_field(body: &Value, field: &str) -> Option<String> {
    body.get(field).and_then(|v| v.as_str()).map(str::to_owned)
}

pub async fn queue_skip(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = optional_user_id(&body, &query, &headers);
    let handle = app.registry.get_or_spawn(&guild_id);
    handle.skip(user_id).await?;
    Ok(Json(with_state(&handle, json!({ "ok": true })).await))
}

pub async fn queue_stop(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = optional_user_id(&body, &query, &headers);
    let handle = app.registry.get_or_spawn(&guild_id);
    handle.stop(user_id).await?;
    Ok(Json(with_state(&handle, json!({ "ok": true })).await))
}

pub async fn queue_remove(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = require_user_id(&body, &query, &headers)?;
    let index = body
        .get("index")
        .and_then(|v| v.as_u64())
        .ok_or(EngineError::MissingIndex)? as usize;

    let handle = app.registry.get_or_spawn(&guild_id);
    let removed = handle.remove_at(user_id, index).await?;
    let response = json!({ "ok": true, "result": { "removed": removed } });
    Ok(Json(with_state(&handle, response).await))
}

pub async fn queue_move(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = require_user_id(&body, &query, &headers)?;
    let src = body.get("src").and_then(|v| v.as_u64()).ok_or(EngineError::MissingIndex)? as usize;
    let dst = body.get("dst").and_then(|v| v.as_u64()).ok_or(EngineError::MissingIndex)? as usize;

    let handle = app.registry.get_or_spawn(&guild_id);
    let moved = handle.move_item(user_id, src, dst).await?;
    let response = json!({ "ok": true, "result": { "moved": moved } });
    Ok(Json(with_state(&handle, response).await))
}

pub async fn playlist_play(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = require_user_id(&body, &query, &headers)?;
    let voice_channel = optional_user_id_field(&body, "voice_channel_id").ok_or(EngineError::UserNotInVoice)?;

    let url_or_query = body
        .get("url")
        .or_else(|| body.get("query"))
        .or_else(|| body.get("title"))
        .and_then(|v| v.as_str())
        .ok_or_else(|| EngineError::BadArgument("missing url, query, or title".into()))?
        .to_owned();

    let handle = app.registry.get_or_spawn(&guild_id);
    let outcome = handle.play_for_user(user_id, url_or_query, Some(voice_channel)).await?;

    let response = json!({
        "ok": true,
        "result": { "track": outcome.track, "inserted_at": outcome.inserted_at },
        "autoplay": outcome.autoplay,
    });
    Ok(Json(with_state(&handle, response).await))
}

pub async fn playlist_play_at(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = require_user_id(&body, &query, &headers)?;
    let index = body
        .get("index")
        .and_then(|v| v.as_u64())
        .ok_or(EngineError::MissingIndex)? as usize;

    let handle = app.registry.get_or_spawn(&guild_id);
    handle.play_at(user_id, index).await?;
    Ok(Json(with_state(&handle, json!({ "ok": true })).await))
}

pub async fn playlist_toggle_pause(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = optional_user_id(&body, &query, &headers);
    let handle = app.registry.get_or_spawn(&guild_id);
    let paused = handle.toggle_pause(user_id).await?;
    let response = json!({ "ok": true, "result": { "paused": paused } });
    Ok(Json(with_state(&handle, response).await))
}

pub async fn playlist_repeat(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let mode = match body.get("mode").and_then(|v| v.as_str()).unwrap_or("toggle") {
        "on" => RepeatToggle::On,
        "off" => RepeatToggle::Off,
        "toggle" => RepeatToggle::Toggle,
        other => return Err(EngineError::BadArgument(format!("unknown repeat mode: {other}"))),
    };

    let handle = app.registry.get_or_spawn(&guild_id);
    let repeat_all = handle.toggle_repeat(mode).await?;
    let response = json!({ "ok": true, "result": { "repeat_all": repeat_all } });
    Ok(Json(with_state(&handle, response).await))
}

pub async fn playlist_restart(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = optional_user_id(&body, &query, &headers);
    let handle = app.registry.get_or_spawn(&guild_id);
    handle.restart(user_id).await?;
    Ok(Json(with_state(&handle, json!({ "ok": true })).await))
}

pub async fn voice_join(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let voice_channel = optional_user_id_field(&body, "voice_channel_id")
        .ok_or_else(|| EngineError::BadArgument("missing voice_channel_id".into()))?;

    let handle = app.registry.get_or_spawn(&guild_id);
    let already_connected = handle.join_voice(voice_channel.clone()).await?;
    let response = json!({
        "ok": true,
        "result": { "voice_channel_id": voice_channel, "already_connected": already_connected },
    });
    Ok(Json(with_state(&handle, response).await))
}

pub async fn voice_debug(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&Value::Null, &query, &headers)?;
    let handle = app.registry.get_or_spawn(&guild_id);
    let state = handle.get_state().await?;
    Ok(Json(json!({
        "ok": true,
        "result": {
            "guild_id": guild_id,
            "active_guilds": app.registry.active_guild_count(),
            "overlay_subscribers": app.presence.count(),
            "state": state,
        }
    })))
}

/// Pushed by the chat-platform bridge whenever a member's roles change.
pub async fn roles_sync(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = require_user_id(&body, &query, &headers)?;

    let roles = body
        .get("roles")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    let is_administrator = body.get("is_administrator").and_then(|v| v.as_bool()).unwrap_or(false);
    let is_manager = body.get("is_manager").and_then(|v| v.as_bool()).unwrap_or(false);

    app.roles.sync(
        guild_id,
        user_id,
        RoleRecord {
            roles,
            is_administrator,
            is_manager,
        },
    );
    Ok(Json(json!({ "ok": true })))
}

/// Evicts a member's cached role record, e.g. on them leaving the guild.
pub async fn roles_forget(
    State(app): State<App>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>> {
    let guild_id = require_guild_id(&body, &query, &headers)?;
    let user_id = require_user_id(&body, &query, &headers)?;
    app.roles.forget(&guild_id, &user_id);
    Ok(Json(json!({ "ok": true })))
}
