//! Tunehall // Error
//!
//! The typed error taxonomy shared by every engine component and the HTTP layer.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Every error the engine can surface to a caller, grouped the way the taxonomy
/// document groups them: input, authorization, voice, extraction, engine, internal.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("missing guild id")]
    MissingGuildId,

    #[error("missing user id")]
    MissingUserId,

    #[error("missing index")]
    MissingIndex,

    #[error("bad argument: {0}")]
    BadArgument(String),

    #[error("requester does not have priority to perform this action")]
    PriorityForbidden,

    #[error("user has reached their queued-track quota")]
    QuotaExceeded,

    #[error("user is not connected to a voice channel")]
    UserNotInVoice,

    #[error("guild not found")]
    GuildNotFound,

    #[error("failed to connect to the voice channel: {0}")]
    VoiceConnectFailed(String),

    #[error("no active voice session for this guild")]
    NoVoice,

    #[error("nothing is currently playing")]
    NotPlaying,

    #[error("no extractor supports this provider")]
    ProviderUnsupported,

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("network error while resolving a track: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("the guild player is not available")]
    PlayerUnavailable,

    #[error("the engine is not ready yet")]
    BotNotReady,

    #[error("enqueue failed: {0}")]
    EnqueueFailed(String),

    #[error("move rejected: {0}")]
    MoveFailed(String),

    #[error("the engine did not respond in time")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl EngineError {
    /// The machine-readable error code from the taxonomy document.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingGuildId => "MISSING_GUILD_ID",
            Self::MissingUserId => "MISSING_USER_ID",
            Self::MissingIndex => "MISSING_INDEX",
            Self::BadArgument(_) => "BAD_ARGUMENT",
            Self::PriorityForbidden => "PRIORITY_FORBIDDEN",
            Self::QuotaExceeded => "QUOTA_EXCEEDED",
            Self::UserNotInVoice => "USER_NOT_IN_VOICE",
            Self::GuildNotFound => "GUILD_NOT_FOUND",
            Self::VoiceConnectFailed(_) => "VOICE_CONNECT_FAILED",
            Self::NoVoice => "NO_VOICE",
            Self::NotPlaying => "NOT_PLAYING",
            Self::ProviderUnsupported => "PROVIDER_UNSUPPORTED",
            Self::ExtractionFailed(_) => "EXTRACTION_FAILED",
            Self::NetworkError(_) => "NETWORK_ERROR",
            Self::PlayerUnavailable => "PLAYER_UNAVAILABLE",
            Self::BotNotReady => "BOT_NOT_READY",
            Self::EnqueueFailed(_) => "ENQUEUE_FAILED",
            Self::MoveFailed(_) => "MOVE_FAILED",
            Self::Timeout => "ENGINE_TIMEOUT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::MissingGuildId
            | Self::MissingUserId
            | Self::MissingIndex
            | Self::BadArgument(_) => StatusCode::BAD_REQUEST,
            Self::PriorityForbidden => StatusCode::FORBIDDEN,
            Self::QuotaExceeded
            | Self::MoveFailed(_)
            | Self::NotPlaying
            | Self::NoVoice => StatusCode::CONFLICT,
            Self::UserNotInVoice
            | Self::GuildNotFound
            | Self::VoiceConnectFailed(_)
            | Self::ProviderUnsupported
            | Self::ExtractionFailed(_)
            | Self::NetworkError(_)
            | Self::EnqueueFailed(_) => StatusCode::CONFLICT,
            Self::PlayerUnavailable | Self::BotNotReady | Self::Timeout => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    ok: bool,
    error: &'static str,
    message: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            ok: false,
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
