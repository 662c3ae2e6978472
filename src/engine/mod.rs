//! Tunehall // Engine
//!
//! The core playback engine: one actor task per guild, exclusively owning
//! its [`state::GuildEngineState`], addressed through [`EngineHandle`].
//! External callers (the HTTP API) never see `GuildEngineState` directly.

mod actor;
mod state;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::info;

pub use actor::EngineCommand;
pub use state::{AudioMode, EngineDeps, EnqueueOutcome, GuildEngineState, RepeatToggle};

use crate::error::{EngineError, Result};
use crate::extractor::{ExtractorOptions, ExtractorRegistry};
use crate::presence::StateSink;
use crate::priority::{MemberRoles, PriorityResolver};
use crate::projector::ProjectedState;
use crate::queue::GuildQueue;
use crate::track::RawTrackItem;
use crate::voice::{VoiceSession, VoiceSink};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(10);
const INBOX_CAPACITY: usize = 64;

/// Builds the [`VoiceSink`] for a newly spawned guild actor, the capability
/// seam that keeps the engine's voice-gateway client swappable. (C4)
pub trait VoiceSinkFactory: Send + Sync {
    fn create(&self, guild_id: &str) -> Box<dyn VoiceSink>;
}

/// A cheap, cloneable handle to a guild's actor inbox.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    /// Spawns a fresh guild actor and returns a handle to it.
    pub fn spawn(guild_id: String, queue: GuildQueue, deps: EngineDeps, voice: VoiceSession) -> Self {
        let (tx, rx) = mpsc::channel(INBOX_CAPACITY);
        let mut gstate = GuildEngineState::new(guild_id.clone(), queue, deps);
        gstate.attach_voice(voice);
        gstate.attach_finished_tx(tx.clone());

        tokio::spawn(async move {
            info!(guild_id, "guild engine actor started");
            actor::run(gstate, rx).await;
        });

        Self { tx }
    }

    async fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> EngineCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| EngineError::PlayerUnavailable)?;
        tokio::time::timeout(COMMAND_TIMEOUT, reply_rx)
            .await
            .map_err(|_| EngineError::Timeout)?
            .map_err(|_| EngineError::PlayerUnavailable)
    }

    pub async fn enqueue(
        &self,
        user_id: String,
        item: RawTrackItem,
        voice_channel: Option<String>,
    ) -> Result<EnqueueOutcome> {
        self.send(|reply| EngineCommand::Enqueue {
            user_id,
            item,
            voice_channel,
            reply,
        })
        .await?
    }

    pub async fn play_for_user(
        &self,
        user_id: String,
        query: String,
        voice_channel: Option<String>,
    ) -> Result<EnqueueOutcome> {
        self.send(|reply| EngineCommand::PlayForUser {
            user_id,
            query,
            voice_channel,
            reply,
        })
        .await?
    }

    pub async fn skip(&self, user_id: Option<String>) -> Result<()> {
        self.send(|reply| EngineCommand::Skip { user_id, reply }).await?
    }

    pub async fn stop(&self, user_id: Option<String>) -> Result<()> {
        self.send(|reply| EngineCommand::Stop { user_id, reply }).await?
    }

    pub async fn play_at(&self, user_id: String, index: usize) -> Result<()> {
        self.send(|reply| EngineCommand::PlayAt { user_id, index, reply }).await?
    }

    pub async fn restart(&self, user_id: Option<String>) -> Result<()> {
        self.send(|reply| EngineCommand::Restart { user_id, reply }).await?
    }

    pub async fn toggle_pause(&self, user_id: Option<String>) -> Result<bool> {
        self.send(|reply| EngineCommand::TogglePause { user_id, reply }).await?
    }

    pub async fn pause(&self, user_id: Option<String>) -> Result<()> {
        self.send(|reply| EngineCommand::Pause { user_id, reply }).await?
    }

    pub async fn resume(&self, user_id: Option<String>) -> Result<()> {
        self.send(|reply| EngineCommand::Resume { user_id, reply }).await?
    }

    pub async fn remove_at(&self, user_id: String, index: usize) -> Result<bool> {
        self.send(|reply| EngineCommand::RemoveAt { user_id, index, reply }).await?
    }

    pub async fn move_item(&self, user_id: String, src: usize, dst: usize) -> Result<bool> {
        self.send(|reply| EngineCommand::Move { user_id, src, dst, reply }).await?
    }

    pub async fn toggle_repeat(&self, mode: RepeatToggle) -> Result<bool> {
        self.send(|reply| EngineCommand::ToggleRepeat { mode, reply }).await
    }

    pub async fn set_audio_mode(&self, mode: AudioMode) -> Result<bool> {
        self.send(|reply| EngineCommand::SetAudioMode { mode, reply }).await
    }

    pub async fn get_state(&self) -> Result<ProjectedState> {
        self.send(|reply| EngineCommand::GetState { reply }).await
    }

    /// Connects (or moves) to `channel_id` without touching the queue.
    /// Returns `true` if the session was already on that channel.
    pub async fn join_voice(&self, channel_id: String) -> Result<bool> {
        self.send(|reply| EngineCommand::EnsureConnected { channel_id, reply }).await?
    }
}

/// Lazily spawns and tracks one [`EngineHandle`] per guild. Held by
/// [`crate::app::App`] and cloned into every request handler.
pub struct GuildRegistry {
    handles: DashMap<String, EngineHandle>,
    playlist_dir: PathBuf,
    resolver: Arc<PriorityResolver>,
    roles: Arc<dyn MemberRoles>,
    extractors: Arc<ExtractorRegistry>,
    sink: Arc<dyn StateSink>,
    voice_factory: Arc<dyn VoiceSinkFactory>,
    audio_presets: HashMap<String, String>,
    intro_asset: Option<String>,
    bundle_limit: usize,
    base_extractor_options: ExtractorOptions,
}

impl GuildRegistry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        playlist_dir: PathBuf,
        resolver: Arc<PriorityResolver>,
        roles: Arc<dyn MemberRoles>,
        extractors: Arc<ExtractorRegistry>,
        sink: Arc<dyn StateSink>,
        voice_factory: Arc<dyn VoiceSinkFactory>,
        audio_presets: HashMap<String, String>,
        intro_asset: Option<String>,
        bundle_limit: usize,
        base_extractor_options: ExtractorOptions,
    ) -> Self {
        Self {
            handles: DashMap::new(),
            playlist_dir,
            resolver,
            roles,
            extractors,
            sink,
            voice_factory,
            audio_presets,
            intro_asset,
            bundle_limit,
            base_extractor_options,
        }
    }

    /// Returns the existing handle for `guild_id`, spawning a fresh actor
    /// (and loading its on-disk queue snapshot) on first reference. The
    /// lookup and the spawn-on-miss insert happen under the same `entry`
    /// guard, so two concurrent first-requests for the same guild can never
    /// both spawn an actor and orphan one of them.
    pub fn get_or_spawn(&self, guild_id: &str) -> EngineHandle {
        self.handles
            .entry(guild_id.to_owned())
            .or_insert_with(|| {
                let queue = GuildQueue::load(&self.playlist_dir, guild_id);
                let deps = EngineDeps {
                    resolver: self.resolver.clone(),
                    roles: self.roles.clone(),
                    extractors: self.extractors.clone(),
                    sink: self.sink.clone(),
                    audio_presets: self.audio_presets.clone(),
                    extractor_options: self.base_extractor_options.clone(),
                    bundle_limit: self.bundle_limit,
                };
                let voice =
                    VoiceSession::new(self.voice_factory.create(guild_id), self.intro_asset.clone());
                EngineHandle::spawn(guild_id.to_owned(), queue, deps, voice)
            })
            .clone()
    }

    pub fn active_guild_count(&self) -> usize {
        self.handles.len()
    }
}
