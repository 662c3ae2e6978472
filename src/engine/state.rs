//! Tunehall // Engine // State
//!
//! `GuildEngineState`: the per-guild state machine. Every method here runs
//! exclusively inside that guild's actor task (see [`super::actor`]), so
//! none of it needs internal locking — the actor *is* the `guild_lock`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{info, warn};

use crate::error::{EngineError, Result};
use crate::extractor::{ExtractorOptions, ExtractorRegistry};
use crate::presence::StateSink;
use crate::priority::{MemberRoles, PriorityResolver};
use crate::projector::{self, ProgressDelta, ProjectedState, ProjectionInput};
use crate::queue::GuildQueue;
use crate::track::{RawTrackItem, Track};
use crate::voice::VoiceSession;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMode {
    Off,
    Music,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatToggle {
    On,
    Off,
    Toggle,
}

/// Outcome of `enqueue`/`play_for_user`: whether autoplay was attempted and
/// whether it succeeded. Autoplay failures never escalate to an `enqueue`
/// error (§4.5 Autoplay semantics).
#[derive(Debug, Clone, Serialize)]
pub struct AutoplayResult {
    pub attempted: bool,
    pub ok: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnqueueOutcome {
    pub track: Track,
    pub inserted_at: usize,
    pub autoplay: AutoplayResult,
}

/// Dependencies shared by every guild actor, injected once from [`crate::app::App`].
pub struct EngineDeps {
    pub resolver: Arc<PriorityResolver>,
    pub roles: Arc<dyn MemberRoles>,
    pub extractors: Arc<ExtractorRegistry>,
    pub sink: Arc<dyn StateSink>,
    pub audio_presets: HashMap<String, String>,
    pub extractor_options: ExtractorOptions,
    pub bundle_limit: usize,
}

pub struct GuildEngineState {
    pub guild_id: String,
    queue: GuildQueue,
    voice: Option<VoiceSession>,
    repeat_all: bool,
    audio_mode: AudioMode,
    play_started_at: Option<Instant>,
    paused_since: Option<Instant>,
    paused_total_s: f64,
    deps: EngineDeps,
    finished_tx: Option<tokio::sync::mpsc::Sender<super::EngineCommand>>,
}

impl GuildEngineState {
    pub fn new(guild_id: String, queue: GuildQueue, deps: EngineDeps) -> Self {
        Self {
            guild_id,
            queue,
            voice: None,
            repeat_all: false,
            audio_mode: AudioMode::Off,
            play_started_at: None,
            paused_since: None,
            paused_total_s: 0.0,
            deps,
            finished_tx: None,
        }
    }

    pub fn attach_voice(&mut self, session: VoiceSession) {
        self.voice = Some(session);
    }

    /// Wires the actor's own inbox sender back into this state, so a
    /// playback-finished notification re-enters the same serialized command
    /// stream instead of racing the actor from another task.
    pub fn attach_finished_tx(&mut self, tx: tokio::sync::mpsc::Sender<super::EngineCommand>) {
        self.finished_tx = Some(tx);
    }

    fn voice(&self) -> Option<&VoiceSession> {
        self.voice.as_ref()
    }

    fn voice_mut(&mut self) -> Option<&mut VoiceSession> {
        self.voice.as_mut()
    }

    fn now_playing_owner_weight(&self) -> i64 {
        self.queue
            .now_playing()
            .map(|t| self.deps.resolver.weight(self.deps.roles.as_ref(), &self.guild_id, &t.requested_by))
            .unwrap_or(0)
    }

    fn authorize(&self, requester: Option<&str>) -> Result<()> {
        let Some(requester) = requester else {
            return Ok(());
        };
        let Some(current) = self.queue.now_playing() else {
            return Ok(());
        };
        if current.requested_by == requester {
            return Ok(());
        }
        if self.deps.resolver.bypass_quota(self.deps.roles.as_ref(), &self.guild_id, requester) {
            return Ok(());
        }
        let owner_weight = self.now_playing_owner_weight();
        if self
            .deps
            .resolver
            .can_bump_over(self.deps.roles.as_ref(), &self.guild_id, requester, owner_weight)
        {
            return Ok(());
        }
        Err(EngineError::PriorityForbidden)
    }

    fn per_user_count(&self, user_id: &str) -> usize {
        self.queue
            .peek_all()
            .iter()
            .filter(|t| t.requested_by == user_id)
            .count()
    }

    /// (§4.5 `enqueue`, I1)
    async fn enqueue_one(&mut self, user_id: &str, item: RawTrackItem) -> Result<Track> {
        if !self
            .deps
            .resolver
            .bypass_quota(self.deps.roles.as_ref(), &self.guild_id, user_id)
            && self.per_user_count(user_id) >= self.deps.resolver.per_user_cap()
        {
            return Err(EngineError::QuotaExceeded);
        }

        let mut track = self.queue.coerce(item, Some(user_id.to_owned()));
        self.fill_missing_metadata(&mut track).await;
        track.priority = self.deps.resolver.weight(self.deps.roles.as_ref(), &self.guild_id, user_id);
        self.queue.add(track.clone());
        Ok(track)
    }

    /// Fills a missing title/artist/thumbnail via the cached metadata lookup
    /// (§4.3 normalization). A missing title coerces to the bare URL, so that
    /// is the signal a lookup is worth attempting; failures are swallowed —
    /// enqueue must still succeed with the unembellished track.
    async fn fill_missing_metadata(&self, track: &mut Track) {
        if track.title != track.source_url && track.artist.is_some() && track.thumbnail.is_some() {
            return;
        }
        if let Ok(meta) = self.deps.extractors.metadata(&track.source_url).await {
            if track.title == track.source_url {
                if let Some(title) = meta.title {
                    track.title = title;
                }
            }
            if track.artist.is_none() {
                track.artist = meta.artist;
            }
            if track.thumbnail.is_none() {
                track.thumbnail = meta.thumbnail;
            }
        }
    }

    /// `enqueue(guild, user, item)`: normalizes, enforces quota, computes
    /// priority, inserts, and attempts best-effort autoplay if the engine
    /// was idle. (S2)
    pub async fn enqueue(
        &mut self,
        user_id: &str,
        item: RawTrackItem,
        voice_channel: Option<&str>,
    ) -> Result<EnqueueOutcome> {
        let was_idle = self.queue.is_empty() && self.queue.now_playing().is_none();
        let track = self.enqueue_one(user_id, item).await?;
        let inserted_at = self
            .queue
            .peek_all()
            .iter()
            .position(|t| t.enqueued_at == track.enqueued_at)
            .unwrap_or(0);

        self.emit_state();

        let autoplay = if was_idle {
            self.try_autoplay(voice_channel).await
        } else {
            AutoplayResult {
                attempted: false,
                ok: false,
                error: None,
            }
        };

        Ok(EnqueueOutcome {
            track,
            inserted_at,
            autoplay,
        })
    }

    async fn try_autoplay(&mut self, voice_channel: Option<&str>) -> AutoplayResult {
        let Some(channel) = voice_channel else {
            return AutoplayResult {
                attempted: false,
                ok: false,
                error: Some("requester is not in a voice channel".into()),
            };
        };
        if self.voice().is_none() {
            return AutoplayResult {
                attempted: false,
                ok: false,
                error: Some("no voice session attached".into()),
            };
        }

        match self.ensure_connected(channel).await {
            Ok(_) => match self.play_next().await {
                Ok(_) => AutoplayResult {
                    attempted: true,
                    ok: true,
                    error: None,
                },
                Err(e) => AutoplayResult {
                    attempted: true,
                    ok: false,
                    error: Some(e.to_string()),
                },
            },
            Err(e) => AutoplayResult {
                attempted: true,
                ok: false,
                error: Some(e.to_string()),
            },
        }
    }

    pub async fn ensure_connected(&mut self, channel_id: &str) -> Result<bool> {
        let Some(voice) = self.voice_mut() else {
            return Err(EngineError::NoVoice);
        };
        voice.ensure_connected(channel_id).await
    }

    /// `play_for_user`: connects, expands a bundle if the item is one,
    /// enqueues, and kicks off playback if idle.
    pub async fn play_for_user(
        &mut self,
        user_id: &str,
        url_or_query: &str,
        voice_channel: Option<&str>,
    ) -> Result<EnqueueOutcome> {
        let channel = voice_channel.ok_or(EngineError::UserNotInVoice)?;
        self.ensure_connected(channel).await?;

        if self.deps.extractors.is_bundle_url(url_or_query) {
            let urls = self
                .deps
                .extractors
                .expand_bundle(url_or_query, self.deps.bundle_limit)
                .await?;
            let mut iter = urls.into_iter();
            let Some(head) = iter.next() else {
                return Err(EngineError::ExtractionFailed("empty bundle".into()));
            };
            let outcome = self
                .enqueue(user_id, RawTrackItem::Url(head), Some(channel))
                .await?;
            for tail_url in iter {
                let _ = self.enqueue_one(user_id, RawTrackItem::Url(tail_url)).await;
            }
            self.emit_state();
            Ok(outcome)
        } else {
            self.enqueue(user_id, RawTrackItem::Url(url_or_query.to_owned()), Some(channel))
                .await
        }
    }

    /// *Guarded*: returns immediately if the voice session is already
    /// playing. Pops the next item, runs the extractor fallback, and begins
    /// playback. `repeat_all` re-enqueues the popped item at the tail before
    /// playback starts (S4).
    pub async fn play_next(&mut self) -> Result<()> {
        if self.voice().map(|v| v.is_playing()).unwrap_or(false) {
            return Ok(());
        }

        let Some(track) = self.queue.pop_next() else {
            self.queue.set_now_playing(None);
            self.cancel_playback_clock();
            return Ok(());
        };

        if self.repeat_all {
            self.queue.requeue_tail(track.clone());
        }

        let filter = self
            .deps
            .audio_presets
            .get(match self.audio_mode {
                AudioMode::Off => "off",
                AudioMode::Music => "music",
            })
            .cloned();
        let mut options = self.deps.extractor_options.clone();
        options.audio_filter = filter;

        let resolved = self.deps.extractors.resolve(&track.source_url, &options).await;
        let (handle, real_title) = match resolved {
            Ok(v) => v,
            Err(e) => {
                warn!(guild_id = %self.guild_id, error = %e, "extraction failed for both stages");
                self.queue.set_now_playing(None);
                self.cancel_playback_clock();
                return Err(e);
            }
        };

        let mut playing_track = track.clone();
        playing_track.title = real_title;
        self.queue.set_now_playing(Some(playing_track));

        self.play_started_at = Some(Instant::now());
        self.paused_since = None;
        self.paused_total_s = 0.0;

        let (tx, rx) = oneshot::channel();
        let Some(voice) = self.voice_mut() else {
            return Err(EngineError::NoVoice);
        };
        voice.play(handle, tx).await?;
        self.spawn_finish_waiter(rx);

        self.emit_state();
        info!(guild_id = %self.guild_id, title = %track.title, "playback started");
        Ok(())
    }

    /// Spawns the task that awaits `on_finish` and re-injects the result as
    /// an `EngineCommand::Finished` through the guild's own inbox, so the
    /// reaction to playback ending is serialized the same as every other
    /// command. (I9)
    fn spawn_finish_waiter(&self, rx: oneshot::Receiver<Option<String>>) {
        let guild_id = self.guild_id.clone();
        let tx = self.finished_tx.clone();
        tokio::spawn(async move {
            let err = rx.await.unwrap_or(None);
            if let Some(tx) = tx {
                let _ = tx.send(super::EngineCommand::Finished { err }).await;
            } else {
                warn!(guild_id, "no actor inbox to deliver finish notification to");
            }
        });
    }

    fn cancel_playback_clock(&mut self) {
        self.play_started_at = None;
        self.paused_since = None;
        self.paused_total_s = 0.0;
    }

    /// Reacts to a finished/failed source: advances to the next item. (I4)
    pub async fn handle_finished(&mut self, err: Option<String>) {
        if let Some(err) = err {
            warn!(guild_id = %self.guild_id, error = %err, "playback source ended with an error");
        }
        self.cancel_playback_clock();
        if let Err(e) = self.play_next().await {
            warn!(guild_id = %self.guild_id, error = %e, "play_next after finish failed");
        }
    }

    /// Clears queue, `now_playing`, stops voice, cancels the clock. (I3)
    pub async fn stop(&mut self, requester: Option<&str>) -> Result<()> {
        self.authorize(requester)?;
        self.queue.stop();
        if let Some(voice) = self.voice() {
            voice.stop().await?;
        }
        self.cancel_playback_clock();
        self.emit_state();
        Ok(())
    }

    /// If a source is active, stops it (its `on_finish` drives the next
    /// `play_next`); else advances directly. (I4)
    pub async fn skip(&mut self, requester: Option<&str>) -> Result<()> {
        self.authorize(requester)?;
        if self.voice().map(|v| v.is_playing() || v.is_paused()).unwrap_or(false) {
            if let Some(voice) = self.voice() {
                voice.stop().await?;
            }
            Ok(())
        } else {
            self.play_next().await
        }
    }

    /// Jumps straight to a specific queued item, abandoning whatever is
    /// currently playing. If a source is active, stopping it drives
    /// `play_next` asynchronously through `on_finish`; else advances directly.
    pub async fn play_at(&mut self, requester: &str, index: usize) -> Result<()> {
        self.authorize(Some(requester))?;
        let track = self.queue.take_at(index).ok_or(EngineError::MissingIndex)?;

        self.queue.set_now_playing(None);
        self.queue.requeue_front(track);

        if self.voice().map(|v| v.is_playing() || v.is_paused()).unwrap_or(false) {
            if let Some(voice) = self.voice() {
                voice.stop().await?;
            }
            Ok(())
        } else {
            self.cancel_playback_clock();
            self.play_next().await
        }
    }

    /// Restarts the currently playing track from the beginning, re-resolving
    /// its stream. If a source is active, stopping it drives `play_next`
    /// asynchronously through `on_finish`; else advances directly.
    pub async fn restart(&mut self, requester: Option<&str>) -> Result<()> {
        self.authorize(requester)?;
        let current = self.queue.now_playing().cloned().ok_or(EngineError::NotPlaying)?;

        self.queue.set_now_playing(None);
        self.queue.requeue_front(current);

        if self.voice().map(|v| v.is_playing() || v.is_paused()).unwrap_or(false) {
            if let Some(voice) = self.voice() {
                voice.stop().await?;
            }
            Ok(())
        } else {
            self.cancel_playback_clock();
            self.play_next().await
        }
    }

    /// Pauses if playing, resumes if paused. (§4.8 `toggle_pause`)
    pub async fn toggle_pause(&mut self, requester: Option<&str>) -> Result<bool> {
        let is_paused = self.voice().map(|v| v.is_paused()).unwrap_or(false);
        if is_paused {
            self.resume(requester).await?;
            Ok(false)
        } else {
            self.pause(requester).await?;
            Ok(true)
        }
    }

    pub async fn pause(&mut self, requester: Option<&str>) -> Result<()> {
        self.authorize(requester)?;
        let Some(voice) = self.voice_mut() else {
            return Err(EngineError::NoVoice);
        };
        voice.pause().await?;
        self.paused_since = Some(Instant::now());
        self.emit_state();
        Ok(())
    }

    /// Preserves `position_s` modulo ticker granularity by folding the
    /// paused interval into `paused_total_s`. (I5)
    pub async fn resume(&mut self, requester: Option<&str>) -> Result<()> {
        self.authorize(requester)?;
        if let Some(paused_since) = self.paused_since.take() {
            self.paused_total_s += paused_since.elapsed().as_secs_f64();
        }
        let Some(voice) = self.voice_mut() else {
            return Err(EngineError::NoVoice);
        };
        voice.resume().await?;
        self.emit_state();
        Ok(())
    }

    /// Rejects crossing the priority boundary unless the mover bypasses quota. (I7)
    pub fn remove_at(&mut self, user_id: &str, index: usize) -> Result<bool> {
        let Some(track) = self.queue.peek_all().get(index).cloned() else {
            return Ok(false);
        };
        if !self
            .deps
            .resolver
            .can_edit_item(self.deps.roles.as_ref(), &self.guild_id, user_id, &track)
        {
            return Err(EngineError::PriorityForbidden);
        }
        let removed = self.queue.remove_at(index);
        self.emit_state();
        Ok(removed)
    }

    pub fn move_item(&mut self, user_id: &str, src: usize, dst: usize) -> Result<bool> {
        let Some(track) = self.queue.peek_all().get(src).cloned() else {
            return Ok(false);
        };
        if !self
            .deps
            .resolver
            .can_edit_item(self.deps.roles.as_ref(), &self.guild_id, user_id, &track)
        {
            return Err(EngineError::PriorityForbidden);
        }

        let boundary = self.deps.resolver.first_non_priority_index(self.queue.peek_all());
        let crosses_boundary = (src < boundary) != (dst < boundary);
        if crosses_boundary
            && !self
                .deps
                .resolver
                .bypass_quota(self.deps.roles.as_ref(), &self.guild_id, user_id)
        {
            return Err(EngineError::MoveFailed("cannot cross the priority boundary".into()));
        }

        let moved = self.queue.move_item(src, dst);
        self.emit_state();
        Ok(moved)
    }

    pub fn toggle_repeat(&mut self, mode: RepeatToggle) -> bool {
        self.repeat_all = match mode {
            RepeatToggle::On => true,
            RepeatToggle::Off => false,
            RepeatToggle::Toggle => !self.repeat_all,
        };
        self.emit_state();
        self.repeat_all
    }

    pub fn set_audio_mode(&mut self, mode: AudioMode) -> bool {
        self.audio_mode = mode;
        true
    }

    pub fn get_state(&self) -> ProjectedState {
        self.project(Instant::now())
    }

    /// Samples and broadcasts a [`ProgressDelta`] if something is playing or
    /// paused; a no-op once playback is fully idle. Called once per tick
    /// from the actor's own select loop.
    pub fn broadcast_progress(&self) {
        if let Some(delta) = self.sample_progress() {
            if let Ok(payload) = serde_json::to_value(&delta) {
                self.broadcast_playlist_update(payload);
            }
        }
    }

    fn sample_progress(&self) -> Option<ProgressDelta> {
        let playing = self.voice().map(|v| v.is_playing()).unwrap_or(false);
        let paused = self.voice().map(|v| v.is_paused()).unwrap_or(false);
        if !playing && !paused {
            return None;
        }
        let state = self.project(Instant::now());
        Some(ProgressDelta {
            only_elapsed: true,
            paused: state.paused,
            position_s: state.position_s,
            duration_s: state.duration_s,
        })
    }

    fn project(&self, now: Instant) -> ProjectedState {
        let input = ProjectionInput {
            queue: self.queue.peek_all(),
            current: self.queue.now_playing(),
            paused: self.voice().map(|v| v.is_paused()).unwrap_or(false),
            play_started_at: self.play_started_at,
            paused_since: self.paused_since,
            paused_total_s: self.paused_total_s,
            repeat_all: self.repeat_all,
        };
        projector::project(input, now)
    }

    fn emit_state(&self) {
        let state = self.get_state();
        if let Ok(payload) = serde_json::to_value(&state) {
            self.broadcast_playlist_update(payload);
        }
    }

    /// Wraps `data` in the `playlist_update` envelope and fans it out to the
    /// guild's overlay room.
    fn broadcast_playlist_update(&self, data: serde_json::Value) {
        let envelope = serde_json::json!({ "type": "playlist_update", "data": data });
        self.deps.sink.broadcast(&self.guild_id, &envelope);
    }
}
