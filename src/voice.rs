//! Tunehall // Voice
//!
//! Maintains one connection per guild to a voice channel and hides the
//! platform voice-gateway details behind [`VoiceSink`], the way the voice
//! gateway's wire protocol is explicitly out of scope for this engine.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::error::{EngineError, Result};
use crate::extractor::SourceHandle;

/// The external voice-gateway capability this engine drives. A concrete
/// implementation owns the actual wire connection; the engine only ever
/// calls through this trait.
#[async_trait]
pub trait VoiceSink: Send + Sync {
    async fn connect(&self, channel_id: &str) -> Result<()>;
    async fn leave(&self) -> Result<()>;
    fn current_channel(&self) -> Option<String>;

    /// Begins playback of `source`. Non-blocking: must invoke `on_finish`
    /// exactly once, via the returned oneshot sender, when the source ends
    /// or fails. (I9)
    async fn play(&self, source: SourceHandle, on_finish: oneshot::Sender<Option<String>>) -> Result<()>;

    async fn stop(&self) -> Result<()>;
    async fn set_paused(&self, paused: bool) -> Result<()>;
    fn is_playing(&self) -> bool;
    fn is_paused(&self) -> bool;
}

/// Per-guild wrapper around a [`VoiceSink`], adding the `ensure_connected`
/// and intro-asset semantics the state machine relies on.
pub struct VoiceSession {
    sink: Box<dyn VoiceSink>,
    intro_asset: Option<String>,
    intro_played: bool,
}

impl VoiceSession {
    pub fn new(sink: Box<dyn VoiceSink>, intro_asset: Option<String>) -> Self {
        Self {
            sink,
            intro_asset,
            intro_played: false,
        }
    }

    /// Connects (or moves) to `channel_id`. Returns `true` if already there.
    /// On first connect, plays the configured intro asset if no audio is
    /// currently playing — connection only, never on a later move to the
    /// same guild (Open Question, pinned in SPEC_FULL.md §9).
    pub async fn ensure_connected(&mut self, channel_id: &str) -> Result<bool> {
        if self.sink.current_channel().as_deref() == Some(channel_id) {
            return Ok(true);
        }

        self.sink
            .connect(channel_id)
            .await
            .map_err(|_| EngineError::VoiceConnectFailed(channel_id.to_owned()))?;

        if !self.intro_played {
            self.intro_played = true;
            if let Some(intro) = self.intro_asset.clone() {
                let (tx, _rx) = oneshot::channel();
                let handle = SourceHandle::Direct {
                    url: intro,
                    headers: Default::default(),
                };
                // Best-effort: an intro failure must not fail the connect.
                let _ = self.sink.play(handle, tx).await;
            }
        }

        Ok(false)
    }

    pub fn is_connected(&self) -> bool {
        self.sink.current_channel().is_some()
    }

    pub fn current_channel(&self) -> Option<String> {
        self.sink.current_channel()
    }

    pub async fn play(
        &self,
        source: SourceHandle,
        on_finish: oneshot::Sender<Option<String>>,
    ) -> Result<()> {
        self.sink.play(source, on_finish).await
    }

    /// Stops playback; the session remains connected but idle. (I3)
    pub async fn stop(&self) -> Result<()> {
        self.sink.stop().await
    }

    pub async fn pause(&self) -> Result<bool> {
        if !self.sink.is_playing() {
            return Err(EngineError::NotPlaying);
        }
        self.sink.set_paused(true).await?;
        Ok(true)
    }

    pub async fn resume(&self) -> Result<bool> {
        self.sink.set_paused(false).await?;
        Ok(true)
    }

    pub fn is_playing(&self) -> bool {
        self.sink.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    pub async fn leave(&self) -> Result<()> {
        self.sink.leave().await
    }
}

/// A voice sink with no wire connection: how audio bytes actually reach a
/// voice gateway is out of scope here (see module docs), so this is the
/// stand-in collaborator wired in by default until a real gateway adapter is
/// plugged in via [`crate::engine::VoiceSinkFactory`]. It tracks connection
/// and playback state faithfully but never transmits audio, and a played
/// source never finishes on its own — callers drive it with `finish_current`.
pub struct NullVoiceSink {
    guild_id: String,
    channel: std::sync::Mutex<Option<String>>,
    playing: std::sync::atomic::AtomicBool,
    paused: std::sync::atomic::AtomicBool,
    on_finish: std::sync::Mutex<Option<oneshot::Sender<Option<String>>>>,
}

impl NullVoiceSink {
    pub fn new(guild_id: String) -> Self {
        Self {
            guild_id,
            channel: std::sync::Mutex::new(None),
            playing: std::sync::atomic::AtomicBool::new(false),
            paused: std::sync::atomic::AtomicBool::new(false),
            on_finish: std::sync::Mutex::new(None),
        }
    }

    /// Signals that the current source ended, the way a real gateway adapter
    /// would once its decoder reports EOF or an error.
    pub fn finish_current(&self, err: Option<String>) {
        self.playing.store(false, std::sync::atomic::Ordering::SeqCst);
        if let Some(tx) = self.on_finish.lock().unwrap().take() {
            let _ = tx.send(err);
        }
    }
}

#[async_trait]
impl VoiceSink for NullVoiceSink {
    async fn connect(&self, channel_id: &str) -> Result<()> {
        *self.channel.lock().unwrap() = Some(channel_id.to_owned());
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        *self.channel.lock().unwrap() = None;
        Ok(())
    }

    fn current_channel(&self) -> Option<String> {
        self.channel.lock().unwrap().clone()
    }

    async fn play(&self, source: SourceHandle, on_finish: oneshot::Sender<Option<String>>) -> Result<()> {
        // The handle is intentionally dropped here: without a real gateway
        // adapter there is nowhere to stream it, but a piped child process
        // still needs to be reaped so it doesn't linger as a zombie.
        if let SourceHandle::Piped(mut child) = source {
            let guild_id = self.guild_id.clone();
            tokio::spawn(async move {
                let _ = child.wait().await;
                tracing::debug!(guild_id, "reaped transcoder child with no consumer attached");
            });
        }
        self.playing.store(true, std::sync::atomic::Ordering::SeqCst);
        *self.on_finish.lock().unwrap() = Some(on_finish);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.finish_current(None);
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<()> {
        self.paused.store(paused, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.playing.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn is_paused(&self) -> bool {
        self.paused.load(std::sync::atomic::Ordering::SeqCst)
    }
}

/// Spawns a [`NullVoiceSink`] per guild; see its docs for why this is the
/// default.
pub struct NullVoiceSinkFactory;

impl crate::engine::VoiceSinkFactory for NullVoiceSinkFactory {
    fn create(&self, guild_id: &str) -> Box<dyn VoiceSink> {
        Box::new(NullVoiceSink::new(guild_id.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    struct FakeSink {
        channel: Mutex<Option<String>>,
        playing: AtomicBool,
        paused: AtomicBool,
    }

    impl FakeSink {
        fn new() -> Self {
            Self {
                channel: Mutex::new(None),
                playing: AtomicBool::new(false),
                paused: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl VoiceSink for FakeSink {
        async fn connect(&self, channel_id: &str) -> Result<()> {
            *self.channel.lock().unwrap() = Some(channel_id.to_owned());
            Ok(())
        }

        async fn leave(&self) -> Result<()> {
            *self.channel.lock().unwrap() = None;
            Ok(())
        }

        fn current_channel(&self) -> Option<String> {
            self.channel.lock().unwrap().clone()
        }

        async fn play(
            &self,
            _source: SourceHandle,
            _on_finish: oneshot::Sender<Option<String>>,
        ) -> Result<()> {
            self.playing.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.playing.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn set_paused(&self, paused: bool) -> Result<()> {
            self.paused.store(paused, Ordering::SeqCst);
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing.load(Ordering::SeqCst)
        }

        fn is_paused(&self) -> bool {
            self.paused.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn ensure_connected_returns_true_when_already_on_channel() {
        let mut session = VoiceSession::new(Box::new(FakeSink::new()), None);
        assert!(!session.ensure_connected("chan-1").await.unwrap());
        assert!(session.ensure_connected("chan-1").await.unwrap());
    }

    #[tokio::test]
    async fn pause_requires_active_playback() {
        let session = VoiceSession::new(Box::new(FakeSink::new()), None);
        assert!(matches!(session.pause().await, Err(EngineError::NotPlaying)));
    }
}
