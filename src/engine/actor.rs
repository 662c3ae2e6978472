//! Tunehall // Engine // Actor
//!
//! Each guild gets exactly one spawned task owning its [`GuildEngineState`]
//! exclusively; that task *is* the guild lock. Callers never touch state
//! directly — they send an [`EngineCommand`] and await a reply.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::info;

use crate::error::Result;
use crate::projector::ProjectedState;
use crate::track::RawTrackItem;

use super::state::{AudioMode, EnqueueOutcome, GuildEngineState, RepeatToggle};

const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Every operation the engine supports, addressed to a single guild's actor.
pub enum EngineCommand {
    Enqueue {
        user_id: String,
        item: RawTrackItem,
        voice_channel: Option<String>,
        reply: oneshot::Sender<Result<EnqueueOutcome>>,
    },
    PlayForUser {
        user_id: String,
        query: String,
        voice_channel: Option<String>,
        reply: oneshot::Sender<Result<EnqueueOutcome>>,
    },
    Skip {
        user_id: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    PlayAt {
        user_id: String,
        index: usize,
        reply: oneshot::Sender<Result<()>>,
    },
    Restart {
        user_id: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    TogglePause {
        user_id: Option<String>,
        reply: oneshot::Sender<Result<bool>>,
    },
    Stop {
        user_id: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        user_id: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    Resume {
        user_id: Option<String>,
        reply: oneshot::Sender<Result<()>>,
    },
    RemoveAt {
        user_id: String,
        index: usize,
        reply: oneshot::Sender<Result<bool>>,
    },
    Move {
        user_id: String,
        src: usize,
        dst: usize,
        reply: oneshot::Sender<Result<bool>>,
    },
    ToggleRepeat {
        mode: RepeatToggle,
        reply: oneshot::Sender<bool>,
    },
    SetAudioMode {
        mode: AudioMode,
        reply: oneshot::Sender<bool>,
    },
    GetState {
        reply: oneshot::Sender<ProjectedState>,
    },
    EnsureConnected {
        channel_id: String,
        reply: oneshot::Sender<Result<bool>>,
    },
    /// Fed back by the `on_finish` waiter task spawned from `play_next`; no
    /// reply channel, since nothing is waiting on it directly. (I9)
    Finished {
        err: Option<String>,
    },
}

/// Drains `inbox` until every sender is dropped, ticking the progress clock
/// at 1 Hz alongside it. This loop is the only place `state` is ever
/// mutated, so there is no shared-state locking anywhere in the engine.
pub async fn run(mut state: GuildEngineState, mut inbox: mpsc::Receiver<EngineCommand>) {
    let mut ticker = interval(TICK_INTERVAL);
    ticker.tick().await; // first tick fires immediately; discard it

    loop {
        tokio::select! {
            command = inbox.recv() => {
                match command {
                    Some(command) => handle(&mut state, command).await,
                    None => {
                        info!(guild_id = %state.guild_id, "engine actor inbox closed, shutting down");
                        break;
                    }
                }
            }
            _ = ticker.tick() => {
                state.broadcast_progress();
            }
        }
    }
}

async fn handle(state: &mut GuildEngineState, command: EngineCommand) {
    match command {
        EngineCommand::Enqueue {
            user_id,
            item,
            voice_channel,
            reply,
        } => {
            let result = state.enqueue(&user_id, item, voice_channel.as_deref()).await;
            let _ = reply.send(result);
        }
        EngineCommand::PlayForUser {
            user_id,
            query,
            voice_channel,
            reply,
        } => {
            let result = state
                .play_for_user(&user_id, &query, voice_channel.as_deref())
                .await;
            let _ = reply.send(result);
        }
        EngineCommand::Skip { user_id, reply } => {
            let result = state.skip(user_id.as_deref()).await;
            let _ = reply.send(result);
        }
        EngineCommand::Stop { user_id, reply } => {
            let result = state.stop(user_id.as_deref()).await;
            let _ = reply.send(result);
        }
        EngineCommand::PlayAt { user_id, index, reply } => {
            let result = state.play_at(&user_id, index).await;
            let _ = reply.send(result);
        }
        EngineCommand::Restart { user_id, reply } => {
            let result = state.restart(user_id.as_deref()).await;
            let _ = reply.send(result);
        }
        EngineCommand::TogglePause { user_id, reply } => {
            let result = state.toggle_pause(user_id.as_deref()).await;
            let _ = reply.send(result);
        }
        EngineCommand::Pause { user_id, reply } => {
            let result = state.pause(user_id.as_deref()).await;
            let _ = reply.send(result);
        }
        EngineCommand::Resume { user_id, reply } => {
            let result = state.resume(user_id.as_deref()).await;
            let _ = reply.send(result);
        }
        EngineCommand::RemoveAt { user_id, index, reply } => {
            let result = state.remove_at(&user_id, index);
            let _ = reply.send(result);
        }
        EngineCommand::Move {
            user_id,
            src,
            dst,
            reply,
        } => {
            let result = state.move_item(&user_id, src, dst);
            let _ = reply.send(result);
        }
        EngineCommand::ToggleRepeat { mode, reply } => {
            let result = state.toggle_repeat(mode);
            let _ = reply.send(result);
        }
        EngineCommand::SetAudioMode { mode, reply } => {
            let result = state.set_audio_mode(mode);
            let _ = reply.send(result);
        }
        EngineCommand::GetState { reply } => {
            let _ = reply.send(state.get_state());
        }
        EngineCommand::EnsureConnected { channel_id, reply } => {
            let result = state.ensure_connected(&channel_id).await;
            let _ = reply.send(result);
        }
        EngineCommand::Finished { err } => {
            state.handle_finished(err).await;
        }
    }
}
