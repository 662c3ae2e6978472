//! Tunehall // Projector
//!
//! Builds the public "overlay state" from engine state, and the 1 Hz
//! progress ticker that runs while a guild is playing or paused.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;

use crate::track::Track;

/// The read-only snapshot shared with subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectedState {
    pub queue: Vec<Track>,
    pub current: Option<Track>,
    pub paused: bool,
    pub position_s: f64,
    pub duration_s: Option<u32>,
    pub thumbnail: Option<String>,
    pub repeat_all: bool,
    pub requested_by_user: Option<String>,
    pub queue_users: Vec<String>,
}

/// The lightweight per-second delta emitted while playback is active.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressDelta {
    pub only_elapsed: bool,
    pub paused: bool,
    pub position_s: f64,
    pub duration_s: Option<u32>,
}

/// Everything the projector needs to compute a snapshot; deliberately a
/// plain struct rather than a borrow of `GuildEngineState` so the projector
/// has no dependency on the engine module.
pub struct ProjectionInput<'a> {
    pub queue: &'a [Track],
    pub current: Option<&'a Track>,
    pub paused: bool,
    pub play_started_at: Option<Instant>,
    pub paused_since: Option<Instant>,
    pub paused_total_s: f64,
    pub repeat_all: bool,
}

/// Computes `elapsed = max(0, (paused_since ?? now) - play_started_at - paused_total_s)`,
/// clamped to `duration_s` when known.
pub fn elapsed_seconds(
    play_started_at: Option<Instant>,
    paused_since: Option<Instant>,
    paused_total_s: f64,
    now: Instant,
) -> f64 {
    let Some(started) = play_started_at else {
        return 0.0;
    };
    let reference = paused_since.unwrap_or(now);
    let raw = reference.saturating_duration_since(started).as_secs_f64() - paused_total_s;
    raw.max(0.0)
}

/// Projects engine-internal state into the public [`ProjectedState`].
/// `current = null ⇒ position_s = 0` and `position_s ≤ duration_s` when both known.
pub fn project(input: ProjectionInput<'_>, now: Instant) -> ProjectedState {
    let position_s = if input.current.is_none() {
        0.0
    } else {
        elapsed_seconds(
            input.play_started_at,
            input.paused_since,
            input.paused_total_s,
            now,
        )
    };

    let duration_s = input.current.and_then(|t| t.duration_s);
    let position_s = match duration_s {
        Some(d) => position_s.min(d as f64),
        None => position_s,
    };

    let mut seen = HashMap::new();
    let mut queue_users = Vec::new();
    for track in input.queue {
        if queue_users.len() >= 25 {
            break;
        }
        if seen.insert(track.requested_by.clone(), ()).is_none() {
            queue_users.push(track.requested_by.clone());
        }
    }

    ProjectedState {
        queue: input.queue.to_vec(),
        current: input.current.cloned(),
        paused: input.paused,
        position_s,
        duration_s,
        thumbnail: input.current.and_then(|t| t.thumbnail.clone()),
        repeat_all: input.repeat_all,
        requested_by_user: input.current.map(|t| t.requested_by.clone()),
        queue_users,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn elapsed_is_zero_before_playback_starts() {
        assert_eq!(elapsed_seconds(None, None, 0.0, Instant::now()), 0.0);
    }

    #[test]
    fn elapsed_subtracts_paused_total() {
        let started = Instant::now() - StdDuration::from_secs(10);
        let elapsed = elapsed_seconds(Some(started), None, 3.0, Instant::now());
        assert!((elapsed - 7.0).abs() < 0.2);
    }

    #[test]
    fn elapsed_freezes_at_paused_since() {
        let started = Instant::now() - StdDuration::from_secs(20);
        let paused_since = Instant::now() - StdDuration::from_secs(5);
        let elapsed = elapsed_seconds(Some(started), Some(paused_since), 0.0, Instant::now());
        assert!((elapsed - 15.0).abs() < 0.2);
    }

    #[test]
    fn position_clamps_to_duration_and_nulls_with_no_current() {
        let input = ProjectionInput {
            queue: &[],
            current: None,
            paused: false,
            play_started_at: Some(Instant::now() - StdDuration::from_secs(999)),
            paused_since: None,
            paused_total_s: 0.0,
            repeat_all: false,
        };
        let state = project(input, Instant::now());
        assert_eq!(state.position_s, 0.0);
    }
}
