//! Tunehall // Presence
//!
//! Tracks overlay subscribers per guild with a TTL heartbeat, and fans out
//! state broadcasts to the right room. Transport is decoupled behind
//! [`StateSink`] so this module never depends on a concrete WebSocket type.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

pub const DEFAULT_TTL_SECONDS: u64 = 45;
pub const DEFAULT_SWEEP_SECONDS: u64 = 20;

/// A registered overlay client.
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub id: Uuid,
    pub user_id: String,
    pub guild_id: String,
    pub meta: serde_json::Value,
    pub last_seen: Instant,
}

/// The broadcast capability presence depends on, decoupling it from the
/// concrete WebSocket transport (grounded in the pack's event-emitter
/// abstraction for exactly this kind of transport decoupling).
pub trait StateSink: Send + Sync {
    fn broadcast(&self, guild_id: &str, payload: &serde_json::Value);
}

/// A `tokio::sync::broadcast`-backed implementation, one channel per guild room.
pub struct BroadcastSink {
    rooms: DashMap<String, broadcast::Sender<String>>,
}

impl BroadcastSink {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Subscribes to the named guild's room, creating it if needed.
    pub fn subscribe(&self, guild_id: &str) -> broadcast::Receiver<String> {
        self.rooms
            .entry(guild_id.to_owned())
            .or_insert_with(|| broadcast::channel(64).0)
            .subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new()
    }
}

impl StateSink for BroadcastSink {
    /// Best-effort: a failed send (no subscribers, or a lagging receiver)
    /// must not block or fail other subscribers, so the `Err` from a closed
    /// channel is simply dropped.
    fn broadcast(&self, guild_id: &str, payload: &serde_json::Value) {
        if let Some(sender) = self.rooms.get(guild_id) {
            if let Ok(text) = serde_json::to_string(payload) {
                let _ = sender.send(text);
            }
        }
    }
}

/// Tracks subscribers across all guilds and sweeps stale entries.
pub struct PresenceRegistry {
    subscribers: DashMap<Uuid, Subscriber>,
    ttl: Duration,
}

impl PresenceRegistry {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            subscribers: DashMap::new(),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    /// Registers a subscriber on WebSocket "hello".
    pub fn register(&self, user_id: String, guild_id: String, meta: serde_json::Value) -> Uuid {
        let id = Uuid::new_v4();
        self.subscribers.insert(
            id,
            Subscriber {
                id,
                user_id,
                guild_id,
                meta,
                last_seen: Instant::now(),
            },
        );
        id
    }

    /// Refreshes TTL on `overlay_ping`. Returns `false` if the subscriber is
    /// unknown (already swept or never registered).
    pub fn heartbeat(&self, id: Uuid) -> bool {
        if let Some(mut entry) = self.subscribers.get_mut(&id) {
            entry.last_seen = Instant::now();
            true
        } else {
            false
        }
    }

    pub fn remove(&self, id: Uuid) {
        self.subscribers.remove(&id);
    }

    pub fn guild_of(&self, id: Uuid) -> Option<String> {
        self.subscribers.get(&id).map(|s| s.guild_id.clone())
    }

    /// Removes every subscriber whose `last_seen` is older than the TTL.
    pub fn sweep(&self) {
        let now = Instant::now();
        let stale: Vec<Uuid> = self
            .subscribers
            .iter()
            .filter(|entry| now.duration_since(entry.last_seen) > self.ttl)
            .map(|entry| *entry.key())
            .collect();

        for id in &stale {
            self.subscribers.remove(id);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "swept stale overlay subscribers");
        }
    }

    pub fn count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_and_heartbeat_round_trip() {
        let registry = PresenceRegistry::new(DEFAULT_TTL_SECONDS);
        let id = registry.register("u1".into(), "g1".into(), serde_json::json!({}));
        assert!(registry.heartbeat(id));
        assert_eq!(registry.guild_of(id), Some("g1".into()));
    }

    #[test]
    fn sweep_removes_entries_past_ttl() {
        let registry = PresenceRegistry::new(0);
        let id = registry.register("u1".into(), "g1".into(), serde_json::json!({}));
        std::thread::sleep(Duration::from_millis(5));
        registry.sweep();
        assert!(!registry.heartbeat(id));
    }

    #[test]
    fn broadcast_without_subscribers_does_not_panic() {
        let sink = BroadcastSink::new();
        sink.broadcast("g1", &serde_json::json!({"hello": true}));
    }
}
