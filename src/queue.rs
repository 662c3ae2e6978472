//! Tunehall // Queue
//!
//! Per-guild persistent priority queue. Memory is the source of truth; the
//! on-disk snapshot exists only for crash recovery and is never read back
//! during a write (Design Notes: "cross-process playlist reload").

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::parsers::TimeParser;
use crate::track::{RawTrackItem, Track};

/// On-disk representation of a guild's queue.
#[derive(Serialize, Deserialize)]
struct QueueFile {
    now_playing: Option<Track>,
    queue: Vec<Track>,
}

/// Either the current object-shaped snapshot, or the legacy bare-array form
/// (the file used to just *be* the queue).
#[derive(Deserialize)]
#[serde(untagged)]
enum QueueFileForm {
    Current(QueueFile),
    Legacy(Vec<serde_json::Value>),
}

/// A single guild's queue, held in memory and snapshotted to `path` on every
/// mutation.
pub struct GuildQueue {
    path: PathBuf,
    now_playing: Option<Track>,
    queue: Vec<Track>,
    time_parser: TimeParser,
    next_enqueued_at: u64,
}

impl GuildQueue {
    /// Loads (or initializes) the queue for `guild_id` under `base_dir`.
    pub fn load(base_dir: &Path, guild_id: &str) -> Self {
        fs::create_dir_all(base_dir).ok();
        let path = base_dir.join(format!("playlist_{guild_id}.json"));
        let time_parser = TimeParser::new().expect("duration regex patterns are valid");

        let (now_playing, queue) = match fs::read_to_string(&path) {
            Err(_) => (None, Vec::new()),
            Ok(contents) => match serde_json::from_str::<QueueFileForm>(&contents) {
                Ok(QueueFileForm::Current(file)) => (file.now_playing, file.queue),
                Ok(QueueFileForm::Legacy(items)) => {
                    let queue = items
                        .into_iter()
                        .enumerate()
                        .map(|(i, v)| {
                            Track::coerce(RawTrackItem::Object(v), None, i as u64, &time_parser)
                        })
                        .collect();
                    (None, queue)
                }
                Err(e) => {
                    warn!(guild_id, error = %e, "corrupt queue snapshot, resetting to empty");
                    (None, Vec::new())
                }
            },
        };

        let next_enqueued_at = queue.len() as u64;
        let mut this = Self {
            path,
            now_playing,
            queue,
            time_parser,
            next_enqueued_at,
        };
        this.save();
        this
    }

    /// Atomically writes the current in-memory state to disk: temp file,
    /// `fsync`, then rename. Persistence failures are logged, not propagated
    /// — the in-memory mutation already happened and the next successful
    /// write heals the snapshot.
    fn save(&mut self) {
        if let Err(e) = self.try_save() {
            warn!(path = %self.path.display(), error = %e, "failed to persist queue snapshot");
        }
    }

    fn try_save(&self) -> std::io::Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let file = QueueFile {
            now_playing: self.now_playing.clone(),
            queue: self.queue.clone(),
        };
        let payload = serde_json::to_vec(&file)?;

        let tmp_path = dir.join(format!(
            ".{}.tmp",
            self.path.file_name().unwrap().to_string_lossy()
        ));
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&payload)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        debug!(path = %self.path.display(), items = file.queue.len(), "queue snapshot saved");
        Ok(())
    }

    /// Normalizes `item` into a canonical [`Track`] using this queue's duration parser.
    pub fn coerce(&mut self, item: RawTrackItem, requested_by: Option<String>) -> Track {
        let enqueued_at = self.next_enqueued_at;
        self.next_enqueued_at += 1;
        Track::coerce(item, requested_by, enqueued_at, &self.time_parser)
    }

    /// Inserts `track` at the smallest index whose existing priority is
    /// strictly lower, preserving enqueue order among equal priorities.
    /// (I1, S1)
    pub fn add(&mut self, track: Track) {
        let pos = self
            .queue
            .iter()
            .position(|t| t.priority < track.priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, track);
        self.save();
    }

    /// Pops the head of the queue and marks it as `now_playing`.
    pub fn pop_next(&mut self) -> Option<Track> {
        if self.queue.is_empty() {
            return None;
        }
        let track = self.queue.remove(0);
        self.now_playing = Some(track.clone());
        self.save();
        Some(track)
    }

    pub fn set_now_playing(&mut self, track: Option<Track>) {
        self.now_playing = track;
        self.save();
    }

    pub fn now_playing(&self) -> Option<&Track> {
        self.now_playing.as_ref()
    }

    /// Clears the queue and `now_playing`. (I3)
    pub fn stop(&mut self) {
        self.queue.clear();
        self.now_playing = None;
        self.save();
    }

    pub fn remove_at(&mut self, index: usize) -> bool {
        if index >= self.queue.len() {
            return false;
        }
        self.queue.remove(index);
        self.save();
        true
    }

    pub fn move_item(&mut self, src: usize, dst: usize) -> bool {
        if src == dst || src >= self.queue.len() || dst >= self.queue.len() {
            return false;
        }
        let item = self.queue.remove(src);
        self.queue.insert(dst, item);
        self.save();
        true
    }

    pub fn peek_all(&self) -> &[Track] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Re-enqueues `track` at the tail, used by `repeat_all`. (S4)
    pub fn requeue_tail(&mut self, track: Track) {
        self.queue.push(track);
        self.save();
    }

    /// Re-enqueues `track` at the head, used by `play_at`/`restart` to put a
    /// track back at the front of the line before re-triggering `play_next`.
    pub fn requeue_front(&mut self, track: Track) {
        self.queue.insert(0, track);
        self.save();
    }

    /// Removes and returns the item at `index`, or `None` if out of range.
    pub fn take_at(&mut self, index: usize) -> Option<Track> {
        if index >= self.queue.len() {
            return None;
        }
        let track = self.queue.remove(index);
        self.save();
        Some(track)
    }

    /// Index of the first item whose priority is the baseline (`0`), i.e. the
    /// boundary between the priority band and the normal band.
    pub fn first_non_priority_index(&self) -> usize {
        self.queue
            .iter()
            .position(|t| t.priority == 0)
            .unwrap_or(self.queue.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::track::Provider;

    fn track(title: &str, priority: i64) -> Track {
        Track {
            title: title.to_owned(),
            source_url: format!("https://example.test/{title}"),
            artist: None,
            thumbnail: None,
            duration_s: None,
            provider: Some(Provider::PlatformA),
            requested_by: "user".to_owned(),
            priority,
            enqueued_at: 0,
        }
    }

    fn temp_queue() -> (tempfile::TempDir, GuildQueue) {
        let dir = tempfile::tempdir().unwrap();
        let queue = GuildQueue::load(dir.path(), "1");
        (dir, queue)
    }

    #[test]
    fn priority_insertion_orders_by_priority_then_enqueue_order() {
        let (_dir, mut q) = temp_queue();
        q.add(track("A", 0));
        q.add(track("B", 0));
        q.add(track("C", 10));

        let titles: Vec<_> = q.peek_all().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
    }

    #[test]
    fn stop_clears_queue_and_now_playing() {
        let (_dir, mut q) = temp_queue();
        q.add(track("A", 0));
        q.pop_next();
        q.stop();
        assert!(q.is_empty());
        assert!(q.now_playing().is_none());
    }

    #[test]
    fn remove_at_and_move_reject_out_of_range() {
        let (_dir, mut q) = temp_queue();
        q.add(track("A", 0));
        assert!(!q.remove_at(5));
        assert!(!q.move_item(0, 5));
    }

    #[test]
    fn persistence_round_trip_reloads_equivalent_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut q = GuildQueue::load(dir.path(), "42");
            q.add(track("A", 0));
            q.add(track("B", 10));
        }
        let reloaded = GuildQueue::load(dir.path(), "42");
        let titles: Vec<_> = reloaded
            .peek_all()
            .iter()
            .map(|t| t.title.as_str())
            .collect();
        assert_eq!(titles, vec!["B", "A"]);
    }

    #[test]
    fn legacy_bare_array_snapshot_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist_7.json");
        fs::write(&path, r#"["https://example.test/legacy"]"#).unwrap();
        let q = GuildQueue::load(dir.path(), "7");
        assert_eq!(q.len(), 1);
        assert_eq!(q.peek_all()[0].source_url, "https://example.test/legacy");
    }
}
