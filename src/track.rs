//! Tunehall // Track
//!
//! The canonical track representation shared by the queue store, the extractor
//! pipeline, and the state projector.

use serde::{Deserialize, Serialize};

use crate::parsers::TimeParser;

/// Tag identifying which extractor produced a track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    PlatformA,
    PlatformB,
    PlatformC,
}

/// A queued or currently-playing track.
///
/// *Invariant:* `source_url` is non-empty or `title` is non-empty (usable as a
/// search query); `priority >= 0`; `requested_by` is always set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub title: String,

    #[serde(alias = "url")]
    pub source_url: String,

    #[serde(default)]
    pub artist: Option<String>,

    #[serde(default)]
    pub thumbnail: Option<String>,

    #[serde(default, alias = "duration")]
    pub duration_s: Option<u32>,

    #[serde(default)]
    pub provider: Option<Provider>,

    pub requested_by: String,

    #[serde(default)]
    pub priority: i64,

    #[serde(default)]
    pub enqueued_at: u64,
}

/// A loose, not-yet-normalized track as it may appear in a legacy snapshot, a
/// bare search-query string, or a freshly resolved extractor result.
pub enum RawTrackItem {
    Object(serde_json::Value),
    Url(String),
}

impl Track {
    /// Coerces a raw queue entry into a canonical [`Track`], the way the
    /// original playlist manager's item normalization does: fill a sane title
    /// from the URL when missing, drop quoting artifacts, coerce duration
    /// strings, and default everything else.
    pub fn coerce(
        item: RawTrackItem,
        requested_by: Option<String>,
        enqueued_at: u64,
        time_parser: &TimeParser,
    ) -> Self {
        match item {
            RawTrackItem::Url(raw) => {
                let url = clean_url(&raw);
                Track {
                    title: url.clone(),
                    source_url: url,
                    artist: None,
                    thumbnail: None,
                    duration_s: None,
                    provider: None,
                    requested_by: requested_by.unwrap_or_default(),
                    priority: 0,
                    enqueued_at,
                }
            }
            RawTrackItem::Object(value) => {
                let url = clean_url(
                    value
                        .get("url")
                        .or_else(|| value.get("source_url"))
                        .or_else(|| value.get("webpage_url"))
                        .or_else(|| value.get("link"))
                        .and_then(|v| v.as_str())
                        .unwrap_or(""),
                );

                let title = value
                    .get("title")
                    .and_then(|v| v.as_str())
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .unwrap_or_else(|| url.clone());

                let duration_s = value
                    .get("duration_s")
                    .or_else(|| value.get("duration"))
                    .and_then(|v| coerce_duration(v, time_parser));

                let artist = value
                    .get("artist")
                    .or_else(|| value.get("uploader"))
                    .or_else(|| value.get("channel"))
                    .and_then(|v| v.as_str())
                    .map(str::to_owned);

                let thumbnail = value
                    .get("thumbnail")
                    .or_else(|| value.get("thumb"))
                    .and_then(|v| v.as_str())
                    .map(str::to_owned);

                let provider = value
                    .get("provider")
                    .and_then(|v| serde_json::from_value(v.clone()).ok());

                let priority = value.get("priority").and_then(|v| v.as_i64()).unwrap_or(0);

                let requested_by = requested_by
                    .or_else(|| {
                        value
                            .get("requested_by")
                            .or_else(|| value.get("added_by"))
                            .and_then(|v| v.as_str())
                            .map(str::to_owned)
                    })
                    .unwrap_or_default();

                Track {
                    title,
                    source_url: url,
                    artist,
                    thumbnail,
                    duration_s,
                    provider,
                    requested_by,
                    priority,
                    enqueued_at,
                }
            }
        }
    }
}

fn coerce_duration(value: &serde_json::Value, time_parser: &TimeParser) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return Some(n as u32);
    }
    if let Some(s) = value.as_str() {
        return time_parser.coerce_seconds(s);
    }
    None
}

/// Strips quoting and trailing-semicolon artifacts that show up in legacy
/// queue snapshots, and falls back to a placeholder for an empty URL.
fn clean_url(raw: &str) -> String {
    let mut s = raw.trim().trim_matches(|c| c == '\'' || c == '"').to_owned();
    while s.ends_with(';') {
        s.pop();
    }
    if s.is_empty() {
        "about:blank".to_owned()
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> TimeParser {
        TimeParser::new().unwrap()
    }

    #[test]
    fn coerce_bare_url_fills_title_from_url() {
        let track = Track::coerce(
            RawTrackItem::Url("https://example.test/a".into()),
            Some("user-1".into()),
            10,
            &parser(),
        );
        assert_eq!(track.title, "https://example.test/a");
        assert_eq!(track.source_url, "https://example.test/a");
        assert_eq!(track.requested_by, "user-1");
    }

    #[test]
    fn coerce_object_normalizes_duration_string() {
        let value = serde_json::json!({
            "title": "Test Track",
            "url": "https://example.test/b",
            "duration": "215;",
        });
        let track = Track::coerce(RawTrackItem::Object(value), Some("me".into()), 0, &parser());
        assert_eq!(track.duration_s, Some(215));
        assert_eq!(track.title, "Test Track");
    }

    #[test]
    fn coerce_object_strips_quoted_url() {
        let value = serde_json::json!({ "url": "'https://example.test/c';" });
        let track = Track::coerce(RawTrackItem::Object(value), None, 0, &parser());
        assert_eq!(track.source_url, "https://example.test/c");
    }
}
