//! Tunehall // Extractor
//!
//! Provider detection, metadata normalization, and the two-stage stream
//! resolution fallback (direct, then piped). Each provider is an
//! [`Extractor`] implementation registered in priority order in
//! [`ExtractorRegistry`].

mod alpha;
mod beta;
mod gamma;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use lru::LruCache;
use tokio::process::Child;
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};
use crate::track::Provider;

pub use alpha::AlphaExtractor;
pub use beta::BetaExtractor;
pub use gamma::GammaExtractor;

/// Replaces the dynamic keyword-argument introspection of the original
/// extractors (Design Notes §9): every extractor receives the full struct
/// and reads only the fields it cares about.
#[derive(Debug, Clone, Default)]
pub struct ExtractorOptions {
    pub cookies: Option<PathBuf>,
    pub rate_limit: Option<u64>,
    pub audio_filter: Option<String>,
}

/// A short, unscored result from a provider's search endpoint.
#[derive(Debug, Clone)]
pub struct TrackSummary {
    pub title: String,
    pub url: String,
    pub artist: Option<String>,
    pub duration_s: Option<u32>,
}

/// Cheap metadata filled in when a queued item is missing a title/artist/thumbnail.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub thumbnail: Option<String>,
}

/// What the voice session consumes to start playback.
pub enum SourceHandle {
    /// A URL (plus any headers) the transcoder fetches directly.
    Direct { url: String, headers: HashMap<String, String> },
    /// A child process whose stdout is a raw audio byte stream.
    Piped(Child),
}

/// Provider-specific capability. Each provider implements this against its
/// own API/URL shape; the engine only ever talks to the trait.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn provider(&self) -> Provider;

    /// Whether `url` belongs to this provider.
    fn is_valid(&self, url: &str) -> bool;

    /// Whether `url` is a bundle (playlist/mix) for this provider.
    fn is_bundle(&self, _url: &str) -> bool {
        false
    }

    /// Free-text search. Unsupported by default.
    async fn search(&self, _query: &str) -> Result<Vec<TrackSummary>> {
        Err(EngineError::ProviderUnsupported)
    }

    /// Cheap metadata lookup used to fill in missing title/artist/thumbnail.
    async fn metadata(&self, _url: &str) -> Result<TrackMetadata> {
        Ok(TrackMetadata {
            title: None,
            artist: None,
            thumbnail: None,
        })
    }

    /// Expands a bundle URL into up to `limit` individual track URLs, in order.
    async fn expand_bundle(&self, _url: &str, _limit: usize) -> Result<Vec<String>> {
        Err(EngineError::ProviderUnsupported)
    }

    /// Stage 1: resolve a directly consumable stream.
    async fn stream(&self, url: &str, options: &ExtractorOptions) -> Result<(SourceHandle, String)>;

    /// Stage 2: resolve a piped stream, used only when stage 1 fails.
    async fn stream_pipe(
        &self,
        url: &str,
        options: &ExtractorOptions,
    ) -> Result<(SourceHandle, String)>;
}

/// Holds every registered extractor plus the metadata LRU, and implements
/// provider detection and the two-stage fallback.
pub struct ExtractorRegistry {
    extractors: Vec<Box<dyn Extractor>>,
    metadata_cache: Mutex<LruCache<String, TrackMetadata>>,
}

impl ExtractorRegistry {
    pub fn new(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self {
            extractors,
            metadata_cache: Mutex::new(LruCache::new(512)),
        }
    }

    /// Provider-detection order matches registration order; the first
    /// predicate match wins, and a free-text query defaults to the first
    /// registered extractor (the default search provider).
    pub fn detect(&self, url_or_query: &str) -> &dyn Extractor {
        for extractor in &self.extractors {
            if extractor.is_valid(url_or_query) {
                return extractor.as_ref();
            }
        }
        self.extractors[0].as_ref()
    }

    pub fn is_bundle_url(&self, url: &str) -> bool {
        self.detect(url).is_bundle(url)
    }

    /// Expands a bundle to at most `limit` tracks (default 10 at the call site).
    pub async fn expand_bundle(&self, url: &str, limit: usize) -> Result<Vec<String>> {
        self.detect(url).expand_bundle(url, limit).await
    }

    /// Fills in missing title/artist/thumbnail via a cached metadata lookup.
    pub async fn metadata(&self, url: &str) -> Result<TrackMetadata> {
        if let Some(hit) = self.metadata_cache.lock().await.get(url).cloned() {
            return Ok(hit);
        }
        let meta = self.detect(url).metadata(url).await?;
        self.metadata_cache.lock().await.put(url.to_owned(), meta.clone());
        Ok(meta)
    }

    /// Two-stage resolution: direct stream, falling back to a piped stream.
    /// (§4.3, S6)
    pub async fn resolve(
        &self,
        url: &str,
        options: &ExtractorOptions,
    ) -> Result<(SourceHandle, String)> {
        let extractor = self.detect(url);
        match extractor.stream(url, options).await {
            Ok(resolved) => Ok(resolved),
            Err(_) => extractor.stream_pipe(url, options).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    #[async_trait]
    impl Extractor for AlwaysFails {
        fn provider(&self) -> Provider {
            Provider::PlatformA
        }

        fn is_valid(&self, _url: &str) -> bool {
            true
        }

        async fn stream(&self, _url: &str, _options: &ExtractorOptions) -> Result<(SourceHandle, String)> {
            Err(EngineError::ExtractionFailed("direct stream unavailable".into()))
        }

        async fn stream_pipe(
            &self,
            _url: &str,
            _options: &ExtractorOptions,
        ) -> Result<(SourceHandle, String)> {
            Ok((
                SourceHandle::Direct {
                    url: "pipe://resolved".into(),
                    headers: HashMap::new(),
                },
                "real".into(),
            ))
        }
    }

    #[tokio::test]
    async fn resolve_falls_back_to_piped_stream_on_direct_failure() {
        let registry = ExtractorRegistry::new(vec![Box::new(AlwaysFails)]);
        let (_, title) = registry
            .resolve("https://example.test/x", &ExtractorOptions::default())
            .await
            .unwrap();
        assert_eq!(title, "real");
    }

    #[test]
    fn detect_falls_back_to_first_registered_extractor_for_free_text() {
        let registry = ExtractorRegistry::new(vec![Box::new(AlwaysFails)]);
        assert_eq!(registry.detect("just a search query").provider(), Provider::PlatformA);
    }
}
