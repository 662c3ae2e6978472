//! Tunehall // Extractor // Gamma
//!
//! A metadata-only provider: it never serves audio directly (its API is
//! oEmbed-style track metadata), so every resolution goes through the piped
//! fallback, which re-resolves the track on another provider via search.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tokio::process::Command;

use crate::error::{EngineError, Result};
use crate::extractor::{Extractor, ExtractorOptions, SourceHandle, TrackMetadata};
use crate::track::Provider;

pub struct GammaExtractor {
    url_pattern: Regex,
    http: Client,
    transcoder_path: String,
}

impl GammaExtractor {
    pub fn new(http: Client, transcoder_path: String) -> Self {
        Self {
            url_pattern: Regex::new(r"^https?://(open\.)?platform-c\.test/track/").unwrap(),
            http,
            transcoder_path,
        }
    }
}

#[async_trait]
impl Extractor for GammaExtractor {
    fn provider(&self) -> Provider {
        Provider::PlatformC
    }

    fn is_valid(&self, url: &str) -> bool {
        self.url_pattern.is_match(url)
    }

    async fn metadata(&self, url: &str) -> Result<TrackMetadata> {
        let response = self
            .http
            .get("https://platform-c.test/api/oembed")
            .query(&[("url", url)])
            .send()
            .await?;
        let body: serde_json::Value = response.json().await?;
        Ok(TrackMetadata {
            title: body.get("title").and_then(|v| v.as_str()).map(str::to_owned),
            artist: body.get("author_name").and_then(|v| v.as_str()).map(str::to_owned),
            thumbnail: body.get("thumbnail_url").and_then(|v| v.as_str()).map(str::to_owned),
        })
    }

    /// Gamma never serves audio; the direct stage always fails so the
    /// engine falls straight through to `stream_pipe`. (S6)
    async fn stream(&self, _url: &str, _options: &ExtractorOptions) -> Result<(SourceHandle, String)> {
        Err(EngineError::ExtractionFailed(
            "this provider does not serve direct audio".into(),
        ))
    }

    async fn stream_pipe(
        &self,
        url: &str,
        options: &ExtractorOptions,
    ) -> Result<(SourceHandle, String)> {
        let meta = self.metadata(url).await.unwrap_or(TrackMetadata {
            title: None,
            artist: None,
            thumbnail: None,
        });
        let query = match (&meta.title, &meta.artist) {
            (Some(title), Some(artist)) => format!("{artist} {title}"),
            (Some(title), None) => title.clone(),
            _ => url.to_owned(),
        };

        let mut command = Command::new(&self.transcoder_path);
        command
            .arg(format!("search:{query}"))
            .stdout(std::process::Stdio::piped());
        if let Some(limit) = options.rate_limit {
            command.arg("--rate-limit").arg(limit.to_string());
        }

        let child = command
            .spawn()
            .map_err(|e| EngineError::ExtractionFailed(format!("failed to spawn transcoder: {e}")))?;

        Ok((SourceHandle::Piped(child), meta.title.unwrap_or(query)))
    }
}
