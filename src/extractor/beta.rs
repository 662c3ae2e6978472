//! Tunehall // Extractor // Beta
//!
//! A provider that exposes individual tracks only: direct streams, no
//! bundle expansion.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tokio::process::Command;

use crate::error::{EngineError, Result};
use crate::extractor::{Extractor, ExtractorOptions, SourceHandle, TrackMetadata};
use crate::track::Provider;

pub struct BetaExtractor {
    url_pattern: Regex,
    http: Client,
    transcoder_path: String,
}

impl BetaExtractor {
    pub fn new(http: Client, transcoder_path: String) -> Self {
        Self {
            url_pattern: Regex::new(r"^https?://(www\.)?platform-b\.test/tracks/").unwrap(),
            http,
            transcoder_path,
        }
    }
}

#[async_trait]
impl Extractor for BetaExtractor {
    fn provider(&self) -> Provider {
        Provider::PlatformB
    }

    fn is_valid(&self, url: &str) -> bool {
        self.url_pattern.is_match(url)
    }

    async fn metadata(&self, url: &str) -> Result<TrackMetadata> {
        let response = self
            .http
            .get("https://platform-b.test/api/resolve")
            .query(&[("url", url)])
            .send()
            .await?;
        let body: serde_json::Value = response.json().await?;
        Ok(TrackMetadata {
            title: body.get("title").and_then(|v| v.as_str()).map(str::to_owned),
            artist: body.get("artist").and_then(|v| v.as_str()).map(str::to_owned),
            thumbnail: body.get("artwork_url").and_then(|v| v.as_str()).map(str::to_owned),
        })
    }

    async fn stream(&self, url: &str, _options: &ExtractorOptions) -> Result<(SourceHandle, String)> {
        let response = self
            .http
            .get("https://platform-b.test/api/stream")
            .query(&[("url", url)])
            .send()
            .await?;
        let body: serde_json::Value = response.json().await?;
        let stream_url = body
            .get("stream_url")
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::ExtractionFailed("no direct stream url".into()))?
            .to_owned();
        let title = body
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or(url)
            .to_owned();

        Ok((
            SourceHandle::Direct {
                url: stream_url,
                headers: HashMap::new(),
            },
            title,
        ))
    }

    async fn stream_pipe(
        &self,
        url: &str,
        options: &ExtractorOptions,
    ) -> Result<(SourceHandle, String)> {
        let mut command = Command::new(&self.transcoder_path);
        command.arg(url).stdout(std::process::Stdio::piped());
        if let Some(limit) = options.rate_limit {
            command.arg("--rate-limit").arg(limit.to_string());
        }

        let child = command
            .spawn()
            .map_err(|e| EngineError::ExtractionFailed(format!("failed to spawn transcoder: {e}")))?;

        Ok((SourceHandle::Piped(child), url.to_owned()))
    }
}
