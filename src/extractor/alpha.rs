//! Tunehall // Extractor // Alpha
//!
//! The default search provider: supports direct URLs, bundle (playlist)
//! URLs, and free-text search.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tokio::process::Command;

use crate::error::{EngineError, Result};
use crate::extractor::{Extractor, ExtractorOptions, SourceHandle, TrackMetadata, TrackSummary};
use crate::track::Provider;

pub struct AlphaExtractor {
    url_pattern: Regex,
    bundle_pattern: Regex,
    http: Client,
    transcoder_path: String,
}

impl AlphaExtractor {
    pub fn new(http: Client, transcoder_path: String) -> Self {
        Self {
            url_pattern: Regex::new(r"^https?://(www\.)?platform-a\.test/watch").unwrap(),
            bundle_pattern: Regex::new(r"[?&]list=").unwrap(),
            http,
            transcoder_path,
        }
    }
}

#[async_trait]
impl Extractor for AlphaExtractor {
    fn provider(&self) -> Provider {
        Provider::PlatformA
    }

    fn is_valid(&self, url: &str) -> bool {
        self.url_pattern.is_match(url)
    }

    fn is_bundle(&self, url: &str) -> bool {
        self.bundle_pattern.is_match(url)
    }

    async fn search(&self, query: &str) -> Result<Vec<TrackSummary>> {
        let response = self
            .http
            .get("https://platform-a.test/api/search")
            .query(&[("q", query)])
            .send()
            .await?;
        let body: serde_json::Value = response.json().await?;
        let results = body
            .get("results")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(results
            .into_iter()
            .filter_map(|item| {
                Some(TrackSummary {
                    title: item.get("title")?.as_str()?.to_owned(),
                    url: item.get("url")?.as_str()?.to_owned(),
                    artist: item.get("channel").and_then(|v| v.as_str()).map(str::to_owned),
                    duration_s: item.get("duration_s").and_then(|v| v.as_u64()).map(|n| n as u32),
                })
            })
            .collect())
    }

    async fn metadata(&self, url: &str) -> Result<TrackMetadata> {
        let response = self
            .http
            .get("https://platform-a.test/api/oembed")
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

    async fn expand_bundle(&self, url: &str, limit: usize) -> Result<Vec<String>> {
        let response = self
            .http
            .get("https://platform-a.test/api/bundle")
            .query(&[("url", url)])
            .send()
            .await?;
        let body: serde_json::Value = response.json().await?;
        let items = body
            .get("items")
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        Ok(items
            .into_iter()
            .filter_map(|item| item.get("url")?.as_str().map(str::to_owned))
            .take(limit)
            .collect())
    }

    async fn stream(&self, url: &str, _options: &ExtractorOptions) -> Result<(SourceHandle, String)> {
        let response = self
            .http
            .get("https://platform-a.test/api/stream")
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
        if let Some(cookies) = &options.cookies {
            command.arg("--cookies").arg(cookies);
        }
        if let Some(limit) = options.rate_limit {
            command.arg("--rate-limit").arg(limit.to_string());
        }

        let child = command
            .spawn()
            .map_err(|e| EngineError::ExtractionFailed(format!("failed to spawn transcoder: {e}")))?;

        Ok((SourceHandle::Piped(child), url.to_owned()))
    }
}
