//! Tunehall // App
//!
//! The dependency-injection container: builds every long-lived collaborator
//! once at startup and hands out clones of the `Arc`s to the HTTP layer and
//! every guild actor it spawns.

use std::sync::Arc;

use reqwest::Client;

use crate::config::Config;
use crate::engine::GuildRegistry;
use crate::extractor::{AlphaExtractor, BetaExtractor, ExtractorOptions, ExtractorRegistry, GammaExtractor};
use crate::presence::{BroadcastSink, PresenceRegistry};
use crate::priority::PriorityResolver;
use crate::roles::CachedMemberRoles;
use crate::voice::NullVoiceSinkFactory;

#[derive(Clone)]
pub struct App {
    pub config: Arc<Config>,
    pub registry: Arc<GuildRegistry>,
    pub presence: Arc<PresenceRegistry>,
    pub sink: Arc<BroadcastSink>,
    pub roles: Arc<CachedMemberRoles>,
}

impl App {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let http = Client::builder()
            .user_agent(concat!("tunehall/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("static reqwest client configuration is valid");

        let extractors = Arc::new(ExtractorRegistry::new(vec![
            Box::new(AlphaExtractor::new(http.clone(), config.transcoder_path.clone())),
            Box::new(BetaExtractor::new(http.clone(), config.transcoder_path.clone())),
            Box::new(GammaExtractor::new(http.clone(), config.transcoder_path.clone())),
        ]));

        let resolver = Arc::new(PriorityResolver::new(
            config.priority_role_weights.clone(),
            config.owner_id.clone(),
            config.per_user_cap,
        ));

        let roles: Arc<CachedMemberRoles> = Arc::new(CachedMemberRoles::new());
        let sink = Arc::new(BroadcastSink::new());
        let presence = Arc::new(PresenceRegistry::new(config.presence_ttl_seconds));

        let extractor_options = ExtractorOptions {
            cookies: config.cookies_file.clone(),
            rate_limit: config.stream_rate_limit,
            audio_filter: None,
        };

        let registry = Arc::new(GuildRegistry::new(
            config.playlist_dir.clone(),
            resolver,
            roles.clone(),
            extractors,
            sink.clone(),
            Arc::new(NullVoiceSinkFactory),
            config.audio_eq_presets.clone(),
            config.intro_asset_path.clone(),
            config.bundle_limit,
            extractor_options,
        ));

        Self {
            config,
            registry,
            presence,
            sink,
            roles,
        }
    }
}
