//! Configuration parsing and management.

use std::{
    collections::HashMap,
    env,
    error,
    fmt::{self, Display, Formatter},
    fs::read_to_string,
    io,
    path::{Path, PathBuf},
};

use clap::Parser;
use serde::Deserialize;
use tracing::{debug, warn};

#[cfg(windows)]
mod windows {
    //! Windows-specific configuration parsing and management.

    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// The default configuration file path.
    pub fn default_config_file() -> PathBuf {
        Path::new(&env::var("APPDATA").unwrap_or("C:\\ProgramData".to_owned()))
            .join("Tunehall\\Config.toml")
    }
}

#[cfg(windows)]
pub use windows::*;

#[cfg(unix)]
mod unix {
    //! Unix-specific configuration parsing and management.

    use std::{
        env,
        path::{Path, PathBuf},
    };

    /// The default configuration file path.
    pub fn default_config_file() -> PathBuf {
        Path::new(&env::var("XDG_CONFIG_HOME").unwrap_or("/etc".to_owned()))
            .join("tunehall/config.toml")
    }
}

#[cfg(unix)]
pub use unix::*;

/// The command line arguments.
#[derive(Debug, Parser, PartialEq, Clone)]
#[command(name = "Tunehall", version, about, long_about = None)]
pub struct Args {
    /// Configuration file path.
    #[arg(short, long, help = "The configuration file path.", long_help = None)]
    pub config_file: Option<PathBuf>,

    /// HTTP bind address, overriding the config file and environment.
    #[arg(short, long, help = "The HTTP bind address (e.g. 127.0.0.1:8080).", long_help = None)]
    pub bind: Option<String>,
}

/// Errors that can occur while parsing the configuration file.
#[derive(Debug)]
pub enum LoadFileError {
    /// An I/O error occurred while reading the file.
    Io(io::Error),

    /// A TOML error occurred while parsing the file.
    Toml(toml::de::Error),
}

impl Display for LoadFileError {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "I/O error: {}", err),
            Self::Toml(err) => write!(f, "TOML error: {}", err),
        }
    }
}

impl error::Error for LoadFileError {}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_owned()
}

fn default_playlist_dir() -> PathBuf {
    PathBuf::from("./playlists")
}

fn default_per_user_cap() -> usize {
    10
}

fn default_presence_ttl_seconds() -> u64 {
    crate::presence::DEFAULT_TTL_SECONDS
}

fn default_presence_sweep_seconds() -> u64 {
    crate::presence::DEFAULT_SWEEP_SECONDS
}

fn default_transcoder_path() -> String {
    "yt-dlp".to_owned()
}

/// The validated configuration of the service: the union of CLI flags, an
/// optional TOML file, and environment variables, with CLI > env > file >
/// default precedence.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    /// Socket address the HTTP/WebSocket API binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Directory holding each guild's `playlist_<guild_id>.json` snapshot.
    #[serde(default = "default_playlist_dir")]
    pub playlist_dir: PathBuf,

    /// Maximum queued tracks per user, unless they bypass quota.
    #[serde(default = "default_per_user_cap")]
    pub per_user_cap: usize,

    /// Overlay subscriber TTL, in seconds.
    #[serde(default = "default_presence_ttl_seconds")]
    pub presence_ttl_seconds: u64,

    /// Overlay subscriber sweep interval, in seconds.
    #[serde(default = "default_presence_sweep_seconds")]
    pub presence_sweep_seconds: u64,

    /// Named role → priority weight overrides.
    #[serde(default)]
    pub priority_role_weights: HashMap<String, i64>,

    /// The id of the user in the owner priority class.
    #[serde(default)]
    pub owner_id: Option<String>,

    /// Named transcoder filter presets, keyed by audio mode (`off`, `music`).
    #[serde(default)]
    pub audio_eq_presets: HashMap<String, String>,

    /// Path to the audio asset played on a guild's first voice connect.
    #[serde(default)]
    pub intro_asset_path: Option<String>,

    /// Path to the transcoder binary used for the piped extraction fallback.
    #[serde(default = "default_transcoder_path")]
    pub transcoder_path: String,

    /// Upper bound on stream throughput, in bytes/s, passed to the transcoder.
    #[serde(default)]
    pub stream_rate_limit: Option<u64>,

    /// Cookie jar file used by extractors that need an authenticated session.
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,

    /// Maximum tracks expanded from a single bundle/playlist URL.
    #[serde(default = "default_bundle_limit")]
    pub bundle_limit: usize,
}

fn default_bundle_limit() -> usize {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            playlist_dir: default_playlist_dir(),
            per_user_cap: default_per_user_cap(),
            presence_ttl_seconds: default_presence_ttl_seconds(),
            presence_sweep_seconds: default_presence_sweep_seconds(),
            priority_role_weights: HashMap::new(),
            owner_id: None,
            audio_eq_presets: HashMap::new(),
            intro_asset_path: None,
            transcoder_path: default_transcoder_path(),
            stream_rate_limit: None,
            cookies_file: None,
            bundle_limit: default_bundle_limit(),
        }
    }
}

impl Config {
    /// Parse the configuration from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoadFileError> {
        let file_content = read_to_string(path).map_err(LoadFileError::Io)?;
        toml::de::from_str(&file_content).map_err(LoadFileError::Toml)
    }

    /// Overwrite configuration values that still hold their default with the
    /// ones from the environment.
    pub fn or_from_env(mut self) -> Self {
        if let Ok(v) = env::var("HTTP_BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Ok(v) = env::var("PLAYLIST_DIR") {
            self.playlist_dir = PathBuf::from(v);
        }
        if let Ok(v) = env::var("QUEUE_PER_USER_CAP") {
            if let Ok(n) = v.parse() {
                self.per_user_cap = n;
            }
        }
        if let Ok(v) = env::var("PRESENCE_TTL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.presence_ttl_seconds = n;
            }
        }
        if let Ok(v) = env::var("PRESENCE_SWEEP_SECONDS") {
            if let Ok(n) = v.parse() {
                self.presence_sweep_seconds = n;
            }
        }
        if let Ok(v) = env::var("PRIORITY_ROLE_WEIGHTS") {
            if let Ok(map) = serde_json::from_str(&v) {
                self.priority_role_weights = map;
            } else {
                warn!("PRIORITY_ROLE_WEIGHTS is not valid JSON, ignoring");
            }
        }
        if let Ok(v) = env::var("GREG_OWNER_ID") {
            self.owner_id = Some(v);
        }
        if let Ok(v) = env::var("AUDIO_EQ_PRESETS") {
            if let Ok(map) = serde_json::from_str(&v) {
                self.audio_eq_presets = map;
            } else {
                warn!("AUDIO_EQ_PRESETS is not valid JSON, ignoring");
            }
        }
        if let Ok(v) = env::var("INTRO_ASSET_PATH") {
            self.intro_asset_path = Some(v);
        }
        if let Ok(v) = env::var("TRANSCODER_PATH") {
            self.transcoder_path = v;
        }
        if let Ok(v) = env::var("STREAM_RATE_LIMIT") {
            if let Ok(n) = v.parse() {
                self.stream_rate_limit = Some(n);
            }
        }
        if let Ok(v) = env::var("COOKIES_FILE") {
            self.cookies_file = Some(PathBuf::from(v));
        }
        self
    }
}

/// Try to load the configuration: CLI flags take precedence over
/// environment variables, which take precedence over the file, which takes
/// precedence over the built-in defaults.
pub fn load_configuration() -> Config {
    debug!("searching for the configuration file...");
    let args = Args::parse();

    let config_file = args
        .config_file
        .clone()
        .or(env::var("TUNEHALL_CONFIG_FILE").ok().map(PathBuf::from))
        .unwrap_or(default_config_file());

    debug!("loading the configuration file: {:?}", config_file);
    let mut config = match Config::from_file(&config_file) {
        Ok(v) => v,
        Err(e) => {
            warn!("failed to load the configuration file {:?}: {}", config_file, e);
            Config::default()
        }
    };

    config = config.or_from_env();

    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }

    config
}
