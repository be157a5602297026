//! Service configuration.
//!
//! Settings come from three layers, later wins: built-in defaults, an
//! optional `avisos.toml` in the working directory, then environment
//! variables (a `.env` file is loaded first when present). The API key is
//! env-only (`AEMET_API_KEY`) so it never lands in a checked-in file.

use serde::Deserialize;
use std::env;
use std::fmt;
use std::fs;
use std::path::PathBuf;

use crate::ingest::aemet::DEFAULT_BASE_URL;
use crate::ingest::FeedFormat;

const CONFIG_FILE: &str = "avisos.toml";

// ----------------------------------------------------------------------------
// Resolved configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// AEMET OpenData API key (https://opendata.aemet.es/centrodedescargas/altaUsuario).
    pub api_key: String,
    pub base_url: String,
    /// Directory the snapshot files live in.
    pub data_dir: PathBuf,
    pub feed_format: FeedFormat,
    pub sync_interval_minutes: u64,
    /// Pause between region-scoped requests, to stay inside rate limits.
    pub region_delay_ms: u64,
    pub metadata_timeout_secs: u64,
    pub payload_timeout_secs: u64,
    pub cache_ttl_minutes: i64,
    /// Optional log file; console logging is always on.
    pub log_file: Option<String>,
}

impl ServiceConfig {
    /// Defaults for everything except the credentials and storage location.
    pub fn with_defaults(api_key: String, data_dir: PathBuf) -> ServiceConfig {
        ServiceConfig {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir,
            feed_format: FeedFormat::PerRegionJson,
            sync_interval_minutes: 30,
            region_delay_ms: 400,
            metadata_timeout_secs: 15,
            payload_timeout_secs: 60,
            cache_ttl_minutes: 10,
            log_file: None,
        }
    }
}

// ----------------------------------------------------------------------------
// Errors
// ----------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    MissingApiKey,
    PlaceholderApiKey,
    InvalidFeedFormat(String),
    InvalidFile(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingApiKey => write!(
                f,
                "AEMET_API_KEY is not set (request one at \
                 https://opendata.aemet.es/centrodedescargas/altaUsuario)"
            ),
            ConfigError::PlaceholderApiKey => {
                write!(f, "AEMET_API_KEY still holds a placeholder value")
            }
            ConfigError::InvalidFeedFormat(got) => write!(
                f,
                "unknown feed format '{}' (expected per-region-json, national-feed or archived-cap)",
                got
            ),
            ConfigError::InvalidFile(err) => write!(f, "could not parse {}: {}", CONFIG_FILE, err),
        }
    }
}

impl std::error::Error for ConfigError {}

// ----------------------------------------------------------------------------
// File layer
// ----------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(default)]
    feed: FeedSection,
    #[serde(default)]
    storage: StorageSection,
    #[serde(default)]
    sync: SyncSection,
    #[serde(default)]
    http: HttpSection,
    #[serde(default)]
    cache: CacheSection,
    #[serde(default)]
    log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
struct FeedSection {
    format: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSection {
    data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SyncSection {
    interval_minutes: Option<u64>,
    region_delay_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct HttpSection {
    metadata_timeout_secs: Option<u64>,
    payload_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CacheSection {
    ttl_minutes: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct LogSection {
    file: Option<String>,
}

fn parse_file(text: &str) -> Result<FileConfig, ConfigError> {
    toml::from_str(text).map_err(|e| ConfigError::InvalidFile(e.to_string()))
}

fn apply_file(config: &mut ServiceConfig, file: &FileConfig) -> Result<(), ConfigError> {
    if let Some(format) = &file.feed.format {
        config.feed_format = FeedFormat::parse(format)
            .ok_or_else(|| ConfigError::InvalidFeedFormat(format.clone()))?;
    }
    if let Some(url) = &file.feed.base_url {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(dir) = &file.storage.data_dir {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(minutes) = file.sync.interval_minutes {
        config.sync_interval_minutes = minutes;
    }
    if let Some(delay) = file.sync.region_delay_ms {
        config.region_delay_ms = delay;
    }
    if let Some(secs) = file.http.metadata_timeout_secs {
        config.metadata_timeout_secs = secs;
    }
    if let Some(secs) = file.http.payload_timeout_secs {
        config.payload_timeout_secs = secs;
    }
    if let Some(minutes) = file.cache.ttl_minutes {
        config.cache_ttl_minutes = minutes;
    }
    if let Some(path) = &file.log.file {
        config.log_file = Some(path.clone());
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Environment layer
// ----------------------------------------------------------------------------

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Keys that were never replaced after copying an example `.env`.
fn is_placeholder_key(key: &str) -> bool {
    let trimmed = key.trim();
    trimmed.eq_ignore_ascii_case("changeme") || trimmed.to_uppercase().contains("API_KEY")
}

fn validate_api_key(key: &str) -> Result<(), ConfigError> {
    if key.trim().is_empty() {
        return Err(ConfigError::MissingApiKey);
    }
    if is_placeholder_key(key) {
        return Err(ConfigError::PlaceholderApiKey);
    }
    Ok(())
}

/// Loads the service configuration from all layers and validates it.
pub fn load() -> Result<ServiceConfig, ConfigError> {
    dotenv::dotenv().ok();

    let mut config = ServiceConfig::with_defaults(String::new(), PathBuf::from("alertas"));

    if let Ok(text) = fs::read_to_string(CONFIG_FILE) {
        let file = parse_file(&text)?;
        apply_file(&mut config, &file)?;
    }

    if let Some(key) = env_nonempty("AEMET_API_KEY") {
        config.api_key = key;
    }
    if let Some(url) = env_nonempty("AEMET_BASE_URL") {
        config.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(dir) = env_nonempty("ALERTAS_DIR") {
        config.data_dir = PathBuf::from(dir);
    }
    if let Some(format) = env_nonempty("AVISOS_FEED_FORMAT") {
        config.feed_format =
            FeedFormat::parse(&format).ok_or(ConfigError::InvalidFeedFormat(format))?;
    }
    if let Some(path) = env_nonempty("AVISOS_LOG_FILE") {
        config.log_file = Some(path);
    }

    validate_api_key(&config.api_key)?;
    Ok(config)
}
