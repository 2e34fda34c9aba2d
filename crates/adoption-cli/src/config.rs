use std::env;
use std::path::PathBuf;
use std::time::Duration;

use adoption_session::{
    FileTokenStorage, SessionConfig, DEFAULT_POLL_INTERVAL, DEFAULT_REFRESH_CHECK_INTERVAL,
    DEFAULT_REFRESH_THRESHOLD,
};

pub const DEFAULT_API_URL: &str = "http://localhost:3000/api";

const DEFAULT_CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Client configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    /// `None` when no platform data directory exists; the session then lives
    /// in memory only
    pub token_file: Option<PathBuf>,
    pub cache_sweep_interval: Duration,
    pub refresh_interval: Duration,
    pub refresh_threshold: Duration,
    pub poll_interval: Duration,
    pub http_timeout: Duration,
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        // Unset, unparsable and zero values fall back to the default
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        let api_url = lookup("ADOPTION_API_URL")
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let token_file = lookup("ADOPTION_TOKEN_FILE")
            .filter(|path| !path.is_empty())
            .map(PathBuf::from)
            .or_else(FileTokenStorage::default_path);

        Self {
            api_url,
            token_file,
            cache_sweep_interval: secs("ADOPTION_CACHE_SWEEP_SECS", DEFAULT_CACHE_SWEEP_INTERVAL),
            refresh_interval: secs("ADOPTION_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_CHECK_INTERVAL),
            refresh_threshold: secs("ADOPTION_REFRESH_THRESHOLD_SECS", DEFAULT_REFRESH_THRESHOLD),
            poll_interval: secs("ADOPTION_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL),
            http_timeout: secs("ADOPTION_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            refresh_check_interval: self.refresh_interval,
            refresh_threshold: self.refresh_threshold,
            background_refresh: true,
        }
    }
}
