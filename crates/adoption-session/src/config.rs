use std::time::Duration;

/// How often the proactive refresh task looks at the access token
pub const DEFAULT_REFRESH_CHECK_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Refresh when the access token expires within this window
pub const DEFAULT_REFRESH_THRESHOLD: Duration = Duration::from_secs(5 * 60);

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub refresh_check_interval: Duration,
    pub refresh_threshold: Duration,
    /// Start the proactive refresh task whenever a session begins
    pub background_refresh: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_check_interval: DEFAULT_REFRESH_CHECK_INTERVAL,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
            background_refresh: true,
        }
    }
}
