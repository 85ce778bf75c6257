use std::time::Duration;

/// Timing and retry settings for one session lifecycle.
///
/// Defaults match the values the portal deployment was tuned against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Timeout applied to every portal request except logout.
    pub request_timeout: Duration,
    pub logout_timeout: Duration,
    /// Fixed delay between login attempts after a transient failure.
    pub retry_delay: Duration,
    /// Keep-alive interval in normal mode.
    pub keep_alive_interval: Duration,
    /// Keep-alive interval in fast mode.
    pub fast_keep_alive_interval: Duration,
    /// Shortest wait between two keep-alive ticks, even when a tick overran.
    pub min_tick_wait: Duration,
    pub max_transient_attempts: u32,
    pub max_credential_attempts: u32,
}

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(60);
pub const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(600);
pub const DEFAULT_FAST_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            logout_timeout: DEFAULT_LOGOUT_TIMEOUT,
            retry_delay: DEFAULT_RETRY_DELAY,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            fast_keep_alive_interval: DEFAULT_FAST_KEEP_ALIVE_INTERVAL,
            min_tick_wait: Duration::from_millis(500),
            max_transient_attempts: DEFAULT_MAX_ATTEMPTS,
            max_credential_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}
