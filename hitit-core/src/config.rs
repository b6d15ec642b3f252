use std::time::Duration;

use chrono::Duration as ChronoDuration;

/// Tunables of the collaboration system
#[derive(Debug, Clone)]
pub struct Config {
    /// How long an invite can be accepted after it was sent
    pub invite_lifetime_in_days: i64,
    /// How long a login session is valid
    pub session_lifetime_in_days: i64,
    /// How long activity entries are kept before they are pruned
    pub activity_retention_in_days: i64,
    /// Page size used when a listing doesn't ask for one
    pub default_page_size: usize,
    /// The largest page a listing may return
    pub max_page_size: usize,
    /// How often live connections are pinged
    pub heartbeat_interval_in_seconds: u64,
}

impl Config {
    pub fn invite_lifetime(&self) -> ChronoDuration {
        ChronoDuration::days(self.invite_lifetime_in_days)
    }

    pub fn session_lifetime(&self) -> ChronoDuration {
        ChronoDuration::days(self.session_lifetime_in_days)
    }

    pub fn activity_retention(&self) -> ChronoDuration {
        ChronoDuration::days(self.activity_retention_in_days)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_in_seconds)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            invite_lifetime_in_days: 7,
            session_lifetime_in_days: 7,
            activity_retention_in_days: 90,
            default_page_size: 50,
            max_page_size: 100,
            heartbeat_interval_in_seconds: 30,
        }
    }
}
