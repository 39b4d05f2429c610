use std::env;
use std::time::Duration;

use dotenvy::dotenv;

/// Scheduler configuration loaded from environment variables.
///
/// Every field has a usable default; malformed values fall back rather
/// than fail, so a half-configured environment still starts.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// When false, `start` is a no-op.
    pub enabled: bool,
    /// How often the watcher scans the stock index.
    pub watcher_interval: Duration,
    /// Sleep before the first scan, letting surrounding infrastructure
    /// come up.
    pub watcher_startup_delay: Duration,
    /// Worker-pool size. Values <= 0 mean the default of 5.
    pub max_concurrent: i32,
    /// `max_attempts` stamped onto newly enqueued jobs.
    pub max_retries: i32,
    /// Terminal jobs older than this are purged after each scan.
    pub purge_after: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watcher_interval: Duration::from_secs(60),
            watcher_startup_delay: Duration::ZERO,
            max_concurrent: 5,
            max_retries: 3,
            purge_after: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = Self::default();
        Self {
            enabled: env_bool("SCHEDULER_ENABLED", defaults.enabled),
            watcher_interval: match env_u64("SCHEDULER_WATCHER_INTERVAL_SECS") {
                Some(secs) if secs > 0 => Duration::from_secs(secs),
                _ => defaults.watcher_interval,
            },
            watcher_startup_delay: env_u64("SCHEDULER_STARTUP_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.watcher_startup_delay),
            max_concurrent: env_i32("SCHEDULER_MAX_CONCURRENT", defaults.max_concurrent),
            max_retries: env_i32("SCHEDULER_MAX_RETRIES", defaults.max_retries),
            purge_after: match env_u64("SCHEDULER_PURGE_AFTER_HOURS") {
                Some(hours) if hours > 0 => Duration::from_secs(hours * 60 * 60),
                _ => defaults.purge_after,
            },
        }
    }

    /// Worker-pool size with the fallback applied: never below 1, and the
    /// default of 5 when unset or non-positive.
    pub fn worker_count(&self) -> usize {
        if self.max_concurrent <= 0 {
            5
        } else {
            self.max_concurrent as usize
        }
    }
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_i32(key: &str, default: i32) -> i32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.watcher_interval, Duration::from_secs(60));
        assert_eq!(config.watcher_startup_delay, Duration::ZERO);
        assert_eq!(config.max_concurrent, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.purge_after, Duration::from_secs(86_400));
    }

    #[test]
    fn worker_count_falls_back_on_non_positive() {
        let mut config = SchedulerConfig::default();
        config.max_concurrent = 0;
        assert_eq!(config.worker_count(), 5);
        config.max_concurrent = -3;
        assert_eq!(config.worker_count(), 5);
        config.max_concurrent = 2;
        assert_eq!(config.worker_count(), 2);
    }
}
