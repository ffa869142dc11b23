//! Engine configuration loaded from environment variables.
//!
//! Every knob has a hardcoded default matching the baseline policy, so the
//! engine runs with zero configuration. `.env` files are honored via dotenvy.

use log::warn;
use std::env;
use std::time::Duration;

/// Default polling cadence for the processor loop
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default rolling retention for delivery logs
pub const DEFAULT_LOG_RETENTION_DAYS: i64 = 30;

/// Default per-channel send timeout
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

/// Default claim lease; an expired claim makes a reminder selectable again
pub const DEFAULT_CLAIM_LEASE_SECS: i64 = 120;

/// Default analytics window when the caller gives no date range
pub const DEFAULT_ANALYTICS_WINDOW_DAYS: i64 = 30;

/// Tuning knobs for the reminder engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seconds between processor ticks
    pub poll_interval_secs: u64,
    /// Days of delivery log history kept on each append
    pub log_retention_days: i64,
    /// Seconds a single channel send may take before it is failed
    pub send_timeout_secs: u64,
    /// Seconds a claimed reminder stays invisible to other workers
    pub claim_lease_secs: i64,
    /// Days of trailing history for analytics when no range is given
    pub analytics_window_days: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
            claim_lease_secs: DEFAULT_CLAIM_LEASE_SECS,
            analytics_window_days: DEFAULT_ANALYTICS_WINDOW_DAYS,
        }
    }
}

impl EngineConfig {
    /// Load configuration from the environment, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `CAREBELL_POLL_INTERVAL_SECS`
    /// - `CAREBELL_LOG_RETENTION_DAYS`
    /// - `CAREBELL_SEND_TIMEOUT_SECS`
    /// - `CAREBELL_CLAIM_LEASE_SECS`
    /// - `CAREBELL_ANALYTICS_WINDOW_DAYS`
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = EngineConfig::default();
        EngineConfig {
            poll_interval_secs: env_num(
                "CAREBELL_POLL_INTERVAL_SECS",
                defaults.poll_interval_secs,
            ),
            log_retention_days: env_num(
                "CAREBELL_LOG_RETENTION_DAYS",
                defaults.log_retention_days,
            ),
            send_timeout_secs: env_num("CAREBELL_SEND_TIMEOUT_SECS", defaults.send_timeout_secs),
            claim_lease_secs: env_num("CAREBELL_CLAIM_LEASE_SECS", defaults.claim_lease_secs),
            analytics_window_days: env_num(
                "CAREBELL_ANALYTICS_WINDOW_DAYS",
                defaults.analytics_window_days,
            ),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn log_retention(&self) -> chrono::Duration {
        chrono::Duration::days(self.log_retention_days)
    }

    pub fn claim_lease(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.claim_lease_secs)
    }
}

/// Parse a numeric env var, warning (not failing) on garbage values
fn env_num<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Ignoring invalid value for {key}: {raw:?}");
                default
            }
        },
        Err(_) => default,
    }
}
