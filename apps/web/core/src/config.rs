//! Sync configuration.

use std::env;
use std::time::Duration;

use crate::settings::Settings;

const DEFAULT_BURST_COUNT: u32 = 10;
const DEFAULT_BURST_INTERVAL_MS: u64 = 1_000;
const DEFAULT_RETRY_BASE_MS: u64 = 2_000;
const DEFAULT_RETRY_FACTOR: u32 = 2;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_QUOTA_BYTES: u64 = 1_000_000_000;

/// Configuration for the listing synchronizer.
/// Priority: environment variables > user settings > defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Fetches in the post-sign-in burst, including the immediate one
    pub burst_count: u32,
    /// Gap between burst fetches
    pub burst_interval: Duration,
    /// Delay before the first automatic retry
    pub retry_base: Duration,
    /// Multiplier applied to the delay for each further consecutive failure
    pub retry_factor: u32,
    /// Consecutive transient failures that still get an automatic retry
    pub retry_max_attempts: u32,
    /// Storage quota used for the usage percentage
    pub quota_bytes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            burst_count: DEFAULT_BURST_COUNT,
            burst_interval: Duration::from_millis(DEFAULT_BURST_INTERVAL_MS),
            retry_base: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            retry_factor: DEFAULT_RETRY_FACTOR,
            retry_max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            quota_bytes: DEFAULT_QUOTA_BYTES,
        }
    }
}

impl SyncConfig {
    /// Load configuration from environment variables only (fallback).
    /// Use `from_settings_and_env` when settings are available.
    pub fn from_env() -> Self {
        Self::from_settings_and_env(&Settings::default())
    }

    /// Load configuration with priority: env vars > user settings > defaults.
    /// Env vars override settings (useful for development and tests against slow backends).
    pub fn from_settings_and_env(settings: &Settings) -> Self {
        let burst_count = env_parse("CLOUDFILES_BURST_COUNT")
            .or(settings.burst_count)
            .unwrap_or(DEFAULT_BURST_COUNT);

        let burst_interval_ms = env_parse("CLOUDFILES_BURST_INTERVAL_MS")
            .or(settings.burst_interval_ms)
            .unwrap_or(DEFAULT_BURST_INTERVAL_MS);

        let retry_base_ms = env_parse("CLOUDFILES_RETRY_BASE_MS")
            .or(settings.retry_base_ms)
            .unwrap_or(DEFAULT_RETRY_BASE_MS);

        let retry_max_attempts = env_parse("CLOUDFILES_RETRY_MAX_ATTEMPTS")
            .or(settings.retry_max_attempts)
            .unwrap_or(DEFAULT_RETRY_MAX_ATTEMPTS);

        let quota_bytes = env_parse("CLOUDFILES_QUOTA_BYTES")
            .or(settings.quota_bytes)
            .unwrap_or(DEFAULT_QUOTA_BYTES);

        Self {
            burst_count,
            burst_interval: Duration::from_millis(burst_interval_ms),
            retry_base: Duration::from_millis(retry_base_ms),
            retry_factor: DEFAULT_RETRY_FACTOR,
            retry_max_attempts,
            quota_bytes,
        }
    }

    /// Delay before the retry that follows the `failures`-th consecutive transient failure,
    /// or `None` once the retry cap is exceeded.
    ///
    /// With the defaults: 1 → 2s, 2 → 4s, 3 → 8s, 4 → None.
    pub fn retry_delay(&self, failures: u32) -> Option<Duration> {
        if failures == 0 || failures > self.retry_max_attempts {
            return None;
        }
        let multiplier = self.retry_factor.saturating_pow(failures - 1);
        Some(self.retry_base.saturating_mul(multiplier))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}
