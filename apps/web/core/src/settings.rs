//! User settings loading from the web app's settings JSON file.
//!
//! The settings store writes flat JSON with dot-notation keys (like "sync.burstCount").
//! Missing or malformed values fall back to `None`, letting `SyncConfig` pick its defaults.

use std::fs;
use std::path::Path;

/// Sync-related user settings. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub burst_count: Option<u32>,
    pub burst_interval_ms: Option<u64>,
    pub retry_base_ms: Option<u64>,
    pub retry_max_attempts: Option<u32>,
    pub quota_bytes: Option<u64>,
}

/// Loads settings from `path`. Returns defaults if the file doesn't exist or can't be parsed.
pub fn load_settings(path: &Path) -> Settings {
    match fs::read_to_string(path) {
        Ok(contents) => match parse_settings(&contents) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring malformed settings file {}: {}", path.display(), e);
                Settings::default()
            }
        },
        Err(e) => {
            log::debug!("No settings file at {}: {}", path.display(), e);
            Settings::default()
        }
    }
}

/// Parses flat settings JSON. Values of the wrong type are ignored individually.
fn parse_settings(contents: &str) -> Result<Settings, serde_json::Error> {
    let json: serde_json::Value = serde_json::from_str(contents)?;

    let as_u64 = |key: &str| json.get(key).and_then(|v| v.as_u64());
    let as_u32 = |key: &str| as_u64(key).and_then(|v| u32::try_from(v).ok());

    Ok(Settings {
        burst_count: as_u32("sync.burstCount"),
        burst_interval_ms: as_u64("sync.burstIntervalMs"),
        retry_base_ms: as_u64("sync.retryBaseMs"),
        retry_max_attempts: as_u32("sync.retryMaxAttempts"),
        quota_bytes: as_u64("storage.quotaBytes"),
    })
}
