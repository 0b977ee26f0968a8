//! Runtime configuration.
//!
//! [`FleetConfig`] is an immutable value built once at startup (from the
//! environment, after `.env` is loaded) and passed to whatever needs it.

use std::path::PathBuf;
use std::time::Duration;

use crate::costs::DEFAULT_BATCH_SIZE;
use crate::settings::SettingsBackend;

const DEFAULT_SETTINGS_PATH: &str = "fleet_settings.json";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_WINDOW_DAYS: i64 = 30;
const MAX_WINDOW_DAYS: i64 = 3660;

#[derive(Debug, Clone, PartialEq)]
pub struct FleetConfig {
    /// Where vehicle rows come from: an `http(s)://` URL or a JSON file.
    pub rows_location: Option<String>,
    /// Where material cost lines come from: an `http(s)://` URL or a JSON file.
    pub costs_location: Option<String>,
    /// Bearer token sent to remote sources.
    pub api_key: Option<String>,
    pub batch_size: usize,
    pub http_timeout: Duration,
    /// Replace the row-level material total with order-matched costs.
    pub reconcile_materials: bool,
    /// Window used when a selection leaves a date bound open, in days
    /// (at most ten years).
    pub default_window_days: i64,
    pub settings_backend: SettingsBackend,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            rows_location: None,
            costs_location: None,
            api_key: None,
            batch_size: DEFAULT_BATCH_SIZE,
            http_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            reconcile_materials: false,
            default_window_days: DEFAULT_WINDOW_DAYS,
            settings_backend: SettingsBackend::File(PathBuf::from(DEFAULT_SETTINGS_PATH)),
        }
    }
}

impl FleetConfig {
    /// Reads `FLEET_*` variables from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup. Empty values count as
    /// unset; unparseable numbers fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let settings_backend = match get("FLEET_SETTINGS_BACKEND").as_deref() {
            Some("memory") => SettingsBackend::Memory,
            _ => get("FLEET_SETTINGS_PATH")
                .map(|p| SettingsBackend::File(PathBuf::from(p)))
                .unwrap_or(defaults.settings_backend),
        };

        Self {
            rows_location: get("FLEET_ROWS_URL"),
            costs_location: get("FLEET_COSTS_URL"),
            api_key: get("FLEET_API_KEY"),
            batch_size: get("FLEET_BATCH_SIZE")
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.batch_size),
            http_timeout: get("FLEET_HTTP_TIMEOUT_SECS")
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            reconcile_materials: get("FLEET_RECONCILE")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
                .unwrap_or(defaults.reconcile_materials),
            default_window_days: get("FLEET_WINDOW_DAYS")
                .and_then(|v| v.parse::<i64>().ok())
                .filter(|n| (1..=MAX_WINDOW_DAYS).contains(n))
                .unwrap_or(defaults.default_window_days),
            settings_backend,
        }
    }
}
