use std::time::Duration;

use crate::viewport::LatLng;

const DEFAULT_BASE_URL: &str = "https://api.um.warszawa.pl";
const DEFAULT_RESOURCE_ID: &str = "f2e5503e-927d-4ad3-9500-4ab9e55deb59";
const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Connection settings for the transit API
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub resource_id: String,
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            resource_id: DEFAULT_RESOURCE_ID.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

/// Timing and map constants used by the refresh policy
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Quiet period after the camera settles before the viewport is applied
    pub debounce: Duration,
    /// Periodic refresh while zoomed in
    pub refresh_high_zoom: Duration,
    /// Re-arm period while zoomed out (no poll)
    pub refresh_low_zoom: Duration,
    /// Minimum time between viewport-triggered polls
    pub min_poll_interval: Duration,
    /// Markers are only shown at or above this zoom
    pub zoom_threshold: f32,
    /// Camera target when the user location is unavailable
    pub default_center: LatLng,
    pub default_zoom: f32,
    /// Padding in pixels when fitting the camera to a line
    pub line_fit_padding: u32,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(1000),
            refresh_high_zoom: Duration::from_millis(5000),
            refresh_low_zoom: Duration::from_millis(15000),
            min_poll_interval: Duration::from_millis(5000),
            zoom_threshold: 14.0,
            default_center: LatLng::new(52.2881717, 21.0061544),
            default_zoom: 15.0,
            line_fit_padding: 100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub refresh: RefreshConfig,
}

impl Config {
    /// Load configuration from the process environment, reading `.env` first if present
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = lookup("TRACKMYBUS_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::Missing("TRACKMYBUS_API_KEY"))?;

        let mut api = ApiConfig::new(api_key.trim());

        if let Some(url) = lookup("TRACKMYBUS_BASE_URL") {
            api.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(id) = lookup("TRACKMYBUS_RESOURCE_ID") {
            api.resource_id = id;
        }
        if let Some(raw) = lookup("TRACKMYBUS_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .ok()
                .filter(|s| *s > 0)
                .ok_or(ConfigError::Invalid {
                    name: "TRACKMYBUS_TIMEOUT_SECS",
                    value: raw.clone(),
                })?;
            api.timeout = Duration::from_secs(secs);
        }

        Ok(Self {
            api,
            refresh: RefreshConfig::default(),
        })
    }
}
