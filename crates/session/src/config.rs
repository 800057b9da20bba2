//! Session-layer configuration.

use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_LOGIN_PATH: &str = "/login";
pub const DEFAULT_LANDING_PATH: &str = "/dashboard";
pub const DEFAULT_STORAGE_KEY: &str = "token";
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;

/// Redirect targets supplied by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePaths {
    /// Login entry point (unauthenticated users go here).
    pub login: String,
    /// Default authenticated landing view (unauthorized users go here).
    pub landing: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Backend base URL; the login endpoint and guarded calls are relative to it.
    pub api_base_url: String,
    pub login_path: String,
    pub landing_path: String,
    /// Name of the durable slot holding the raw credential.
    pub storage_key: String,
    /// Expiry monitor period in seconds.
    pub check_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            landing_path: DEFAULT_LANDING_PATH.to_string(),
            storage_key: DEFAULT_STORAGE_KEY.to_string(),
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
        }
    }
}

impl SessionConfig {
    /// Load configuration from `CYBERTRAIN_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup, falling back to
    /// defaults for missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CYBERTRAIN_API_URL") {
            config.api_base_url = url;
        }
        if let Some(path) = lookup("CYBERTRAIN_LOGIN_PATH") {
            config.login_path = path;
        }
        if let Some(path) = lookup("CYBERTRAIN_LANDING_PATH") {
            config.landing_path = path;
        }
        if let Some(key) = lookup("CYBERTRAIN_STORAGE_KEY") {
            config.storage_key = key;
        }
        if let Some(raw) = lookup("CYBERTRAIN_CHECK_INTERVAL_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.check_interval_secs = secs,
                _ => tracing::warn!(
                    value = %raw,
                    default = DEFAULT_CHECK_INTERVAL_SECS,
                    "ignoring invalid CYBERTRAIN_CHECK_INTERVAL_SECS"
                ),
            }
        }

        config
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs.max(1))
    }

    pub fn route_paths(&self) -> RoutePaths {
        RoutePaths {
            login: self.login_path.clone(),
            landing: self.landing_path.clone(),
        }
    }

    /// Absolute URL for a backend path.
    pub fn api_url(&self, path: &str) -> String {
        join_url(&self.api_base_url, path)
    }
}

/// Join a base URL and a path with exactly one `/` between them.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
