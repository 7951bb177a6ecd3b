/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Dashboard configuration: a TOML file, then `CFTOP_*` environment
//! overrides, then validation.

use std::env;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::warn;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::diagnostics::{DEFAULT_LOG_CAPACITY, DiagnosticLog};
use crate::metadata::fetch::{
    ApiTransport, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_PAGES, FetchError, HttpTransport, PagedFetcher,
    RetryPolicy,
};

const ENV_API_ENDPOINT: &str = "CFTOP_API_ENDPOINT";
const ENV_ACCESS_TOKEN: &str = "CFTOP_ACCESS_TOKEN";
const ENV_REFRESH_INTERVAL_SECS: &str = "CFTOP_REFRESH_INTERVAL_SECS";
const ENV_DEBUG: &str = "CFTOP_DEBUG";
const ENV_AUTO_OPEN_ON_ERROR: &str = "CFTOP_AUTO_OPEN_ON_ERROR";

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {e}"),
            ConfigError::Parse(e) => write!(f, "Parse error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub max_attempts: usize,
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_pages: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            min_delay_ms: 250,
            max_delay_ms: 5_000,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            min_delay: Duration::from_millis(self.min_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub capacity: usize,
    pub debug_enabled: bool,
    pub auto_open_on_error: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LOG_CAPACITY,
            debug_enabled: false,
            auto_open_on_error: false,
        }
    }
}

impl LogConfig {
    pub fn build_log(&self) -> DiagnosticLog {
        let log = DiagnosticLog::with_capacity(self.capacity);
        log.set_debug_enabled(self.debug_enabled);
        log.set_auto_open_on_error(self.auto_open_on_error);
        log
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub api_endpoint: String,
    pub access_token: Option<String>,
    pub request_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub fetch: FetchConfig,
    pub log: LogConfig,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            api_endpoint: String::new(),
            access_token: None,
            request_timeout_secs: 30,
            refresh_interval_secs: 60,
            fetch: FetchConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl DashboardConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Applies overrides from `lookup`. Unparseable values are logged and
    /// ignored so a typo never takes the dashboard down.
    pub fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup(ENV_API_ENDPOINT).filter(|value| !value.trim().is_empty()) {
            self.api_endpoint = endpoint.trim().to_string();
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN) {
            self.access_token = Some(token.trim().to_string()).filter(|token| !token.is_empty());
        }
        if let Some(value) = lookup(ENV_REFRESH_INTERVAL_SECS) {
            match value.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.refresh_interval_secs = secs,
                _ => warn!(
                    "{ENV_REFRESH_INTERVAL_SECS} invalid ('{value}'); keeping {}s",
                    self.refresh_interval_secs
                ),
            }
        }
        if let Some(enabled) = lookup(ENV_DEBUG).and_then(|value| parse_flag(ENV_DEBUG, &value)) {
            self.log.debug_enabled = enabled;
        }
        if let Some(enabled) = lookup(ENV_AUTO_OPEN_ON_ERROR)
            .and_then(|value| parse_flag(ENV_AUTO_OPEN_ON_ERROR, &value))
        {
            self.log.auto_open_on_error = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("api_endpoint is empty".into()));
        }
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid("refresh_interval_secs must be > 0".into()));
        }
        if self.fetch.max_attempts == 0 {
            return Err(ConfigError::Invalid("fetch.max_attempts must be > 0".into()));
        }
        if self.fetch.max_pages == 0 {
            return Err(ConfigError::Invalid("fetch.max_pages must be > 0".into()));
        }
        if self.log.capacity == 0 {
            return Err(ConfigError::Invalid("log.capacity must be > 0".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Fetcher over a blocking HTTP transport. Build it outside any async
    /// context; the blocking client owns its own runtime.
    pub fn build_fetcher(&self, cancel: CancellationToken) -> Result<PagedFetcher, FetchError> {
        let transport: Arc<dyn ApiTransport> = Arc::new(HttpTransport::new(
            &self.api_endpoint,
            self.access_token.clone(),
            self.request_timeout(),
        )?);
        Ok(PagedFetcher::new(transport)
            .with_retry(self.fetch.retry_policy())
            .with_max_pages(self.fetch.max_pages)
            .with_cancellation(cancel))
    }
}

fn parse_flag(key: &str, value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            warn!("{key} invalid ('{other}'); ignoring");
            None
        }
    }
}
