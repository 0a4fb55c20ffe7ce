//! Client configuration.
//!
//! # Design
//! Defaults are resolved once, when a `Config` is constructed. Setters are
//! plain assignments without validation, so a caller can still blank out
//! `base_url` or zero `api_version`; the `effective_*` accessors fall back
//! to the defaults in that case without writing anything back.

use std::time::Duration;

use serde::Deserialize;

use crate::error::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.siftscience.com";
pub const DEFAULT_API_VERSION: u32 = 203;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Name and version advertised in the `User-Agent` header.
pub const CLIENT_NAME: &str = "sift-rust";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const ENV_API_KEY: &str = "SIFT_API_KEY";
pub const ENV_API_URL: &str = "SIFT_API_URL";
pub const ENV_API_VERSION: &str = "SIFT_API_VERSION";
pub const ENV_TIMEOUT: &str = "SIFT_TIMEOUT";

/// Connection settings shared by every request a `Client` makes.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    base_url: String,
    api_version: u32,
    api_key: String,
    timeout: Duration,
}

/// The JSON configuration blob. Only `api_key` is required; `timeout` is
/// in seconds.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    base_url: Option<String>,
    api_version: Option<u32>,
    api_key: String,
    timeout: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigBlob {
    Wrapped { config: ConfigFile },
    Flat(ConfigFile),
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION,
            api_key: api_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Parse a configuration blob, either flat or wrapped in `{"config": ...}`.
    ///
    /// ```
    /// let config = sift_core::Config::from_json(br#"{"api_key": "A", "api_version": 205}"#).unwrap();
    /// assert_eq!(config.api_version(), 205);
    /// assert_eq!(config.base_url(), sift_core::config::DEFAULT_BASE_URL);
    /// ```
    pub fn from_json(bytes: &[u8]) -> Result<Self, Error> {
        let blob: ConfigBlob =
            serde_json::from_slice(bytes).map_err(|e| Error::Config(e.to_string()))?;
        let file = match blob {
            ConfigBlob::Wrapped { config } => config,
            ConfigBlob::Flat(file) => file,
        };

        let mut config = Config::new(file.api_key);
        if let Some(url) = file.base_url.filter(|u| !u.is_empty()) {
            config.base_url = url;
        }
        if let Some(version) = file.api_version.filter(|v| *v != 0) {
            config.api_version = version;
        }
        if let Some(secs) = file.timeout {
            let timeout = parse_timeout(secs)?;
            if !timeout.is_zero() {
                config.timeout = timeout;
            }
        }
        Ok(config)
    }

    /// Read `SIFT_API_KEY` (required), `SIFT_API_URL`, `SIFT_API_VERSION`
    /// and `SIFT_TIMEOUT` (seconds) from the process environment.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let api_key = lookup(ENV_API_KEY)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config(format!("{ENV_API_KEY} is not set")))?;

        let mut config = Config::new(api_key);
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.is_empty()) {
            config.base_url = url;
        }
        if let Some(raw) = lookup(ENV_API_VERSION) {
            config.api_version = raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_API_VERSION} must be an integer, got {raw:?}")))?;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            let secs: f64 = raw
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_TIMEOUT} must be a number of seconds, got {raw:?}")))?;
            config.timeout = parse_timeout(secs)?;
        }
        Ok(config)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_base_url(&mut self, url: impl Into<String>) {
        self.base_url = url.into();
    }

    pub fn set_api_key(&mut self, key: impl Into<String>) {
        self.api_key = key.into();
    }

    pub fn set_api_version(&mut self, version: u32) {
        self.api_version = version;
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// `base_url` without a trailing slash, or the default when blank.
    pub fn effective_base_url(&self) -> &str {
        match self.base_url.trim_end_matches('/') {
            "" => DEFAULT_BASE_URL,
            url => url,
        }
    }

    /// `api_version`, or the default when zero.
    pub fn effective_api_version(&self) -> u32 {
        match self.api_version {
            0 => DEFAULT_API_VERSION,
            version => version,
        }
    }

    pub fn user_agent(&self) -> String {
        format!(
            "SiftScience/{} {CLIENT_NAME}/{CLIENT_VERSION}",
            self.effective_api_version()
        )
    }
}

fn parse_timeout(secs: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| Error::Config(format!("invalid timeout {secs}: {e}")))
}
