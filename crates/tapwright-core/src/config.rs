//! Harness configuration.
//!
//! A JSON document with the automation server URL and the opaque capability
//! map sent when a session is created, plus optional timeouts, the app to
//! terminate at teardown and selector overrides for the flows.
//!
//! # Example
//!
//! ```
//! use tapwright_core::config::HarnessConfig;
//!
//! let config = HarnessConfig::from_json_str(r#"{
//!     "caps": { "platformName": "Android", "appium:automationName": "UiAutomator2" },
//!     "app_id": "com.example.app"
//! }"#).unwrap();
//!
//! assert_eq!(config.server_url, "http://localhost:4723/wd/hub");
//! assert_eq!(config.timeouts.locate_ms, 8000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::flows::{AuthSelectors, ChatSelectors};
use crate::poller::Poller;

/// Server URL used when the config names none.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:4723/wd/hub";

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// `server_url` is not an absolute http(s) URL.
    #[error("Invalid server URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid timeouts: {0}")]
    InvalidTimeouts(String),
}

/// Wait budgets, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Budget for wait-mode element resolution.
    pub locate_ms: u64,
    /// Interval between polls.
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            locate_ms: 8000,
            poll_interval_ms: 500,
        }
    }
}

impl Timeouts {
    pub fn locate(&self) -> Duration {
        Duration::from_millis(self.locate_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// A [`Poller`] on the tokio clock with these budgets.
    pub fn poller(&self) -> Poller {
        Poller::new(self.locate(), self.poll_interval())
    }
}

/// What the session provider needs to open a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Server base URL, always ending in `/`.
    pub server_url: Url,
    pub caps: Map<String, Value>,
}

/// Complete harness configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Capabilities passed through to the server unchanged.
    #[serde(default)]
    pub caps: Map<String, Value>,
    /// Application terminated at teardown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub auth: AuthSelectors,
    #[serde(default)]
    pub chat: ChatSelectors,
}

fn default_server_url() -> String {
    DEFAULT_SERVER_URL.to_string()
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            caps: Map::new(),
            app_id: None,
            timeouts: Timeouts::default(),
            auth: AuthSelectors::default(),
            chat: ChatSelectors::default(),
        }
    }
}

impl HarnessConfig {
    /// Reads and validates a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Parses and validates a JSON config document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.server_endpoint()?;
        if config.timeouts.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidTimeouts(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    /// The server URL, parsed, with a trailing `/` so relative endpoints join
    /// under it rather than replacing its last segment.
    pub fn server_endpoint(&self) -> Result<Url, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidUrl {
            url: self.server_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.server_url).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        Ok(url)
    }

    /// The app terminated at teardown: `app_id`, else the Android package or
    /// iOS bundle id named in `caps`.
    pub fn teardown_app_id(&self) -> Option<String> {
        if let Some(app_id) = &self.app_id {
            return Some(app_id.clone());
        }
        ["appium:appPackage", "appPackage", "appium:bundleId", "bundleId"]
            .iter()
            .find_map(|key| self.caps.get(*key).and_then(Value::as_str))
            .map(str::to_string)
    }

    pub fn session(&self) -> Result<SessionConfig, ConfigError> {
        Ok(SessionConfig {
            server_url: self.server_endpoint()?,
            caps: self.caps.clone(),
        })
    }
}
