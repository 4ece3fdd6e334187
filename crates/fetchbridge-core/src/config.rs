//! Configuration for fetchbridge.
//!
//! All configuration is driven by environment variables. The operating
//! [`Mode`] defaults to the ambient environment setting (`FETCHBRIDGE_MODE`,
//! then `APP_ENV`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::error::BridgeError;

/// Operating mode passed through to the application handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Verbose errors, no caching assumptions.
    Development,
    /// Default mode.
    #[default]
    Production,
    /// Test runs.
    Test,
}

impl Mode {
    /// Resolve the mode from the environment, falling back to production.
    #[must_use]
    pub fn from_env() -> Self {
        std::env::var("FETCHBRIDGE_MODE")
            .or_else(|_| std::env::var("APP_ENV"))
            .ok()
            .and_then(|raw| match raw.parse() {
                Ok(mode) => Some(mode),
                Err(err) => {
                    tracing::warn!(error = %err, "ignoring unknown mode, using production");
                    None
                }
            })
            .unwrap_or_default()
    }

    /// The mode as a lowercase string.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    /// Whether this is development mode.
    #[must_use]
    pub fn is_development(self) -> bool {
        self == Self::Development
    }
}

impl FromStr for Mode {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(BridgeError::Config(format!("unknown mode: {other}"))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-level configuration.
///
/// # Examples
///
/// ```
/// use fetchbridge_core::{BridgeConfig, Mode};
///
/// let config = BridgeConfig::builder().mode(Mode::Test).build();
/// assert_eq!(config.listen, "0.0.0.0:3000");
/// assert!(!config.trust_proxy);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Bind address (e.g. `"0.0.0.0:3000"`).
    #[builder(default = String::from("0.0.0.0:3000"))]
    pub listen: String,

    /// Operating mode handed to the application handler.
    #[builder(default)]
    pub mode: Mode,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Whether `x-forwarded-proto` / `x-forwarded-host` are trusted.
    #[builder(default = false)]
    pub trust_proxy: bool,

    /// Scheme reported for inbound requests when no trusted proxy header says
    /// otherwise.
    #[builder(default = String::from("http"))]
    pub scheme: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen: String::from("0.0.0.0:3000"),
            mode: Mode::default(),
            log_level: String::from("info"),
            trust_proxy: false,
            scheme: String::from("http"),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `FETCHBRIDGE_LISTEN` | `0.0.0.0:3000` |
    /// | `FETCHBRIDGE_MODE` / `APP_ENV` | `production` |
    /// | `LOG_LEVEL` | `info` |
    /// | `FETCHBRIDGE_TRUST_PROXY` | `false` |
    /// | `FETCHBRIDGE_SCHEME` | `http` |
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self {
            mode: Mode::from_env(),
            ..Self::default()
        };

        if let Ok(v) = std::env::var("FETCHBRIDGE_LISTEN") {
            config.listen = v;
        }
        if let Ok(v) = std::env::var("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Ok(v) = std::env::var("FETCHBRIDGE_TRUST_PROXY") {
            config.trust_proxy = parse_bool(&v);
        }
        if let Ok(v) = std::env::var("FETCHBRIDGE_SCHEME") {
            config.scheme = v.to_ascii_lowercase();
        }

        config
    }

    /// Check values that cannot be expressed in the type system.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if !matches!(self.scheme.as_str(), "http" | "https") {
            return Err(BridgeError::Config(format!(
                "unsupported scheme: {}",
                self.scheme
            )));
        }
        if self.listen.trim().is_empty() {
            return Err(BridgeError::Config("listen address is empty".to_owned()));
        }
        Ok(())
    }
}

fn parse_bool(raw: &str) -> bool {
    raw == "1" || raw.eq_ignore_ascii_case("true") || raw.eq_ignore_ascii_case("yes")
}
