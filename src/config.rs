//! Configuration management

use std::{path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::{Error, Result};

/// Environment variable prefix for configuration overrides
pub const ENV_PREFIX: &str = "CACHE_TEST_BACKEND_";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Simulated delay configuration
    pub delay: DelayConfig,
}

impl Config {
    /// Load configuration from defaults, an optional YAML file and the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or the resulting values are out of range.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::figment(path)?
            .extract::<Self>()
            .map_err(|e| Error::Config(e.to_string()))
            .and_then(Self::validated)
    }

    /// Build the layered figment without extracting it
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value.
    pub fn validated(self) -> Result<Self> {
        if self.delay.capacity == 0 {
            return Err(Error::Config(
                "delay.capacity must be greater than zero".to_string(),
            ));
        }
        if self.delay.capacity > Semaphore::MAX_PERMITS {
            return Err(Error::Config(format!(
                "delay.capacity must be at most {}, got {}",
                Semaphore::MAX_PERMITS,
                self.delay.capacity
            )));
        }
        if self.delay.max_delay < Duration::from_secs(1) {
            return Err(Error::Config(format!(
                "delay.max_delay must be at least 1s, got {:?}",
                self.delay.max_delay
            )));
        }
        Ok(self)
    }

    /// Render the effective configuration as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// How long in-flight requests get to finish after a shutdown signal
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
    /// Take the request scheme from `X-Forwarded-Proto` (set by a TLS-terminating cache).
    /// Off by default: any client can send the header and get a `Secure` cookie.
    pub trust_forwarded_proto: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            shutdown_timeout: Duration::from_secs(10),
            trust_forwarded_proto: false,
        }
    }
}

/// Simulated delay configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Maximum number of requests sleeping at the same time
    pub capacity: usize,
    /// Exclusive upper bound for a single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_delay: Duration::from_secs(60),
        }
    }
}
