use std::path::Path;

use config as cfg;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{GraphError, Result};

const ENV_PREFIX: &str = "ACTIONGRAPH";

/// Main configuration for an ActionGraph instance
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GraphConfig {
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Commit-time event delivery
    #[serde(default)]
    pub events: EventsConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "pretty" or "compact"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventsConfig {
    /// Capacity of the broadcast channel carrying committed graph events.
    /// Slow subscribers past this lag lose the oldest events.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Publish events on the broadcast channel in addition to the delegate
    #[serde(default = "default_broadcast")]
    pub broadcast: bool,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
            broadcast: default_broadcast(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "pretty".to_string()
}
fn default_channel_capacity() -> usize {
    1024
}
fn default_broadcast() -> bool {
    true
}

impl GraphConfig {
    /// Load configuration with precedence:
    /// 1. Built-in defaults
    /// 2. Optional TOML file at `path`
    /// 3. Environment variables (ACTIONGRAPH__* prefix, `__` separator)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load), reading environment variables from `env`
    /// instead of the process environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<cfg::Map<String, String>>) -> Result<Self> {
        let mut builder = cfg::Config::builder().add_source(cfg::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(GraphError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(cfg::File::from(path).required(true));
        }

        builder = builder.add_source(
            cfg::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(env),
        );

        let config: GraphConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: GraphConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.events.channel_capacity == 0 {
            return Err(GraphError::Config(
                "events.channel_capacity must be greater than zero".to_string(),
            ));
        }
        match self.logging.format.as_str() {
            "pretty" | "compact" => {}
            other => {
                return Err(GraphError::Config(format!(
                    "unsupported log format: {}",
                    other
                )))
            }
        }
        Ok(())
    }
}
