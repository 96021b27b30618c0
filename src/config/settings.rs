//! Process settings
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. Every layer is optional; a process with no file and an
//! empty environment runs against `localhost` with development credentials.

use crate::error::ConfigError;
use crate::topology::DEFAULT_NAMESPACE;
use log::{debug, LevelFilter};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// PostgreSQL connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            name: "zerotrace".to_string(),
            user: "zerotrace".to_string(),
            password: "zerotrace_dev_pass".to_string(),
        }
    }
}

/// RabbitMQ connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub vhost: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            user: "zerotrace".to_string(),
            password: "zerotrace_dev_pass".to_string(),
            vhost: "/".to_string(),
        }
    }
}

/// Redis connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: u32,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            password: None,
            db: 0,
        }
    }
}

/// Host and port of an HTTP service of the platform
///
/// Both fields are required when the table appears in a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSettings {
    pub host: String,
    pub port: u16,
}

impl EndpointSettings {
    fn local(port: u16) -> Self {
        Self {
            host: "localhost".to_string(),
            port,
        }
    }
}

/// Complete process configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub broker: BrokerSettings,
    pub cache: CacheSettings,
    pub api: EndpointSettings,
    pub ui: EndpointSettings,
    /// Prefix of every exchange name
    pub bus_namespace: String,
    pub dev_mode: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database: DatabaseSettings::default(),
            broker: BrokerSettings::default(),
            cache: CacheSettings::default(),
            api: EndpointSettings::local(8000),
            ui: EndpointSettings::local(3000),
            bus_namespace: DEFAULT_NAMESPACE.to_string(),
            dev_mode: false,
            log_level: "INFO".to_string(),
        }
    }
}

impl Settings {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = Self::default();
        settings.apply_env(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    /// Load settings from a TOML file; keys missing from the file keep their defaults
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read and
    /// `ConfigError::TomlError` if it is not valid TOML for these settings.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut settings: Settings = toml::from_str(content)?;
        settings.log_level = settings.log_level.to_uppercase();
        Ok(settings)
    }

    /// Override fields from environment-style variables
    ///
    /// `lookup` returns the value of a variable, or `None` when it is unset. Passing a
    /// closure instead of reading the process environment keeps tests free of global
    /// state.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, target: &mut String| {
            if let Some(value) = lookup(key) {
                debug!("Config override from {}", key);
                *target = value;
            }
        };

        string("POSTGRES_HOST", &mut self.database.host);
        string("POSTGRES_DB", &mut self.database.name);
        string("POSTGRES_USER", &mut self.database.user);
        string("POSTGRES_PASSWORD", &mut self.database.password);
        string("RABBITMQ_HOST", &mut self.broker.host);
        string("RABBITMQ_USER", &mut self.broker.user);
        string("RABBITMQ_PASSWORD", &mut self.broker.password);
        string("RABBITMQ_VHOST", &mut self.broker.vhost);
        string("REDIS_HOST", &mut self.cache.host);
        string("API_HOST", &mut self.api.host);
        string("UI_HOST", &mut self.ui.host);
        string("BUS_NAMESPACE", &mut self.bus_namespace);

        let ports = [
            ("POSTGRES_PORT", &mut self.database.port),
            ("RABBITMQ_PORT", &mut self.broker.port),
            ("REDIS_PORT", &mut self.cache.port),
            ("API_PORT", &mut self.api.port),
            ("UI_PORT", &mut self.ui.port),
        ];
        for (key, target) in ports {
            if let Some(value) = lookup(key) {
                *target = parse_port(key, &value)?;
            }
        }

        if let Some(password) = lookup("REDIS_PASSWORD") {
            self.cache.password = Some(password).filter(|p| !p.is_empty());
        }
        if let Some(db) = lookup("REDIS_DB") {
            self.cache.db = db.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "REDIS_DB".to_string(),
                value: db.clone(),
            })?;
        }
        if let Some(dev_mode) = lookup("DEV_MODE") {
            self.dev_mode = dev_mode.trim().eq_ignore_ascii_case("true");
        }
        if let Some(level) = lookup("LOG_LEVEL") {
            self.log_level = level.trim().to_uppercase();
        }

        Ok(())
    }

    /// Map the configured level name onto a `log` filter
    ///
    /// Accepts the usual Rust names as well as `WARNING` and `CRITICAL`; anything
    /// unrecognised falls back to `Info`.
    pub fn log_level_filter(&self) -> LevelFilter {
        match self.log_level.as_str() {
            "TRACE" => LevelFilter::Trace,
            "DEBUG" => LevelFilter::Debug,
            "WARN" | "WARNING" => LevelFilter::Warn,
            "ERROR" | "CRITICAL" => LevelFilter::Error,
            "OFF" => LevelFilter::Off,
            _ => LevelFilter::Info,
        }
    }
}

fn parse_port(key: &str, value: &str) -> Result<u16, ConfigError> {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}
