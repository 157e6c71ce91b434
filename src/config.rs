//! Container configuration.
//!
//! Tunables are read from a [`ConfigSource`]: the process environment, an
//! in-memory property map or, with the `config` feature, JSON/YAML documents.
//! Durations are human-readable strings ("30 seconds", "500ms"); a bare number
//! is taken in the key's default unit.

use std::collections::HashMap;
use std::env;
use std::time::Duration;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

use crate::error::{ContainerError, ContainerResult};

pub const ACCESS_TIMEOUT: &str = "AccessTimeout";
pub const CLOSE_TIMEOUT: &str = "CloseTimeout";
pub const POOL_MIN_THREADS: &str = "AsynchronousPool.MinThreads";
pub const POOL_MAX_THREADS: &str = "AsynchronousPool.MaxThreads";
pub const POOL_KEEP_ALIVE: &str = "AsynchronousPool.KeepAlive";

/// Unit applied to a bare number in a duration setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Millis,
    Seconds,
}

impl TimeUnit {
    fn of(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Millis => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
        }
    }
}

/// Parses a duration setting.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::config::{parse_duration, TimeUnit};
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("250", TimeUnit::Millis).unwrap(), Duration::from_millis(250));
/// assert_eq!(parse_duration("30 seconds", TimeUnit::Millis).unwrap(), Duration::from_secs(30));
/// assert_eq!(parse_duration("1 minute 30 SECONDS", TimeUnit::Millis).unwrap(), Duration::from_secs(90));
/// assert!(parse_duration("soon", TimeUnit::Millis).is_err());
/// ```
pub fn parse_duration(value: &str, default_unit: TimeUnit) -> ContainerResult<Duration> {
    let trimmed = value.trim();
    if let Ok(amount) = trimmed.parse::<u64>() {
        return Ok(default_unit.of(amount));
    }
    let compact: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    humantime::parse_duration(&compact)
        .map_err(|e| ContainerError::Config(format!("invalid duration '{}': {}", value, e)))
}

/// Sizing of the asynchronous worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default, rename_all = "camelCase"))]
pub struct PoolConfig {
    pub min_threads: usize,
    pub max_threads: usize,
    /// Idle time after which threads above `min_threads` exit.
    #[cfg_attr(feature = "config", serde(with = "duration_text"))]
    pub keep_alive: Duration,
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_threads: 1,
            max_threads: 10,
            keep_alive: Duration::from_secs(60),
            thread_name: "singleton-async".to_string(),
        }
    }
}

/// Container-wide settings.
///
/// # Examples
///
/// ```rust
/// use ferrous_singleton::config::{ContainerConfig, MapConfigSource};
/// use std::time::Duration;
///
/// let source = MapConfigSource::new()
///     .with("AccessTimeout", "5 seconds")
///     .with("AsynchronousPool.MaxThreads", "4");
/// let config = ContainerConfig::load(&source).unwrap();
///
/// assert_eq!(config.access_timeout, Duration::from_secs(5));
/// assert_eq!(config.pool.max_threads, 4);
/// assert_eq!(config.close_timeout, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "config", serde(default, rename_all = "camelCase"))]
pub struct ContainerConfig {
    /// Default bounded wait for the instance lock.
    #[cfg_attr(feature = "config", serde(with = "duration_text"))]
    pub access_timeout: Duration,
    /// How long shutdown waits for queued asynchronous calls.
    #[cfg_attr(feature = "config", serde(with = "duration_text"))]
    pub close_timeout: Duration,
    #[cfg_attr(feature = "config", serde(rename = "asynchronousPool"))]
    pub pool: PoolConfig,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            access_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(10),
            pool: PoolConfig::default(),
        }
    }
}

impl ContainerConfig {
    /// Defaults overridden by whatever `source` provides, then validated.
    pub fn load(source: &dyn ConfigSource) -> ContainerResult<Self> {
        let mut config = Self::default();
        if let Some(raw) = source.get(ACCESS_TIMEOUT) {
            config.access_timeout = parse_duration(&raw, TimeUnit::Millis)?;
        }
        if let Some(raw) = source.get(CLOSE_TIMEOUT) {
            config.close_timeout = parse_duration(&raw, TimeUnit::Millis)?;
        }
        if let Some(raw) = source.get(POOL_MIN_THREADS) {
            config.pool.min_threads = parse_count(POOL_MIN_THREADS, &raw)?;
        }
        if let Some(raw) = source.get(POOL_MAX_THREADS) {
            config.pool.max_threads = parse_count(POOL_MAX_THREADS, &raw)?;
        }
        if let Some(raw) = source.get(POOL_KEEP_ALIVE) {
            config.pool.keep_alive = parse_duration(&raw, TimeUnit::Seconds)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Reads `SINGLETON_`-prefixed process environment variables.
    pub fn from_env() -> ContainerResult<Self> {
        Self::load(&EnvironmentConfigSource::with_prefix("SINGLETON"))
    }

    pub fn validate(&self) -> ContainerResult<()> {
        if self.pool.min_threads < 1 {
            return Err(ContainerError::Config(
                "asynchronous pool needs at least one thread".to_string(),
            ));
        }
        if self.pool.max_threads < self.pool.min_threads {
            return Err(ContainerError::Config(format!(
                "asynchronous pool max threads ({}) below min threads ({})",
                self.pool.max_threads, self.pool.min_threads
            )));
        }
        Ok(())
    }

    #[cfg(feature = "config")]
    pub fn from_json_str(json: &str) -> ContainerResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ContainerError::Config(format!("invalid JSON configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "config")]
    pub fn from_yaml_str(yaml: &str) -> ContainerResult<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| ContainerError::Config(format!("invalid YAML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_count(key: &str, raw: &str) -> ContainerResult<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|e| ContainerError::Config(format!("invalid {} '{}': {}", key, raw, e)))
}

/// A provider of raw configuration values.
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    fn get(&self, key: &str) -> Option<String>;

    fn keys(&self) -> Vec<String>;
}

/// Process environment variables.
///
/// `AsynchronousPool.MaxThreads` with prefix `SINGLETON` is read from
/// `SINGLETON_ASYNCHRONOUSPOOL_MAXTHREADS`.
#[derive(Debug, Default)]
pub struct EnvironmentConfigSource {
    prefix: Option<String>,
}

impl EnvironmentConfigSource {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn env_key(&self, key: &str) -> String {
        let key = key.replace('.', "_").to_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), key),
            None => key,
        }
    }
}

impl ConfigSource for EnvironmentConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(self.env_key(key)).ok()
    }

    fn keys(&self) -> Vec<String> {
        let prefix = self.prefix.as_ref().map(|p| format!("{}_", p.to_uppercase()));
        env::vars()
            .filter_map(|(key, _)| match &prefix {
                Some(prefix) => key.strip_prefix(prefix.as_str()).map(str::to_string),
                None => Some(key),
            })
            .collect()
    }
}

/// In-memory properties, keyed exactly as written.
#[derive(Debug, Default, Clone)]
pub struct MapConfigSource {
    values: HashMap<String, String>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapConfigSource {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

#[cfg(feature = "config")]
mod duration_text {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    use super::{parse_duration, TimeUnit};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(u64),
            Text(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Ok(Duration::from_millis(ms)),
            Raw::Text(text) => parse_duration(&text, TimeUnit::Millis).map_err(serde::de::Error::custom),
        }
    }
}
