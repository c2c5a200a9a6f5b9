//! Server settings, read from `KEYSPACE_*` environment variables.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

const ENV_PREFIX: &str = "KEYSPACE_";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `KEYSPACE_ADDR`
    pub addr: SocketAddr,
    /// `KEYSPACE_HZ`: how many times per second the background cron runs
    pub hz: u32,
    /// `KEYSPACE_REHASH_MS`: rehash time budget of one cron run
    pub rehash_budget: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            hz: 10,
            rehash_budget: Duration::from_millis(1),
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by whatever `KEYSPACE_*` variables are set
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(env::vars())?;
        Ok(config)
    }

    /// Applies every `KEYSPACE_*` pair of `vars`, ignoring other names
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            let Some(name) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.trim();
            match name {
                "ADDR" => self.addr = parse_value(&key, value)?,
                "HZ" => {
                    let hz = parse_value(&key, value)?;
                    if hz == 0 {
                        return Err(invalid(&key, value));
                    }
                    self.hz = hz;
                }
                "REHASH_MS" => {
                    self.rehash_budget = Duration::from_millis(parse_value(&key, value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }
        Ok(())
    }

    /// Time between two cron runs
    pub fn cron_period(&self) -> Duration {
        Duration::from_secs(1) / self.hz.max(1)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(key, value))
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}
