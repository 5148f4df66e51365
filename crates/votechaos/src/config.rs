//! Server configuration, loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use votechaos_room::EngineConfig;

pub const BIND_VAR: &str = "VOTECHAOS_BIND";
pub const IDLE_TIMEOUT_VAR: &str = "VOTECHAOS_IDLE_TIMEOUT_SECS";
pub const DEFAULT_ROUND_VAR: &str = "VOTECHAOS_DEFAULT_ROUND_SECS";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Settings for a [`VoteChaosServer`](crate::VoteChaosServer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// A connection that sends nothing for this long is dropped.
    /// Clients keep alive with `heartbeat`.
    pub idle_timeout: Duration,

    pub engine: EngineConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
            idle_timeout: Duration::from_secs(60),
            engine: EngineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads overrides from the process environment. Call
    /// `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from `lookup`, falling back to defaults for unset
    /// keys.
    ///
    /// ```rust
    /// use votechaos::ServerConfig;
    ///
    /// let config = ServerConfig::from_lookup(|key| match key {
    ///     "VOTECHAOS_BIND" => Some("127.0.0.1:9000".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    /// assert_eq!(config.bind_addr, "127.0.0.1:9000");
    /// assert_eq!(config.engine.default_round_seconds, 30);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup(BIND_VAR) {
            let addr = addr.trim();
            if addr.is_empty() {
                return Err(invalid(BIND_VAR, addr, "must not be empty"));
            }
            config.bind_addr = addr.to_string();
        }

        if let Some(raw) = lookup(IDLE_TIMEOUT_VAR) {
            let secs: u64 = parse(IDLE_TIMEOUT_VAR, &raw)?;
            if secs == 0 {
                return Err(invalid(IDLE_TIMEOUT_VAR, &raw, "must be at least 1"));
            }
            config.idle_timeout = Duration::from_secs(secs);
        }

        if let Some(raw) = lookup(DEFAULT_ROUND_VAR) {
            let secs: u64 = parse(DEFAULT_ROUND_VAR, &raw)?;
            let limits = &config.engine.limits;
            if !(limits.min_round_seconds..=limits.max_round_seconds).contains(&secs) {
                return Err(invalid(
                    DEFAULT_ROUND_VAR,
                    &raw,
                    &format!(
                        "must be between {} and {}",
                        limits.min_round_seconds, limits.max_round_seconds
                    ),
                ));
            }
            config.engine.default_round_seconds = secs;
        }

        Ok(config)
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| invalid(key, raw, &e.to_string()))
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.idle_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (BIND_VAR, " 127.0.0.1:7000 "),
            (IDLE_TIMEOUT_VAR, "15"),
            (DEFAULT_ROUND_VAR, "45"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:7000");
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert_eq!(config.engine.default_round_seconds, 45);
    }

    #[test]
    fn test_from_lookup_rejects_unparseable_timeout() {
        let err = ServerConfig::from_lookup(lookup(&[(IDLE_TIMEOUT_VAR, "soon")])).unwrap_err();
        assert!(err.to_string().contains(IDLE_TIMEOUT_VAR));
    }

    #[test]
    fn test_from_lookup_rejects_zero_timeout() {
        assert!(ServerConfig::from_lookup(lookup(&[(IDLE_TIMEOUT_VAR, "0")])).is_err());
    }

    #[test]
    fn test_from_lookup_rejects_round_out_of_bounds() {
        let err = ServerConfig::from_lookup(lookup(&[(DEFAULT_ROUND_VAR, "7200")])).unwrap_err();
        assert!(err.to_string().contains("between 1 and 3600"));
    }

    #[test]
    fn test_from_lookup_rejects_blank_bind() {
        assert!(ServerConfig::from_lookup(lookup(&[(BIND_VAR, "  ")])).is_err());
    }
}
