//! Engine configuration.

use serde::{Deserialize, Serialize};
use votechaos_protocol::Limits;

/// Settings shared by the registry and every room actor.
///
/// Override individual fields with struct update syntax:
///
/// ```rust
/// use votechaos_room::EngineConfig;
///
/// let config = EngineConfig {
///     default_round_seconds: 45,
///     ..EngineConfig::default()
/// };
/// assert_eq!(config.limits.max_options, 6);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bounds on client-supplied questions, options, names and timers.
    pub limits: Limits,

    /// Classic round length when the creator does not set one.
    pub default_round_seconds: u64,

    /// How many fresh codes to try before giving up on a create.
    pub max_code_attempts: usize,

    /// Bound of each room actor's command queue.
    pub channel_size: usize,

    /// Delay before an expired round whose resolution could not be saved
    /// is tried again.
    pub expiry_retry_seconds: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            default_round_seconds: 30,
            max_code_attempts: 16,
            channel_size: 64,
            expiry_retry_seconds: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();
        assert_eq!(config.default_round_seconds, 30);
        assert_eq!(config.max_code_attempts, 16);
        assert_eq!(config.channel_size, 64);
        assert_eq!(config.expiry_retry_seconds, 1);
        assert_eq!(config.limits.min_options, 2);
        assert_eq!(config.limits.max_round_seconds, 3600);
    }
}
