//! Table configuration models.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::Chips;

/// Floor for the authority heartbeat interval.
pub const MIN_AUTHORITY_TICK: Duration = Duration::from_millis(500);

/// Floor for the follower silence timeout before a takeover attempt.
pub const MIN_FOLLOWER_TIMEOUT: Duration = Duration::from_secs(3);

/// Per-table runtime configuration, serialized and shared via snapshots.
///
/// Keep this struct stable and backward-compatible: it travels inside
/// every table snapshot on the wire.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TableConfig {
    /// Table name (display only).
    pub name: String,

    /// Stack granted to a newly seated player.
    pub min_buyin: Chips,

    /// Small blind amount.
    pub small_blind: Chips,

    /// Big blind amount.
    pub big_blind: Chips,

    /// Authority heartbeat interval in milliseconds.
    pub authority_tick_ms: u64,

    /// Follower silence timeout in milliseconds.
    pub follower_timeout_ms: u64,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            name: "Table".to_string(),
            min_buyin: 200,
            small_blind: 5,
            big_blind: 10,
            authority_tick_ms: 500,
            follower_timeout_ms: 3_000,
        }
    }
}

impl TableConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.big_blind <= self.small_blind {
            return Err("big blind must be greater than small blind".to_string());
        }
        if self.min_buyin < self.big_blind {
            return Err("minimum buy-in must cover at least the big blind".to_string());
        }
        Ok(())
    }

    /// Effective heartbeat interval, clamped to the floor.
    #[must_use]
    pub fn authority_tick(&self) -> Duration {
        Duration::from_millis(self.authority_tick_ms).max(MIN_AUTHORITY_TICK)
    }

    /// Effective follower timeout, clamped to the floor.
    #[must_use]
    pub fn follower_timeout(&self) -> Duration {
        Duration::from_millis(self.follower_timeout_ms).max(MIN_FOLLOWER_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(TableConfig::default().validate().is_ok());
    }

    #[test]
    fn blinds_must_be_ordered() {
        let config = TableConfig {
            small_blind: 10,
            big_blind: 10,
            ..TableConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn buyin_must_cover_big_blind() {
        let config = TableConfig {
            min_buyin: 5,
            ..TableConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn timers_clamp_to_floors() {
        let config = TableConfig {
            authority_tick_ms: 1,
            follower_timeout_ms: 1,
            ..TableConfig::default()
        };
        assert_eq!(config.authority_tick(), MIN_AUTHORITY_TICK);
        assert_eq!(config.follower_timeout(), MIN_FOLLOWER_TIMEOUT);
    }

    #[test]
    fn generous_timers_pass_through() {
        let config = TableConfig {
            authority_tick_ms: 2_000,
            follower_timeout_ms: 10_000,
            ..TableConfig::default()
        };
        assert_eq!(config.authority_tick(), Duration::from_secs(2));
        assert_eq!(config.follower_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = TableConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: TableConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
