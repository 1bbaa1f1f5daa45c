//! Protocol timing. Every field defaults, so hosts can embed a partial `[sync]` table.

use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Heartbeat broadcast period.
    pub heartbeat_interval_ms: u64,
    /// Peer directory eviction age.
    pub discovery_timeout_ms: u64,
    /// Master's GROUP_ANNOUNCE period.
    pub group_announce_interval_ms: u64,
    /// Group directory eviction age.
    pub group_discovery_timeout_ms: u64,
    /// Master's periodic GROUP_INFO period.
    pub group_info_interval_ms: u64,
    /// Roster members need a heartbeat younger than this. Must be >= discovery timeout.
    pub member_timeout_ms: u64,
    /// Member's TIME_REQUEST period.
    pub time_sync_interval_ms: u64,
    /// Master's EFFECT_STATE period.
    pub effect_sync_interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 1000,
            discovery_timeout_ms: 6000,
            group_announce_interval_ms: 2000,
            group_discovery_timeout_ms: 6000,
            group_info_interval_ms: 2000,
            member_timeout_ms: 6000,
            time_sync_interval_ms: 10_000,
            effect_sync_interval_ms: 100,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("group_announce_interval_ms", self.group_announce_interval_ms),
            ("group_info_interval_ms", self.group_info_interval_ms),
            ("time_sync_interval_ms", self.time_sync_interval_ms),
            ("effect_sync_interval_ms", self.effect_sync_interval_ms),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ZeroInterval(name));
        }
        if self.member_timeout_ms < self.discovery_timeout_ms {
            return Err(ConfigError::MemberTimeoutTooShort {
                member_timeout_ms: self.member_timeout_ms,
                discovery_timeout_ms: self.discovery_timeout_ms,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be non-zero")]
    ZeroInterval(&'static str),
    #[error("member timeout {member_timeout_ms}ms is shorter than discovery timeout {discovery_timeout_ms}ms")]
    MemberTimeoutTooShort {
        member_timeout_ms: u64,
        discovery_timeout_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(SyncConfig::default().validate(), Ok(()));
    }

    #[test]
    fn member_timeout_must_cover_discovery() {
        let cfg = SyncConfig {
            member_timeout_ms: 3000,
            ..SyncConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MemberTimeoutTooShort { .. })
        ));
    }

    #[test]
    fn zero_interval_rejected() {
        let cfg = SyncConfig {
            heartbeat_interval_ms: 0,
            ..SyncConfig::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroInterval("heartbeat_interval_ms"))
        );
    }
}
