use std::fmt::Debug;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Consensus engine timing and snapshot policy
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RaftConfig {
    /// How long a write waits for commit acknowledgment
    #[serde(default = "default_apply_timeout_ms")]
    pub apply_timeout_ms: u64,

    /// How long a membership change waits for acknowledgment
    #[serde(default = "default_join_timeout_ms")]
    pub join_timeout_ms: u64,

    /// How often the engine checks whether a snapshot is due
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    /// Entries applied since the last snapshot before a new one is taken
    #[serde(default = "default_snapshot_threshold")]
    pub snapshot_threshold: u64,

    /// Entries kept in the log behind a snapshot, so lagging followers can
    /// catch up without a snapshot transfer
    #[serde(default = "default_trailing_logs")]
    pub trailing_logs: u64,

    /// Snapshots kept on disk
    #[serde(default = "default_snapshot_retain")]
    pub snapshot_retain: usize,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            apply_timeout_ms: default_apply_timeout_ms(),
            join_timeout_ms: default_join_timeout_ms(),
            snapshot_interval_ms: default_snapshot_interval_ms(),
            snapshot_threshold: default_snapshot_threshold(),
            trailing_logs: default_trailing_logs(),
            snapshot_retain: default_snapshot_retain(),
        }
    }
}

impl RaftConfig {
    pub fn validate(&self) -> Result<()> {
        if self.apply_timeout_ms == 0 {
            return Err(invalid("apply_timeout_ms must be at least 1ms"));
        }
        if self.join_timeout_ms == 0 {
            return Err(invalid("join_timeout_ms must be at least 1ms"));
        }
        if self.snapshot_interval_ms == 0 {
            return Err(invalid("snapshot_interval_ms must be at least 1ms"));
        }
        if self.snapshot_threshold == 0 {
            return Err(invalid("snapshot_threshold must be greater than 0"));
        }
        if self.snapshot_retain == 0 {
            return Err(invalid("snapshot_retain must keep at least one snapshot"));
        }
        Ok(())
    }

    pub fn apply_timeout(&self) -> Duration {
        Duration::from_millis(self.apply_timeout_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }
}

fn default_apply_timeout_ms() -> u64 {
    5_000
}
fn default_join_timeout_ms() -> u64 {
    5_000
}
fn default_snapshot_interval_ms() -> u64 {
    20_000
}
fn default_snapshot_threshold() -> u64 {
    2
}
fn default_trailing_logs() -> u64 {
    10_240
}
fn default_snapshot_retain() -> usize {
    1
}
