use serde::Deserialize;
use serde::Serialize;

use super::invalid;
use crate::Result;

/// Tuning for the embedded sled engine backing the log and stable stores.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StorageConfig {
    /// Page cache size per store
    #[serde(default = "default_cache_capacity_bytes")]
    pub cache_capacity_bytes: u64,

    #[serde(default = "default_use_compression")]
    pub use_compression: bool,

    /// zstd level, 1..=22
    #[serde(default = "default_compression_factor")]
    pub compression_factor: i32,

    /// Background flush period; `None` disables background flushing
    #[serde(default = "default_flush_every_ms")]
    pub flush_every_ms: Option<u64>,

    /// fsync after every write before acknowledging it
    #[serde(default = "default_sync_writes")]
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_capacity_bytes: default_cache_capacity_bytes(),
            use_compression: default_use_compression(),
            compression_factor: default_compression_factor(),
            flush_every_ms: default_flush_every_ms(),
            sync_writes: default_sync_writes(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity_bytes == 0 {
            return Err(invalid("cache_capacity_bytes must be greater than 0"));
        }
        if self.use_compression && !(1..=22).contains(&self.compression_factor) {
            return Err(invalid(format!(
                "compression_factor {} out of range 1..=22",
                self.compression_factor
            )));
        }
        Ok(())
    }
}

fn default_cache_capacity_bytes() -> u64 {
    64 * 1024 * 1024 //64MB
}
fn default_use_compression() -> bool {
    true
}
fn default_compression_factor() -> i32 {
    1
}
fn default_flush_every_ms() -> Option<u64> {
    Some(500)
}
fn default_sync_writes() -> bool {
    true
}
