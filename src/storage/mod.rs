//! Durable storage for the replicated log and consensus metadata.
//!
//! Two capabilities share one component:
//! - [`LogStore`]: the replicated log, indexed by big-endian `u64` keys so the
//!   ordered engine's lexicographic order equals numeric index order
//! - [`StableStore`]: arbitrary metadata keys (term, vote) used by the
//!   consensus engine for its own bookkeeping
//!
//! [`SledStore`] persists both on sled, [`MemStore`] keeps both in memory.

mod mem_store;
mod sled_store;


pub use mem_store::*;
pub use sled_store::*;

use serde::Deserialize;
use serde::Serialize;

use crate::Result;

/// Kind of payload carried by a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogType {
    /// Opaque application command, handed to the state machine
    Command,
    /// Entry appended by a new leader to commit its term
    Noop,
    /// Serialized cluster [`Configuration`](crate::Configuration)
    Configuration,
}

/// One replicated log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub index: u64,
    pub term: u64,
    pub log_type: LogType,
    pub data: Vec<u8>,
}

impl LogRecord {
    pub fn command(
        index: u64,
        term: u64,
        data: Vec<u8>,
    ) -> Self {
        Self {
            index,
            term,
            log_type: LogType::Command,
            data,
        }
    }

    pub fn noop(
        index: u64,
        term: u64,
    ) -> Self {
        Self {
            index,
            term,
            log_type: LogType::Noop,
            data: Vec::new(),
        }
    }
}

/// Replicated log storage.
///
/// Index `0` is reserved: it is what `first_index`/`last_index` report for an
/// empty log, and no record may be stored under it.
pub trait LogStore: Send + Sync + 'static {
    /// Lowest stored index, 0 for an empty log.
    fn first_index(&self) -> Result<u64>;

    /// Highest stored index, 0 for an empty log.
    fn last_index(&self) -> Result<u64>;

    /// Returns `StorageError::LogNotFound` when the index was never stored or
    /// has been compacted away.
    fn get_log(
        &self,
        index: u64,
    ) -> Result<LogRecord>;

    fn store_log(
        &self,
        record: &LogRecord,
    ) -> Result<()> {
        self.store_logs(std::slice::from_ref(record))
    }

    /// Stores all records in one atomic batch: after a failure none of them is
    /// visible.
    fn store_logs(
        &self,
        records: &[LogRecord],
    ) -> Result<()>;

    /// Deletes every index in `[min, max]` atomically.
    fn delete_range(
        &self,
        min: u64,
        max: u64,
    ) -> Result<()>;

    /// Makes every acknowledged write durable.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Consensus metadata storage.
pub trait StableStore: Send + Sync + 'static {
    fn set(
        &self,
        key: &[u8],
        value: &[u8],
    ) -> Result<()>;

    /// Returns `StorageError::KeyNotFound` for a key never written.
    fn get(
        &self,
        key: &[u8],
    ) -> Result<Vec<u8>>;

    fn set_uint64(
        &self,
        key: &[u8],
        value: u64,
    ) -> Result<()>;

    /// Returns `StorageError::KeyNotFound` for a key never written.
    fn get_uint64(
        &self,
        key: &[u8],
    ) -> Result<u64>;

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
