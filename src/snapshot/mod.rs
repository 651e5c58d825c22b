//! On-disk snapshot store used by the bundled consensus engine.
//!
//! Layout under `<data_dir>/snapshots/`:
//! ```text
//! <term>-<index>-<unix_millis>/
//!     meta.json      SnapshotMeta
//!     state.bin.gz   gzip-compressed state machine bytes
//! ```
//! A snapshot being written lives in a `<name>.tmp` sibling until it is
//! closed, so a crash never leaves a half-written snapshot under a final
//! name.

mod file_snapshot_store;


pub use file_snapshot_store::*;

use serde::Deserialize;
use serde::Serialize;

use crate::Configuration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMeta {
    pub id: String,
    /// Last log index covered by the snapshot
    pub index: u64,
    pub term: u64,
    /// Membership as of `index`
    pub configuration: Configuration,
    /// Uncompressed state size in bytes
    pub size: u64,
}
