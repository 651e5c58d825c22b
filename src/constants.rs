// -
// Data directory layout

/// Sub-directory of `data_dir` holding the replicated log.
pub(crate) const LOG_STORE_DIR: &str = "logs";
/// Sub-directory of `data_dir` holding consensus metadata (term, vote).
pub(crate) const STABLE_STORE_DIR: &str = "conf";
/// Sub-directory of `data_dir` holding the engine's snapshots.
pub(crate) const SNAPSHOT_DIR: &str = "snapshots";

/// Sled tree namespaces inside a store directory
pub(crate) const LOG_TREE: &str = "_raft_log";
pub(crate) const STABLE_TREE: &str = "_raft_stable";

// -
// Stable-store keys written by the consensus engine

pub const KEY_CURRENT_TERM: &[u8] = b"CurrentTerm";
pub const KEY_LAST_VOTE_TERM: &[u8] = b"LastVoteTerm";
pub const KEY_LAST_VOTE_CAND: &[u8] = b"LastVoteCand";

// -
// Snapshot files

pub(crate) const SNAPSHOT_META_FILE: &str = "meta.json";
pub(crate) const SNAPSHOT_STATE_FILE: &str = "state.bin.gz";
pub(crate) const SNAPSHOT_TMP_SUFFIX: &str = ".tmp";
