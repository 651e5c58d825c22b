//! Error hierarchy for the replicated key-value store.
//!
//! Errors are grouped by the layer that raised them so the request layer can
//! tell an absent key from a broken store, and a rejected write from a failed
//! one.

use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;
use tokio::task::JoinError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Infrastructure-level failures (storage, serialization, tasks)
    #[error(transparent)]
    System(#[from] SystemError),

    /// Configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Write admission and replication failures
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    #[error("Storage operation failed: {0}")]
    Storage(#[from] StorageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Node failed to start: {0}")]
    NodeStartFailed(String),

    #[error("Background task failed: {0}")]
    TaskFailed(#[from] JoinError),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Stable-store key was never written
    #[error("key not found")]
    KeyNotFound,

    /// Log index was never stored or has been compacted away
    #[error("log entry {0} not found")]
    LogNotFound(u64),

    /// Index 0 marks an empty log and can never be stored
    #[error("log index 0 is reserved")]
    ReservedIndex,

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Error occurred at path: {path}")]
    PathError {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Embedded database errors
    #[error("Embedded database error: {0}")]
    DbError(String),

    #[error("Snapshot operation failed: {0}")]
    Snapshot(String),

    #[error("Data corruption detected at {location}")]
    DataCorruption { location: String },

    #[error("Value convert failed: {0}")]
    Convert(#[from] ConvertError),
}

#[derive(Debug, thiserror::Error)]
pub enum SerializationError {
    #[error("Bincode serialization failed: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error type for value conversion operations
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The input byte slice is not exactly 8 bytes long.
    #[error("invalid byte length: expected 8 bytes, received {0} bytes")]
    InvalidLength(usize),
}

#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    /// Write or membership change attempted on a node that is not the leader
    #[error("Not cluster leader")]
    NotLeader,

    /// The engine did not acknowledge the operation in time. The operation may
    /// still commit.
    #[error("Operation not acknowledged within {duration:?}")]
    Timeout { duration: Duration },

    #[error("Consensus engine is shut down")]
    Shutdown,

    #[error(transparent)]
    Membership(#[from] MembershipError),
}

#[derive(Debug, thiserror::Error)]
pub enum MembershipError {
    #[error("Membership update failed: {0}")]
    UpdateFailed(String),

    #[error("Cluster has no configuration; bootstrap or join first")]
    NotBootstrapped,

    #[error("Engine cannot replicate to member {id} at {address}")]
    Unsupported { id: String, address: String },
}

impl Error {
    /// True for an absent stable key or log index.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::System(SystemError::Storage(
                StorageError::KeyNotFound | StorageError::LogNotFound(_)
            ))
        )
    }

    pub fn is_not_leader(&self) -> bool {
        matches!(self, Error::Consensus(ConsensusError::NotLeader))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Consensus(ConsensusError::Timeout { .. }))
    }
}

// ============== Conversion Implementations ============== //
impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::System(SystemError::Storage(e))
    }
}

impl From<ConvertError> for Error {
    fn from(e: ConvertError) -> Self {
        Error::System(SystemError::Storage(StorageError::Convert(e)))
    }
}

impl From<SerializationError> for Error {
    fn from(e: SerializationError) -> Self {
        Error::System(SystemError::Serialization(e))
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        SerializationError::Bincode(e).into()
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        SerializationError::Json(e).into()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        StorageError::IoError(e).into()
    }
}

impl From<sled::Error> for Error {
    fn from(err: sled::Error) -> Self {
        StorageError::DbError(err.to_string()).into()
    }
}

impl From<MembershipError> for Error {
    fn from(e: MembershipError) -> Self {
        Error::Consensus(ConsensusError::Membership(e))
    }
}

impl From<JoinError> for Error {
    fn from(err: JoinError) -> Self {
        SystemError::TaskFailed(err).into()
    }
}
