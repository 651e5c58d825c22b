//! Deterministic state machine over the key-value cache.
//!
//! Every replica applies the same committed log in the same order, so
//! `apply` must not depend on anything but the entry and the current cache.

mod snapshot;


pub use snapshot::*;

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::error;

use crate::metrics::APPLIED_COMMANDS;
use crate::KvCache;
use crate::LogRecord;
use crate::LogType;
use crate::MemCache;
use crate::Result;

/// Operation carried by a replicated command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Op {
    Set,
    Del,
    /// Any op this version does not know. Applying it changes nothing.
    #[default]
    #[serde(other)]
    Unknown,
}

impl fmt::Display for Op {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Op::Set => write!(f, "set"),
            Op::Del => write!(f, "del"),
            Op::Unknown => write!(f, "unknown"),
        }
    }
}

/// Replicated command payload, JSON encoded on the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntryData {
    #[serde(rename = "Op", default)]
    pub op: Op,
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

impl LogEntryData {
    pub fn set(
        key: &str,
        value: &str,
    ) -> Self {
        Self {
            op: Op::Set,
            key: key.to_string(),
            value: value.to_string(),
        }
    }

    pub fn del(key: &str) -> Self {
        Self {
            op: Op::Del,
            key: key.to_string(),
            value: String::new(),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// What applying one committed entry did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Set,
    Deleted,
    /// Entry carried no application change
    Noop,
}

pub trait StateMachine: Send + Sync + 'static {
    /// Applies one committed entry.
    ///
    /// # Panics
    /// When a command entry cannot be decoded. Skipping it would let this
    /// replica silently diverge from the others.
    fn apply(
        &self,
        record: &LogRecord,
    ) -> ApplyOutcome;

    /// Captures a point-in-time view whose `persist` does not block `apply`.
    fn snapshot(&self) -> Result<Box<dyn FsmSnapshot>>;

    /// Discards all current state and replaces it with the decoded stream.
    fn restore(
        &self,
        source: &mut dyn Read,
    ) -> Result<()>;
}

/// [`StateMachine`] writing into a shared [`KvCache`].
pub struct KvStateMachine<C: KvCache = MemCache> {
    cache: Arc<C>,
}

impl<C: KvCache> fmt::Debug for KvStateMachine<C> {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("KvStateMachine")
            .field("keys", &self.cache.len())
            .finish()
    }
}

impl<C: KvCache> KvStateMachine<C> {
    pub fn new(cache: Arc<C>) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &Arc<C> {
        &self.cache
    }
}

impl<C: KvCache> StateMachine for KvStateMachine<C> {
    fn apply(
        &self,
        record: &LogRecord,
    ) -> ApplyOutcome {
        if record.log_type != LogType::Command {
            return ApplyOutcome::Noop;
        }

        let kv = match LogEntryData::decode(&record.data) {
            Ok(kv) => kv,
            Err(e) => {
                error!(
                    index = record.index,
                    term = record.term,
                    "failed to decode committed entry: {:?}",
                    e
                );
                panic!(
                    "failed to apply request at index {}: {:?}",
                    record.index,
                    String::from_utf8_lossy(&record.data)
                );
            }
        };

        let outcome = match kv.op {
            Op::Set => match self.cache.set(&kv.key, &kv.value) {
                Ok(()) => ApplyOutcome::Set,
                Err(e) => {
                    error!("cache rejected set at index {}: {:?}", record.index, e);
                    panic!("cache rejected committed set at index {}", record.index);
                }
            },
            Op::Del => {
                self.cache.del(&kv.key);
                ApplyOutcome::Deleted
            }
            Op::Unknown => ApplyOutcome::Noop,
        };

        APPLIED_COMMANDS
            .with_label_values(&[&kv.op.to_string()])
            .inc();
        debug!(index = record.index, op = %kv.op, key = %kv.key, "applied");
        outcome
    }

    fn snapshot(&self) -> Result<Box<dyn FsmSnapshot>> {
        Ok(Box::new(KvSnapshot::capture(self.cache.as_ref())))
    }

    fn restore(
        &self,
        source: &mut dyn Read,
    ) -> Result<()> {
        self.cache.unmarshal(source)?;
        debug!("restored cache with {} keys", self.cache.len());
        Ok(())
    }
}
