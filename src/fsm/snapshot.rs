use std::fmt;

#[cfg(test)]
use mockall::automock;
use tracing::debug;
use tracing::warn;

use crate::metrics::SNAPSHOTS;
use crate::KvCache;
use crate::MemCache;
use crate::Result;

/// Destination for one snapshot, supplied by the consensus engine.
///
/// A sink is finished exactly once: either `close` commits what was written
/// or `cancel` discards it.
#[cfg_attr(test, automock)]
pub trait SnapshotSink: Send {
    fn id(&self) -> String;

    fn write_all(
        &mut self,
        buf: &[u8],
    ) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    fn cancel(&mut self) -> Result<()>;
}

/// Handle returned by [`StateMachine::snapshot`](crate::StateMachine::snapshot).
pub trait FsmSnapshot: Send {
    /// Writes the captured state to `sink` and closes it. The sink is
    /// cancelled on any failure.
    fn persist(
        &self,
        sink: &mut dyn SnapshotSink,
    ) -> Result<()>;

    fn release(&mut self) {}
}

/// Private copy of the cache taken when the snapshot was requested, so
/// `persist` can run while later entries are applied.
pub struct KvSnapshot {
    state: MemCache,
}

impl fmt::Debug for KvSnapshot {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("KvSnapshot")
            .field("keys", &self.state.len())
            .finish()
    }
}

impl KvSnapshot {
    pub fn capture(cache: &dyn KvCache) -> Self {
        Self {
            state: MemCache::with_entries(cache.entries()),
        }
    }

    fn write_and_close(
        &self,
        sink: &mut dyn SnapshotSink,
    ) -> Result<()> {
        let bytes = self.state.marshal()?;
        sink.write_all(&bytes)?;
        sink.close()?;
        debug!("snapshot {} persisted, {} bytes", sink.id(), bytes.len());
        Ok(())
    }
}

impl FsmSnapshot for KvSnapshot {
    fn persist(
        &self,
        sink: &mut dyn SnapshotSink,
    ) -> Result<()> {
        match self.write_and_close(sink) {
            Ok(()) => {
                SNAPSHOTS.with_label_values(&["persisted"]).inc();
                Ok(())
            }
            Err(e) => {
                warn!("snapshot {} failed, cancelling sink: {:?}", sink.id(), e);
                if let Err(cancel_err) = sink.cancel() {
                    warn!("cancel of snapshot {} failed: {:?}", sink.id(), cancel_err);
                }
                SNAPSHOTS.with_label_values(&["cancelled"]).inc();
                Err(e)
            }
        }
    }
}
