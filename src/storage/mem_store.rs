use std::collections::BTreeMap;
use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::trace;

use crate::LogRecord;
use crate::LogStore;
use crate::Result;
use crate::StableStore;
use crate::StorageError;

/// In-memory [`LogStore`] and [`StableStore`].
///
/// Nothing survives the process; used for tests and throwaway nodes.
#[derive(Debug, Default)]
pub struct MemStore {
    inner: RwLock<MemInner>,
}

#[derive(Debug, Default)]
struct MemInner {
    logs: BTreeMap<u64, LogRecord>,
    stable: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogStore for MemStore {
    fn first_index(&self) -> Result<u64> {
        Ok(self.inner.read().logs.keys().next().copied().unwrap_or(0))
    }

    fn last_index(&self) -> Result<u64> {
        Ok(self.inner.read().logs.keys().next_back().copied().unwrap_or(0))
    }

    fn get_log(
        &self,
        index: u64,
    ) -> Result<LogRecord> {
        self.inner
            .read()
            .logs
            .get(&index)
            .cloned()
            .ok_or_else(|| StorageError::LogNotFound(index).into())
    }

    fn store_logs(
        &self,
        records: &[LogRecord],
    ) -> Result<()> {
        if records.iter().any(|r| r.index == 0) {
            return Err(StorageError::ReservedIndex.into());
        }
        trace!("store_logs len = {}", records.len());

        let mut inner = self.inner.write();
        for record in records {
            inner.logs.insert(record.index, record.clone());
        }
        Ok(())
    }

    fn delete_range(
        &self,
        min: u64,
        max: u64,
    ) -> Result<()> {
        if min > max {
            return Ok(());
        }
        let mut inner = self.inner.write();
        let doomed: Vec<u64> = inner.logs.range(min..=max).map(|(k, _)| *k).collect();
        for index in doomed {
            inner.logs.remove(&index);
        }
        Ok(())
    }
}

impl StableStore for MemStore {
    fn set(
        &self,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        self.inner.write().stable.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn get(
        &self,
        key: &[u8],
    ) -> Result<Vec<u8>> {
        self.inner
            .read()
            .stable
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound.into())
    }

    fn set_uint64(
        &self,
        key: &[u8],
        value: u64,
    ) -> Result<()> {
        self.set(key, &value.to_be_bytes())
    }

    fn get_uint64(
        &self,
        key: &[u8],
    ) -> Result<u64> {
        crate::convert::safe_vk(self.get(key)?)
    }
}
