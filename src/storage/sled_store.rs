use std::path::Path;
use std::path::PathBuf;

use parking_lot::RwLock;
use sled::Batch;
use tracing::debug;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

use crate::constants::LOG_STORE_DIR;
use crate::constants::LOG_TREE;
use crate::constants::STABLE_STORE_DIR;
use crate::constants::STABLE_TREE;
use crate::convert::safe_kv;
use crate::convert::safe_vk;
use crate::LogRecord;
use crate::LogStore;
use crate::Result;
use crate::StableStore;
use crate::StorageConfig;
use crate::StorageError;

/// sled-backed [`LogStore`] and [`StableStore`].
///
/// Log records and metadata live in separate trees so the two key spaces never
/// interleave. All access goes through `rw_lock`; sled batches are the
/// atomicity boundary for multi-key writes.
pub struct SledStore {
    db: sled::Db,
    log_tree: sled::Tree,
    stable_tree: sled::Tree,
    path: PathBuf,
    sync_writes: bool,
    rw_lock: RwLock<()>,
}

impl std::fmt::Debug for SledStore {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("path", &self.path)
            .field("log_len", &self.log_tree.len())
            .field("stable_len", &self.stable_tree.len())
            .finish()
    }
}

impl SledStore {
    /// Opens (or creates) a store at `path`.
    pub fn open(
        path: impl AsRef<Path>,
        options: &StorageConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("open sled store at {:?}", path);

        let db = sled::Config::default()
            .path(&path)
            .cache_capacity(options.cache_capacity_bytes)
            .use_compression(options.use_compression)
            .compression_factor(options.compression_factor)
            .flush_every_ms(options.flush_every_ms)
            .open()
            .map_err(|e| {
                warn!("Try to open DB at this location: {:?} and failed: {:?}", path, e);
                StorageError::DbError(e.to_string())
            })?;

        let log_tree = db.open_tree(LOG_TREE)?;
        let stable_tree = db.open_tree(STABLE_TREE)?;

        Ok(Self {
            db,
            log_tree,
            stable_tree,
            path,
            sync_writes: options.sync_writes,
            rw_lock: RwLock::new(()),
        })
    }

    /// Opens the replicated-log store under `<data_dir>/logs`.
    pub fn open_log_store(
        data_dir: impl AsRef<Path>,
        options: &StorageConfig,
    ) -> Result<Self> {
        Self::open(data_dir.as_ref().join(LOG_STORE_DIR), options)
    }

    /// Opens the stable-metadata store under `<data_dir>/conf`.
    pub fn open_stable_store(
        data_dir: impl AsRef<Path>,
        options: &StorageConfig,
    ) -> Result<Self> {
        Self::open(data_dir.as_ref().join(STABLE_STORE_DIR), options)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes dirty buffers and fsyncs.
    pub fn flush(&self) -> Result<()> {
        let _guard = self.rw_lock.write();
        self.db.flush()?;
        Ok(())
    }

    #[inline]
    pub(crate) fn index_to_key(index: u64) -> [u8; 8] {
        safe_kv(index)
    }

    fn sync(&self) -> Result<()> {
        if self.sync_writes {
            self.db.flush()?;
        }
        Ok(())
    }

    fn index_at(
        &self,
        item: sled::Result<Option<(sled::IVec, sled::IVec)>>,
    ) -> Result<u64> {
        match item? {
            Some((key, _)) => safe_vk(&key),
            None => Ok(0),
        }
    }

    #[cfg(test)]
    pub(crate) fn log_len(&self) -> usize {
        self.log_tree.len()
    }

    #[cfg(test)]
    pub(crate) fn raw_log_tree(&self) -> &sled::Tree {
        &self.log_tree
    }
}

impl LogStore for SledStore {
    fn first_index(&self) -> Result<u64> {
        let _guard = self.rw_lock.read();
        self.index_at(self.log_tree.first())
    }

    fn last_index(&self) -> Result<u64> {
        let _guard = self.rw_lock.read();
        self.index_at(self.log_tree.last())
    }

    #[instrument(skip(self))]
    fn get_log(
        &self,
        index: u64,
    ) -> Result<LogRecord> {
        let _guard = self.rw_lock.read();
        match self.log_tree.get(Self::index_to_key(index))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Err(StorageError::LogNotFound(index).into()),
        }
    }

    #[instrument(skip_all, fields(len = records.len()))]
    fn store_logs(
        &self,
        records: &[LogRecord],
    ) -> Result<()> {
        let _guard = self.rw_lock.write();
        let mut batch = Batch::default();

        for record in records {
            if record.index == 0 {
                return Err(StorageError::ReservedIndex.into());
            }
            let value = bincode::serialize(record)?;
            batch.insert(&Self::index_to_key(record.index)[..], value);
        }

        self.log_tree.apply_batch(batch)?;
        self.sync()?;
        trace!("stored {} log records", records.len());
        Ok(())
    }

    #[instrument(skip(self))]
    fn delete_range(
        &self,
        min: u64,
        max: u64,
    ) -> Result<()> {
        if min > max {
            return Ok(());
        }
        let _guard = self.rw_lock.write();
        let start = Self::index_to_key(min);
        let end = Self::index_to_key(max);
        let mut batch = Batch::default();

        for item in self.log_tree.range(start..=end) {
            let (key, _) = item?;
            batch.remove(key);
        }

        self.log_tree.apply_batch(batch)?;
        self.sync()
    }

    fn flush(&self) -> Result<()> {
        SledStore::flush(self)
    }
}

impl StableStore for SledStore {
    fn set(
        &self,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let _guard = self.rw_lock.write();
        self.stable_tree.insert(key, value)?;
        self.sync()
    }

    fn get(
        &self,
        key: &[u8],
    ) -> Result<Vec<u8>> {
        let _guard = self.rw_lock.read();
        match self.stable_tree.get(key)? {
            Some(ivec) => Ok(ivec.to_vec()),
            None => Err(StorageError::KeyNotFound.into()),
        }
    }

    fn set_uint64(
        &self,
        key: &[u8],
        value: u64,
    ) -> Result<()> {
        self.set(key, &safe_kv(value))
    }

    fn get_uint64(
        &self,
        key: &[u8],
    ) -> Result<u64> {
        safe_vk(self.get(key)?)
    }

    fn flush(&self) -> Result<()> {
        SledStore::flush(self)
    }
}
