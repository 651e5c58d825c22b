use std::fs;
use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::SnapshotMeta;
use crate::constants::SNAPSHOT_DIR;
use crate::constants::SNAPSHOT_META_FILE;
use crate::constants::SNAPSHOT_STATE_FILE;
use crate::constants::SNAPSHOT_TMP_SUFFIX;
use crate::file_io::create_dir_if_not_exist;
use crate::file_io::sync_dir;
use crate::time::get_now_as_u128;
use crate::Configuration;
use crate::Result;
use crate::SnapshotSink;
use crate::StorageError;

#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Opens the store under `<data_dir>/snapshots`, discarding any snapshot
    /// left unfinished by a previous process.
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let dir = data_dir.as_ref().join(SNAPSHOT_DIR);
        create_dir_if_not_exist(&dir)?;

        let store = Self { dir };
        for entry in fs::read_dir(&store.dir)? {
            let path = entry?.path();
            if is_tmp(&path) {
                warn!("removing unfinished snapshot {:?}", path);
                fs::remove_dir_all(&path)?;
            }
        }
        Ok(store)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Starts a new snapshot covering the log up to `index`.
    pub fn create(
        &self,
        index: u64,
        term: u64,
        configuration: Configuration,
    ) -> Result<FileSnapshotSink> {
        let id = format!("{}-{}-{}", term, index, get_now_as_u128());
        let final_dir = self.dir.join(&id);
        let tmp_dir = self.dir.join(format!("{id}{SNAPSHOT_TMP_SUFFIX}"));

        fs::create_dir(&tmp_dir).map_err(|e| StorageError::PathError {
            path: tmp_dir.clone(),
            source: e,
        })?;
        let state = File::create(tmp_dir.join(SNAPSHOT_STATE_FILE))?;
        debug!("creating snapshot {}", id);

        Ok(FileSnapshotSink {
            meta: SnapshotMeta {
                id,
                index,
                term,
                configuration,
                size: 0,
            },
            final_dir,
            tmp_dir,
            encoder: Some(GzEncoder::new(BufWriter::new(state), Compression::default())),
        })
    }

    /// All finished snapshots, newest first.
    pub fn list(&self) -> Result<Vec<SnapshotMeta>> {
        let mut metas = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if !path.is_dir() || is_tmp(&path) {
                continue;
            }
            match read_meta(&path) {
                Ok(meta) => metas.push(meta),
                Err(e) => warn!("skipping unreadable snapshot {:?}: {:?}", path, e),
            }
        }

        metas.sort_by(|a, b| (b.term, b.index, &b.id).cmp(&(a.term, a.index, &a.id)));
        Ok(metas)
    }

    /// Newest snapshot with a reader over its decompressed state.
    pub fn open_latest(&self) -> Result<Option<(SnapshotMeta, Box<dyn Read + Send>)>> {
        let Some(meta) = self.list()?.into_iter().next() else {
            return Ok(None);
        };
        let reader = self.open_reader(&meta.id)?;
        Ok(Some((meta, reader)))
    }

    /// Decompressing reader over the state of snapshot `id`.
    pub fn open_reader(
        &self,
        id: &str,
    ) -> Result<Box<dyn Read + Send>> {
        let path = self.dir.join(id).join(SNAPSHOT_STATE_FILE);
        let file = File::open(&path).map_err(|e| StorageError::PathError { path, source: e })?;
        Ok(Box::new(GzDecoder::new(BufReader::new(file))))
    }

    /// Deletes all but the `retain` newest snapshots. Returns how many were
    /// removed.
    pub fn reap(
        &self,
        retain: usize,
    ) -> Result<usize> {
        let doomed: Vec<SnapshotMeta> = self.list()?.into_iter().skip(retain).collect();
        for meta in &doomed {
            info!("reaping snapshot {}", meta.id);
            fs::remove_dir_all(self.dir.join(&meta.id))?;
        }
        Ok(doomed.len())
    }
}

fn is_tmp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.ends_with(SNAPSHOT_TMP_SUFFIX))
        .unwrap_or(false)
}

fn read_meta(dir: &Path) -> Result<SnapshotMeta> {
    let bytes = fs::read(dir.join(SNAPSHOT_META_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Sink writing one snapshot into a temporary directory.
///
/// Dropping a sink that was neither closed nor cancelled cancels it.
pub struct FileSnapshotSink {
    meta: SnapshotMeta,
    final_dir: PathBuf,
    tmp_dir: PathBuf,
    encoder: Option<GzEncoder<BufWriter<File>>>,
}

impl std::fmt::Debug for FileSnapshotSink {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("FileSnapshotSink")
            .field("meta", &self.meta)
            .field("open", &self.encoder.is_some())
            .finish()
    }
}

impl FileSnapshotSink {
    pub fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    fn encoder(&mut self) -> Result<&mut GzEncoder<BufWriter<File>>> {
        let id = &self.meta.id;
        self.encoder
            .as_mut()
            .ok_or_else(|| StorageError::Snapshot(format!("snapshot {id} already finished")).into())
    }

    fn finish(&mut self) -> Result<()> {
        let encoder = self.encoder.take().ok_or_else(|| {
            StorageError::Snapshot(format!("snapshot {} already finished", self.meta.id))
        })?;
        let mut writer = encoder.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        let meta_path = self.tmp_dir.join(SNAPSHOT_META_FILE);
        let mut meta_file = File::create(&meta_path)?;
        meta_file.write_all(&serde_json::to_vec_pretty(&self.meta)?)?;
        meta_file.sync_all()?;

        publish(&self.tmp_dir, &self.final_dir, sync_dir)
    }
}

/// Renames `tmp_dir` to `final_dir`, then syncs the parent directory.
///
/// Once the rename succeeded the snapshot is committed, so a failed parent
/// sync is only logged.
pub(super) fn publish(
    tmp_dir: &Path,
    final_dir: &Path,
    sync_parent: impl FnOnce(&Path) -> Result<()>,
) -> Result<()> {
    fs::rename(tmp_dir, final_dir).map_err(|e| StorageError::PathError {
        path: final_dir.to_path_buf(),
        source: e,
    })?;
    if let Some(parent) = final_dir.parent() {
        if let Err(e) = sync_parent(parent) {
            warn!("snapshot {:?} committed but directory sync failed: {:?}", final_dir, e);
        }
    }
    Ok(())
}

impl SnapshotSink for FileSnapshotSink {
    fn id(&self) -> String {
        self.meta.id.clone()
    }

    fn write_all(
        &mut self,
        buf: &[u8],
    ) -> Result<()> {
        self.encoder()?.write_all(buf)?;
        self.meta.size += buf.len() as u64;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Err(e) = self.finish() {
            // leave nothing behind under either name
            if self.tmp_dir.exists() {
                fs::remove_dir_all(&self.tmp_dir).ok();
            }
            return Err(e);
        }
        info!(
            "snapshot {} closed at index {}, {} bytes",
            self.meta.id, self.meta.index, self.meta.size
        );
        Ok(())
    }

    fn cancel(&mut self) -> Result<()> {
        self.encoder.take();
        if self.tmp_dir.exists() {
            fs::remove_dir_all(&self.tmp_dir)?;
        }
        debug!("snapshot {} cancelled", self.meta.id);
        Ok(())
    }
}

impl Drop for FileSnapshotSink {
    fn drop(&mut self) {
        if self.encoder.is_some() {
            if let Err(e) = self.cancel() {
                warn!("failed to cancel dropped snapshot {}: {:?}", self.meta.id, e);
            }
        }
    }
}
