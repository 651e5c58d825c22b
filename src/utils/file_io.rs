use std::fs::create_dir_all;
use std::fs::File;
use std::path::Path;

use tracing::debug;
use tracing::error;

use crate::Result;
use crate::StorageError;

pub fn create_dir_if_not_exist(path: &Path) -> Result<()> {
    if !path.exists() {
        if let Err(e) = create_dir_all(path) {
            error!("Failed to create directory: {:?}", e);
            return Err(StorageError::PathError {
                path: path.to_path_buf(),
                source: e,
            }
            .into());
        }
        debug!("created directory {:?}", path);
    }
    Ok(())
}

pub fn create_parent_dir_if_not_exist(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent_dir) => create_dir_if_not_exist(parent_dir),
        None => Ok(()),
    }
}

/// Fsyncs a directory so a rename inside it survives a crash.
pub(crate) fn sync_dir(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        File::open(path)
            .and_then(|dir| dir.sync_all())
            .map_err(|e| StorageError::PathError {
                path: path.to_path_buf(),
                source: e,
            })?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
