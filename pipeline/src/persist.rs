//! Atomic JSON persistence shared by the model store and the audit store.
//!
//! Writes go to a sibling temp file, are fsynced, then renamed over the
//! target. A reader never sees a partially written file. The previous
//! contents are copied to `<name>.backup` first (best-effort).

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error on {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Serialize `value` as pretty JSON and atomically replace `path`.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let content = serde_json::to_vec_pretty(value).map_err(|e| StoreError::Json {
        path: path.to_path_buf(),
        source: e,
    })?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
    }

    if path.exists() {
        let backup = sibling(path, ".backup");
        if let Err(e) = std::fs::copy(path, &backup) {
            warn!(path = %path.display(), error = %e, "Failed to create backup; continuing");
        }
    }

    let temp = sibling(path, ".tmp");
    {
        let mut file = std::fs::File::create(&temp).map_err(|e| StoreError::io(&temp, e))?;
        file.write_all(&content).map_err(|e| StoreError::io(&temp, e))?;
        file.sync_all().map_err(|e| StoreError::io(&temp, e))?;
    }

    std::fs::rename(&temp, path).map_err(|e| StoreError::io(path, e))
}

/// Read and deserialize a JSON file. `Ok(None)` when the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&content)
        .map(Some)
        .map_err(|e| StoreError::Json {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_write_replaces_and_keeps_backup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let first: BTreeMap<&str, u32> = [("a", 1)].into_iter().collect();
        write_json_atomic(&path, &first).unwrap();
        let second: BTreeMap<&str, u32> = [("a", 2)].into_iter().collect();
        write_json_atomic(&path, &second).unwrap();

        let loaded: BTreeMap<String, u32> = read_json(&path).unwrap().unwrap();
        assert_eq!(loaded["a"], 2);
        assert!(dir.path().join("nested/state.json.backup").exists());
        assert!(!dir.path().join("nested/state.json.tmp").exists());
    }

    #[test]
    fn test_missing_file_reads_none() {
        let dir = tempfile::tempdir().unwrap();
        let missing: Option<Vec<u32>> = read_json(&dir.path().join("nope.json")).unwrap();
        assert!(missing.is_none());
    }
}
