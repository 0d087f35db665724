//! Item reports on disk, one JSON file per run.

use std::path::{Path, PathBuf};

use tracing::debug;

use super::ItemReport;
use crate::persist::{read_json, write_json_atomic, StoreError};

#[derive(Debug, Clone)]
pub struct AuditStore {
    dir: PathBuf,
}

impl AuditStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}.json"))
    }

    /// Write (or overwrite) the report for its run.
    pub fn save(&self, report: &ItemReport) -> Result<PathBuf, StoreError> {
        let path = self.path_for(&report.run_id);
        write_json_atomic(&path, report)?;
        debug!(run = %report.run_id, status = %report.status, path = %path.display(), "Saved item report");
        Ok(path)
    }

    pub fn load(&self, run_id: &str) -> Result<Option<ItemReport>, StoreError> {
        read_json(&self.path_for(run_id))
    }
}
