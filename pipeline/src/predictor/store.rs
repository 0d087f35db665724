//! On-disk home of the trained model.

use std::path::{Path, PathBuf};

use tracing::info;

use super::{PredictorError, SettingsModel, MODEL_SCHEMA_VERSION};
use crate::persist::{read_json, write_json_atomic};

/// JSON file holding the current [`SettingsModel`].
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the model, `Ok(None)` if no model has been trained yet.
    pub fn load(&self) -> Result<Option<SettingsModel>, PredictorError> {
        let Some(model) = read_json::<SettingsModel>(&self.path)? else {
            return Ok(None);
        };
        if model.schema_version > MODEL_SCHEMA_VERSION {
            return Err(PredictorError::IncompatibleModel {
                path: self.path.clone(),
                found: model.schema_version,
                supported: MODEL_SCHEMA_VERSION,
            });
        }
        Ok(Some(model))
    }

    /// Atomically replace the model file.
    pub fn save(&self, model: &SettingsModel) -> Result<(), PredictorError> {
        write_json_atomic(&self.path, model)?;
        info!(path = %self.path.display(), version = %model.version, "Saved settings model");
        Ok(())
    }
}
