//! Settings predictor.
//!
//! Scores every point of the settings space for a product and returns the
//! best one. The trained model lives in a [`ModelSlot`] shared between
//! predictions (read access) and retraining (exclusive access), and is
//! persisted by a [`ModelStore`].
//!
//! # Lifecycle
//!
//! ```text
//!   corpus.jsonl ──retrain()──▶ SettingsModel ──save (tmp + rename)──▶ model.json
//!                                   │
//!                                   └──swap──▶ ModelSlot ──predict()──▶ SettingsCandidate
//! ```

pub mod model;
pub mod slot;
pub mod store;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feedback::CorpusError;
use crate::persist::StoreError;
use crate::taxonomy::{ImageSettings, ValidationError};

pub use model::{FitMetrics, SettingsModel, MODEL_SCHEMA_VERSION};
pub use slot::ModelSlot;
pub use store::ModelStore;

/// Errors from prediction and retraining.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("no trained settings model is loaded")]
    ModelUnavailable,
    #[error("corpus has {found} samples; retraining needs at least {required}")]
    CorpusTooSmall { found: usize, required: usize },
    #[error("model file {path} has schema version {found}; this build reads up to {supported}")]
    IncompatibleModel {
        path: PathBuf,
        found: u32,
        supported: u32,
    },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Corpus(#[from] CorpusError),
}

/// Best settings for one product, as scored by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingsCandidate {
    pub settings: ImageSettings,
    /// Predicted performance score in [0, 1].
    pub predicted_score: f64,
    /// Holdout fit quality of the model in [0, 1].
    pub confidence: f64,
    pub model_version: String,
    pub generated_at: DateTime<Utc>,
    pub reasoning: String,
}

/// Backfitting parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitOptions {
    /// Full passes over all terms.
    pub iterations: usize,
    /// Pseudo-sample count pulling each level effect toward zero.
    pub shrinkage: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            iterations: 25,
            shrinkage: 5.0,
        }
    }
}

/// Retraining policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainConfig {
    /// Minimum corpus size. Never below 5, so the holdout is non-empty.
    pub min_samples: usize,
    pub fit: FitOptions,
}

impl Default for RetrainConfig {
    fn default() -> Self {
        Self {
            min_samples: 50,
            fit: FitOptions::default(),
        }
    }
}

impl RetrainConfig {
    pub fn required_samples(&self) -> usize {
        self.min_samples.max(5)
    }
}

/// Outcome of a successful retrain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainReport {
    pub model_version: String,
    pub n_samples: usize,
    pub mae: f64,
    pub r2: f64,
    pub path: PathBuf,
}
