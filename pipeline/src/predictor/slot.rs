//! Shared handle to the current model.
//!
//! Predictions take the read lock for a whole scoring pass. Retraining takes
//! the write lock for fit, persist and swap, so a prediction never observes a
//! half-replaced model and two retrains never interleave.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use super::{
    ModelStore, PredictorError, RetrainConfig, RetrainReport, SettingsCandidate, SettingsModel,
};
use crate::feedback::Corpus;
use crate::taxonomy::{AttributeSet, RawAttributes};

#[derive(Debug, Clone)]
pub struct ModelSlot {
    model: Arc<RwLock<Option<SettingsModel>>>,
    store: ModelStore,
}

impl ModelSlot {
    /// Empty slot; predictions fail until a retrain succeeds.
    pub fn empty(store: ModelStore) -> Self {
        Self {
            model: Arc::new(RwLock::new(None)),
            store,
        }
    }

    /// Slot primed from the store, empty if no model file exists yet.
    pub fn load(store: ModelStore) -> Result<Self, PredictorError> {
        let model = store.load()?;
        match &model {
            Some(m) => info!(path = %store.path().display(), version = %m.version, "Loaded settings model"),
            None => warn!(path = %store.path().display(), "No settings model on disk; retrain before predicting"),
        }
        Ok(Self {
            model: Arc::new(RwLock::new(model)),
            store,
        })
    }

    pub fn store(&self) -> &ModelStore {
        &self.store
    }

    pub async fn is_loaded(&self) -> bool {
        self.model.read().await.is_some()
    }

    /// Version of the loaded model, if any.
    pub async fn version(&self) -> Option<String> {
        self.model.read().await.as_ref().map(|m| m.version.clone())
    }

    /// Best settings for a product.
    pub async fn predict(&self, attributes: &AttributeSet) -> Result<SettingsCandidate, PredictorError> {
        let guard = self.model.read().await;
        let model = guard.as_ref().ok_or(PredictorError::ModelUnavailable)?;
        Ok(model.predict(attributes))
    }

    /// Normalize raw attribute strings, then predict.
    pub async fn predict_raw(&self, raw: &RawAttributes) -> Result<SettingsCandidate, PredictorError> {
        let attributes = raw.normalize("adhoc")?;
        self.predict(&attributes).await
    }

    /// Retrain on the full corpus and swap the new model in.
    ///
    /// On any failure the previous model file and in-memory model are left as
    /// they were.
    pub async fn retrain(
        &self,
        corpus: &Corpus,
        config: &RetrainConfig,
    ) -> Result<RetrainReport, PredictorError> {
        let mut guard = self.model.write().await;

        let samples = corpus.read_all().await?;
        let required = config.required_samples();
        if samples.len() < required {
            warn!(found = samples.len(), required, "Corpus too small to retrain");
            return Err(PredictorError::CorpusTooSmall {
                found: samples.len(),
                required,
            });
        }

        let model = SettingsModel::train(&samples, &config.fit);
        self.store.save(&model)?;

        let report = RetrainReport {
            model_version: model.version.clone(),
            n_samples: model.metrics.n_samples,
            mae: model.metrics.mae,
            r2: model.metrics.r2,
            path: self.store.path().to_path_buf(),
        };
        *guard = Some(model);

        info!(
            version = %report.model_version,
            samples = report.n_samples,
            mae = report.mae,
            r2 = report.r2,
            "Retrained settings model"
        );
        Ok(report)
    }
}
