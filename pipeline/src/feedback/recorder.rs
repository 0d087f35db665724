//! Folding a published item's outcome back into the corpus.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::corpus::{Corpus, CorpusError, ScoreSource, TrainingSample};
use crate::debate::ConsensusDecision;
use crate::taxonomy::AttributeSet;

/// Parameters of the synthetic outcome used when no measurement exists.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseConfig {
    /// Standard deviation of the Gaussian noise added to the predicted score.
    pub std_dev: f64,
    /// Noise is truncated to ± this many standard deviations.
    pub max_sigmas: f64,
    pub min_score: f64,
    pub max_score: f64,
    pub min_exposures: u32,
    pub max_exposures: u32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            std_dev: 0.02,
            max_sigmas: 3.0,
            min_score: 0.0,
            max_score: 1.0,
            min_exposures: 500,
            max_exposures: 5000,
        }
    }
}

/// A real performance measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasuredOutcome {
    pub score: f64,
    pub exposures: u32,
}

/// Appends one training sample per published item.
#[derive(Debug, Clone)]
pub struct FeedbackRecorder {
    corpus: Arc<Corpus>,
    noise: NoiseConfig,
}

impl FeedbackRecorder {
    pub fn new(corpus: Arc<Corpus>, noise: NoiseConfig) -> Self {
        Self { corpus, noise }
    }

    pub fn corpus(&self) -> &Arc<Corpus> {
        &self.corpus
    }

    /// Record a published item. Uses `measured` when present, otherwise
    /// synthesizes an outcome around `predicted_score`.
    pub async fn record(
        &self,
        attributes: &AttributeSet,
        decision: &ConsensusDecision,
        predicted_score: f64,
        measured: Option<MeasuredOutcome>,
    ) -> Result<TrainingSample, CorpusError> {
        let sample = {
            let mut rng = rand::thread_rng();
            self.build_sample(attributes, decision, predicted_score, measured, &mut rng)
        };
        self.corpus.append(&sample).await?;
        info!(
            item = %attributes.identifier,
            score = sample.score,
            exposures = sample.exposures,
            source = ?sample.score_source,
            provenance = %decision.provenance,
            "Recorded training sample"
        );
        Ok(sample)
    }

    /// Assemble the sample without writing it.
    pub fn build_sample<R: Rng + ?Sized>(
        &self,
        attributes: &AttributeSet,
        decision: &ConsensusDecision,
        predicted_score: f64,
        measured: Option<MeasuredOutcome>,
        rng: &mut R,
    ) -> TrainingSample {
        let (score, exposures, score_source) = match measured {
            Some(m) => (m.score, m.exposures, ScoreSource::Measured),
            None => {
                let (score, exposures) = self.synthesize(predicted_score, rng);
                (score, exposures, ScoreSource::Synthetic)
            }
        };
        TrainingSample {
            attributes: attributes.clone(),
            settings: decision.settings,
            score,
            exposures,
            provenance: Some(decision.provenance),
            score_source,
            recorded_at: Some(Utc::now()),
        }
    }

    /// Predicted score plus bounded Gaussian noise, clamped; uniform exposures.
    pub fn synthesize<R: Rng + ?Sized>(&self, predicted_score: f64, rng: &mut R) -> (f64, u32) {
        let limit = self.noise.max_sigmas * self.noise.std_dev;
        let noise = (standard_normal(rng) * self.noise.std_dev).clamp(-limit, limit);
        let score = (predicted_score + noise).clamp(self.noise.min_score, self.noise.max_score);

        let (low, high) = (
            self.noise.min_exposures.min(self.noise.max_exposures),
            self.noise.min_exposures.max(self.noise.max_exposures),
        );
        let exposures = rng.gen_range(low..=high);
        (score, exposures)
    }

    /// Number of samples in the corpus.
    pub async fn size(&self) -> Result<usize, CorpusError> {
        self.corpus.len().await
    }
}

/// Box–Muller transform.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // u1 in (0, 1] keeps ln finite.
    let u1: f64 = 1.0 - rng.gen::<f64>();
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
