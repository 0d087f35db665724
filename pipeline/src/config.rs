//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debate::DebateConfig;
use crate::feedback::NoiseConfig;
use crate::generation::DEFAULT_ATTEMPT_BUDGET;
use crate::predictor::RetrainConfig;

/// Tunables for one engine instance. Every field has a default, so a TOML
/// file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Generate attempts per budget cycle for the main image.
    pub attempt_budget: u32,
    /// Generate attempts per budget cycle for each variant.
    pub variant_attempt_budget: u32,
    /// Delay before every external image call, in milliseconds.
    pub call_spacing_ms: u64,
    /// Generate side and back views after the main image is accepted.
    pub generate_variants: bool,
    pub debate: DebateConfig,
    pub noise: NoiseConfig,
    pub retrain: RetrainConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            attempt_budget: DEFAULT_ATTEMPT_BUDGET,
            variant_attempt_budget: DEFAULT_ATTEMPT_BUDGET,
            call_spacing_ms: 0,
            generate_variants: true,
            debate: DebateConfig::default(),
            noise: NoiseConfig::default(),
            retrain: RetrainConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(source)
    }

    pub fn call_spacing(&self) -> Duration {
        Duration::from_millis(self.call_spacing_ms)
    }
}
