//! Listing Pipeline Library
//!
//! This library turns uploaded product photos into a validated, published
//! catalog listing:
//! - Settings prediction over the full photography settings space
//! - Advocate debate reconciling the prediction with a brand view
//! - Bounded generate/validate loops with human guidance mid-flight
//! - Feedback corpus and on-demand predictor retraining
//!
//! # Components
//!
//! ## Prediction
//! - [`predictor::ModelSlot`]: shared handle to the current model; `predict` and `retrain`
//! - [`predictor::SettingsModel`]: additive model over attribute × setting terms
//!
//! ## Consensus
//! - [`debate::DebateOrchestrator`]: performance advocate → brand advocate → moderator
//! - [`debate::ConsensusDecision`]: settings used for generation, tagged
//!   `full_ml`, `full_creative` or `hybrid`
//!
//! ## Generation
//! - [`generation::GenerationLoop`]: per-slot state machine with an attempt budget
//! - [`variants::VariantGenerator`]: side and back views of the accepted main image
//!
//! ## Items
//! - [`item::Engine`]: drives an [`item::ItemRun`] through every stage and applies
//!   [`item::ItemEvent`]s at suspension points
//! - [`feedback::FeedbackRecorder`]: one training sample per published item
//!
//! # Usage
//!
//! ```bash
//! # Predict settings for one product
//! studio-agents predict --garment-type hoodie --color black --fit oversized --gender unisex
//!
//! # Retrain once the corpus is large enough
//! studio-agents retrain
//! ```

pub mod cancel;
pub mod collaborators;
pub mod config;
pub mod debate;
pub mod error;
pub mod feedback;
pub mod generation;
pub mod item;
pub mod listing;
pub mod persist;
pub mod predictor;
pub mod scenario;
pub mod taxonomy;
pub mod variants;

// Re-export key types
pub use collaborators::{
    AttributeExtractor, GenerationFailure, Image, ImageGenerator, ImageValidator, PublishError,
    Publisher, ReferenceImages, ServiceError, ValidationRequest, Verdict,
};
pub use config::PipelineConfig;
pub use debate::{
    ConsensusDecision, DebateConfig, DebateError, DebateOrchestrator, DebateOutcome, DebateRole,
    Provenance, RoleCallError, RoleInvoker, RoleRequest,
};
pub use error::{PipelineError, PipelineResult};
pub use feedback::{Corpus, CorpusError, FeedbackRecorder, MeasuredOutcome, TrainingSample};
pub use generation::{GenerationLoop, ImageSlot, LoopState};
pub use item::{
    AuditStore, AutoPublish, Engine, ItemEvent, ItemReport, ItemRun, ItemStage, ItemStatus,
    ReviewPolicy, Services, Upload,
};
pub use listing::ListingDraft;
pub use predictor::{ModelSlot, ModelStore, PredictorError, RetrainReport, SettingsCandidate};
pub use scenario::{GenerationDirectives, ScenarioBuilder, TemplateScenarioBuilder};
pub use taxonomy::{AttributeSet, ImageSettings, RawAttributes, SettingsAxis, ValidationError};
