//! Pipeline error types
//!
//! Component errors are aggregated here with the stage (and, for generation,
//! the slot and attempt) they happened in.

use thiserror::Error;

use crate::collaborators::{PublishError, ServiceError};
use crate::debate::DebateError;
use crate::feedback::CorpusError;
use crate::generation::{ImageSlot, LoopError};
use crate::persist::StoreError;
use crate::predictor::PredictorError;
use crate::taxonomy::ValidationError;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while processing an item
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The attribute extractor call failed
    #[error("Attribute extraction failed: {0}")]
    Extraction(#[source] ServiceError),

    /// Extracted attributes are outside the vocabularies
    #[error("Invalid attributes: {0}")]
    Validation(#[from] ValidationError),

    #[error("Prediction failed: {0}")]
    Prediction(#[from] PredictorError),

    #[error("Debate failed: {0}")]
    Debate(#[from] DebateError),

    /// A generation loop could not continue
    #[error("Generation of {slot} image failed at attempt {attempt}: {source}")]
    Generation {
        slot: ImageSlot,
        attempt: u32,
        #[source]
        source: LoopError,
    },

    #[error("Publishing failed: {0}")]
    Publish(#[from] PublishError),

    #[error("Corpus error: {0}")]
    Corpus(#[from] CorpusError),

    /// Writing the item report failed
    #[error("Audit store error: {0}")]
    Audit(#[from] StoreError),

    /// The cancellation token fired during an external call
    #[error("Cancelled while {stage}")]
    Cancelled { stage: String },

    /// An event arrived in a stage that cannot handle it
    #[error("Event '{event}' is not valid while the item is {status}")]
    InvalidEvent { event: String, status: String },
}

impl PipelineError {
    /// Create an invalid event error
    pub fn invalid_event(event: impl Into<String>, status: impl std::fmt::Display) -> Self {
        Self::InvalidEvent {
            event: event.into(),
            status: status.to_string(),
        }
    }

    /// Stage the error is attributed to, as shown in item reports.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Extraction(_) | Self::Validation(_) => "extracting",
            Self::Prediction(_) => "predicting",
            Self::Debate(_) => "debating",
            Self::Generation { .. } => "generating",
            Self::Publish(_) => "publishing",
            Self::Corpus(_) => "recording",
            Self::Audit(_) => "auditing",
            Self::Cancelled { .. } => "cancelled",
            Self::InvalidEvent { .. } => "event",
        }
    }

    /// Whether the error came from a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled { .. }
                | Self::Debate(DebateError::Cancelled { .. })
                | Self::Generation {
                    source: LoopError::Cancelled { .. },
                    ..
                }
        )
    }
}
