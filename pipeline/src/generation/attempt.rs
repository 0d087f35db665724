//! Attempt records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::state::ImageSlot;
use crate::scenario::GenerationDirectives;

/// How one attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Approved,
    GenerationFailed { reason: String },
    Rejected { reason: String },
}

impl AttemptOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, Self::Approved)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Approved => None,
            Self::GenerationFailed { reason } | Self::Rejected { reason } => Some(reason),
        }
    }
}

/// What the attempt asked the image service for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptRequest {
    /// Fresh generation from directives.
    Generate { directives: GenerationDirectives },
    /// Edit of the accepted image.
    Refine { instruction: String },
}

/// One bounded try at producing a passing image for a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationAttempt {
    /// 1-based across the loop's lifetime.
    pub number: u32,
    /// Budget cycle (1 for the initial budget, +1 per guidance).
    pub cycle: u32,
    pub slot: ImageSlot,
    pub request: AttemptRequest,
    pub outcome: AttemptOutcome,
    /// Guidance that preceded this attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guidance: Option<String>,
    pub finished_at: DateTime<Utc>,
}
