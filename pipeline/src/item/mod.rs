//! Per-item run record tying every stage together.
//!
//! # Item Flow
//!
//! ```text
//! new → extracting → predicting → debating → generating(main)
//!                                                  │
//!                  ┌───────────────────────────────┘
//!                  ▼
//!        generating(side) → generating(back) → review ──publish──▶ published
//!                                                │ ▲
//!                                                └─┘ refine
//!
//! any suspension point ──skip──▶ skipped
//! main slot abandoned  ─────────▶ exhausted
//! stage error          ─────────▶ failed
//! ```
//!
//! The run suspends whenever a slot waits for guidance and when it reaches
//! review. [`ItemEvent`]s resume it.

pub mod audit;
pub mod engine;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::collaborators::{Image, ReferenceImages};
use crate::debate::{ConsensusDecision, DebateOutcome, DebateTranscript};
use crate::feedback::MeasuredOutcome;
use crate::generation::{GenerationAttempt, GenerationLoop, ImageSlot, LoopState};
use crate::listing::ListingDraft;
use crate::predictor::SettingsCandidate;
use crate::taxonomy::AttributeSet;

pub use audit::AuditStore;
pub use engine::{AutoPublish, Engine, ReviewPolicy, Services};

/// Uploaded product photos for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    /// Upload name; its file stem is the fallback identifier.
    pub name: String,
    pub images: Vec<Image>,
}

impl Upload {
    pub fn new(name: impl Into<String>, images: Vec<Image>) -> Self {
        Self {
            name: name.into(),
            images,
        }
    }

    /// Identifier used when the extractor finds none.
    pub fn fallback_id(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.name)
            .to_string()
    }
}

/// Where an item is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "stage", content = "slot", rename_all = "snake_case")]
pub enum ItemStage {
    New,
    Extracting,
    Predicting,
    Debating,
    Generating(ImageSlot),
    Review,
    Published,
    Skipped,
    Exhausted,
    Failed,
}

impl ItemStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Published | Self::Skipped | Self::Exhausted | Self::Failed
        )
    }
}

impl std::fmt::Display for ItemStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Extracting => write!(f, "extracting"),
            Self::Predicting => write!(f, "predicting"),
            Self::Debating => write!(f, "debating"),
            Self::Generating(slot) => write!(f, "generating({slot})"),
            Self::Review => write!(f, "review"),
            Self::Published => write!(f, "published"),
            Self::Skipped => write!(f, "skipped"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// What the caller sees when the engine hands control back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    /// Not yet driven to a suspension point.
    Running { stage: ItemStage },
    /// A slot spent its budget; send guidance, abandon or skip.
    AwaitingFeedback { slot: ImageSlot },
    /// Images are ready; publish, refine or skip.
    Review,
    Published { listing_id: String },
    Skipped,
    Exhausted,
    Failed { stage: String, error: String },
}

impl ItemStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Published { .. } | Self::Skipped | Self::Exhausted | Self::Failed { .. }
        )
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running { stage } => write!(f, "running ({stage})"),
            Self::AwaitingFeedback { slot } => write!(f, "awaiting feedback on {slot} image"),
            Self::Review => write!(f, "in review"),
            Self::Published { listing_id } => write!(f, "published as {listing_id}"),
            Self::Skipped => write!(f, "skipped"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Failed { stage, error } => write!(f, "failed while {stage}: {error}"),
        }
    }
}

/// Human input that resumes a suspended item.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemEvent {
    /// Free-text direction for the slot awaiting feedback.
    Guidance(String),
    /// Give up on the slot awaiting feedback.
    Abandon,
    /// Drop the item without publishing.
    Skip,
    /// One edit of the accepted main image.
    Refine(String),
    /// Publish with this copy. `measured` replaces the synthetic outcome.
    ///
    /// On an item that is already published but whose training sample could
    /// not be written, only the sample is recorded; the publisher is not
    /// called again.
    Publish {
        draft: ListingDraft,
        measured: Option<MeasuredOutcome>,
    },
}

impl ItemEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Guidance(_) => "guidance",
            Self::Abandon => "abandon",
            Self::Skip => "skip",
            Self::Refine(_) => "refine",
            Self::Publish { .. } => "publish",
        }
    }
}

/// One line of an item's step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepEvent {
    pub at: DateTime<Utc>,
    pub stage: ItemStage,
    pub message: String,
}

/// Mutable state of one item. Serializable so a suspended item can be
/// persisted while it waits for a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRun {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) fallback_id: String,
    pub(crate) stage: ItemStage,
    pub(crate) references: ReferenceImages,
    pub(crate) attributes: Option<AttributeSet>,
    pub(crate) candidate: Option<SettingsCandidate>,
    pub(crate) debate: Option<DebateOutcome>,
    pub(crate) loops: BTreeMap<ImageSlot, GenerationLoop>,
    pub(crate) listing_id: Option<String>,
    /// Whether the training sample for the publication reached the corpus.
    #[serde(default)]
    pub(crate) sample_recorded: bool,
    /// Last error, kept for the report.
    pub(crate) error: Option<String>,
    pub(crate) steps: Vec<StepEvent>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) updated_at: DateTime<Utc>,
}

impl ItemRun {
    pub fn new(upload: Upload) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            fallback_id: upload.fallback_id(),
            name: upload.name,
            stage: ItemStage::New,
            references: ReferenceImages::product(upload.images),
            attributes: None,
            candidate: None,
            debate: None,
            loops: BTreeMap::new(),
            listing_id: None,
            sample_recorded: false,
            error: None,
            steps: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ItemStage {
        self.stage
    }

    pub fn attributes(&self) -> Option<&AttributeSet> {
        self.attributes.as_ref()
    }

    pub fn candidate(&self) -> Option<&SettingsCandidate> {
        self.candidate.as_ref()
    }

    pub fn decision(&self) -> Option<&ConsensusDecision> {
        self.debate.as_ref().map(DebateOutcome::decision)
    }

    pub fn transcript(&self) -> Option<&DebateTranscript> {
        self.debate.as_ref().map(|d| &d.transcript)
    }

    pub fn generation_loop(&self, slot: ImageSlot) -> Option<&GenerationLoop> {
        self.loops.get(&slot)
    }

    pub fn listing_id(&self) -> Option<&str> {
        self.listing_id.as_deref()
    }

    pub fn sample_recorded(&self) -> bool {
        self.sample_recorded
    }

    /// Published, but the training sample is still owed to the corpus.
    pub fn awaiting_sample(&self) -> bool {
        self.stage == ItemStage::Published && !self.sample_recorded
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn steps(&self) -> &[StepEvent] {
        &self.steps
    }

    /// Accepted images in listing order.
    pub fn accepted_images(&self) -> Vec<(ImageSlot, &Image)> {
        ImageSlot::ALL
            .iter()
            .filter_map(|slot| {
                self.loops
                    .get(slot)
                    .and_then(GenerationLoop::accepted_image)
                    .map(|image| (*slot, image))
            })
            .collect()
    }

    /// Listing copy derived from the attributes, for the publish event.
    pub fn default_draft(&self) -> Option<ListingDraft> {
        self.attributes.as_ref().map(ListingDraft::from_attributes)
    }

    /// Status as seen from outside.
    pub fn status(&self) -> ItemStatus {
        match self.stage {
            ItemStage::Generating(slot)
                if self.loops.get(&slot).map(GenerationLoop::state)
                    == Some(LoopState::AwaitingFeedback) =>
            {
                ItemStatus::AwaitingFeedback { slot }
            }
            ItemStage::Review => ItemStatus::Review,
            ItemStage::Published => ItemStatus::Published {
                listing_id: self.listing_id.clone().unwrap_or_default(),
            },
            ItemStage::Skipped => ItemStatus::Skipped,
            ItemStage::Exhausted => ItemStatus::Exhausted,
            ItemStage::Failed => ItemStatus::Failed {
                stage: self
                    .steps
                    .iter()
                    .rev()
                    .find(|s| s.stage != ItemStage::Failed)
                    .map(|s| s.stage.to_string())
                    .unwrap_or_else(|| "new".into()),
                error: self.error.clone().unwrap_or_default(),
            },
            stage => ItemStatus::Running { stage },
        }
    }

    pub(crate) fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!(item = %self.name, stage = %self.stage, "{message}");
        self.updated_at = Utc::now();
        self.steps.push(StepEvent {
            at: self.updated_at,
            stage: self.stage,
            message,
        });
    }

    pub(crate) fn enter(&mut self, stage: ItemStage, message: impl Into<String>) {
        self.stage = stage;
        self.log(message);
    }

    /// The outward record of this item.
    pub fn report(&self) -> ItemReport {
        let attempts = ImageSlot::ALL
            .iter()
            .filter_map(|slot| self.loops.get(slot))
            .flat_map(|lp| lp.attempts().iter().cloned())
            .collect();
        ItemReport {
            run_id: self.id.clone(),
            name: self.name.clone(),
            stage: self.stage,
            status: self.status(),
            attributes: self.attributes.clone(),
            candidate: self.candidate.clone(),
            decision: self.decision().cloned(),
            transcript: self.transcript().cloned(),
            slots: self
                .loops
                .iter()
                .map(|(slot, lp)| (*slot, lp.state()))
                .collect(),
            attempts,
            listing_id: self.listing_id.clone(),
            sample_recorded: self.sample_recorded,
            error: self.error.clone(),
            steps: self.steps.clone(),
            started_at: self.started_at,
            updated_at: self.updated_at,
        }
    }
}

/// Persisted and returned record of an item. Carries no image bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReport {
    pub run_id: String,
    pub name: String,
    pub stage: ItemStage,
    pub status: ItemStatus,
    pub attributes: Option<AttributeSet>,
    pub candidate: Option<SettingsCandidate>,
    pub decision: Option<ConsensusDecision>,
    pub transcript: Option<DebateTranscript>,
    /// Final loop state per slot that was started.
    pub slots: BTreeMap<ImageSlot, LoopState>,
    /// All attempts in slot order.
    pub attempts: Vec<GenerationAttempt>,
    pub listing_id: Option<String>,
    #[serde(default)]
    pub sample_recorded: bool,
    pub error: Option<String>,
    pub steps: Vec<StepEvent>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_id_is_file_stem() {
        let upload = Upload::new("uploads/ART-1042.jpg", Vec::new());
        assert_eq!(upload.fallback_id(), "ART-1042");
        assert_eq!(Upload::new("plain", Vec::new()).fallback_id(), "plain");
    }

    #[test]
    fn test_new_run_is_running() {
        let run = ItemRun::new(Upload::new("a.png", Vec::new()));
        assert_eq!(run.status(), ItemStatus::Running { stage: ItemStage::New });
        assert!(run.accepted_images().is_empty());
        assert!(run.default_draft().is_none());
    }

    #[test]
    fn test_stage_serde_shape() {
        let json = serde_json::to_value(ItemStage::Generating(ImageSlot::Side)).unwrap();
        assert_eq!(json["stage"], "generating");
        assert_eq!(json["slot"], "side");
        assert_eq!(ItemStage::Generating(ImageSlot::Back).to_string(), "generating(back)");
    }

    #[test]
    fn test_failed_status_names_last_stage() {
        let mut run = ItemRun::new(Upload::new("a.png", Vec::new()));
        run.enter(ItemStage::Predicting, "predicting settings");
        run.error = Some("no trained settings model is loaded".into());
        run.enter(ItemStage::Failed, "failed");
        assert_eq!(
            run.status(),
            ItemStatus::Failed {
                stage: "predicting".into(),
                error: "no trained settings model is loaded".into()
            }
        );
        assert!(run.status().is_terminal());
    }
}
