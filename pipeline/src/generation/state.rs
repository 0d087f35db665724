//! Generation loop states, legal transitions and transition records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which image of a listing a loop produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSlot {
    Main,
    Side,
    Back,
}

impl ImageSlot {
    /// Slots in listing order.
    pub const ALL: [ImageSlot; 3] = [Self::Main, Self::Side, Self::Back];
    /// Auxiliary viewpoints generated after the main image is accepted.
    pub const VARIANTS: [ImageSlot; 2] = [Self::Side, Self::Back];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Side => "side",
            Self::Back => "back",
        }
    }

    pub fn is_variant(self) -> bool {
        self != Self::Main
    }

    /// Slot processed after this one.
    pub fn next(self) -> Option<ImageSlot> {
        match self {
            Self::Main => Some(Self::Side),
            Self::Side => Some(Self::Back),
            Self::Back => None,
        }
    }
}

impl std::fmt::Display for ImageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one slot's generate → validate loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    /// Rendering directives from the decision (plus any guidance).
    Drafting,
    /// Calling the image generator.
    Attempting,
    /// Budget spent; waiting for guidance or abandonment.
    AwaitingFeedback,
    /// Calling the validator on a candidate.
    Validating,
    /// A validated image is held.
    Accepted,
    /// Abandoned by the user.
    Exhausted,
}

impl LoopState {
    /// States in which the loop hands control back to its caller.
    pub fn is_resting(self) -> bool {
        matches!(self, Self::Accepted | Self::AwaitingFeedback | Self::Exhausted)
    }

    /// States with no further automatic progress.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Accepted | Self::Exhausted)
    }

    /// Valid transitions from this state.
    pub fn valid_transitions(self) -> &'static [LoopState] {
        match self {
            Self::Drafting => &[Self::Attempting],
            // Attempting → Attempting: generation failed, budget remains.
            // Attempting → Accepted: a refinement edit failed, previous image kept.
            Self::Attempting => &[
                Self::Attempting,
                Self::Validating,
                Self::AwaitingFeedback,
                Self::Accepted,
            ],
            Self::Validating => &[Self::Accepted, Self::Attempting, Self::AwaitingFeedback],
            Self::AwaitingFeedback => &[Self::Drafting, Self::Exhausted],
            Self::Accepted => &[Self::Attempting],
            Self::Exhausted => &[],
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Drafting => write!(f, "drafting"),
            Self::Attempting => write!(f, "attempting"),
            Self::AwaitingFeedback => write!(f, "awaiting_feedback"),
            Self::Validating => write!(f, "validating"),
            Self::Accepted => write!(f, "accepted"),
            Self::Exhausted => write!(f, "exhausted"),
        }
    }
}

/// A state transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LoopState,
    pub to: LoopState,
    /// Attempts completed when the transition happened.
    pub attempt: u32,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Error for a transition not in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub slot: ImageSlot,
    pub from: LoopState,
    pub to: LoopState,
}

impl std::fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "illegal {} loop transition {} → {}",
            self.slot, self.from, self.to
        )
    }
}

impl std::error::Error for IllegalTransition {}
