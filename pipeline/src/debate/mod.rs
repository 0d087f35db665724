//! Debate orchestration: performance advocate vs brand advocate, settled by a
//! moderator.
//!
//! # Debate Flow
//!
//! ```text
//! Idle → PerformanceTurn → BrandTurn → ModeratorTurn → Decided
//!             │                │              │
//!             └────────────────┴──────────────┴──▶ Failed
//!                 (role call failed / response unusable)
//! ```
//!
//! Rounds are strictly ordered and run once. There is no retry and no
//! partial consensus: any failure fails the whole debate.

pub mod consensus;
pub mod orchestrator;
pub mod roles;
pub mod state;

use thiserror::Error;

use crate::taxonomy::{SettingsAxis, ValidationError};

pub use consensus::{
    parse_brand_proposal, parse_moderator_decision, strip_code_fences, BrandProposal,
    ConsensusDecision, Provenance,
};
pub use orchestrator::{DebateConfig, DebateOrchestrator, DebateOutcome, DebateTranscript, TranscriptEntry};
pub use roles::{AdvocateSide, DebateRole, RoleCallError, RoleInvoker, RoleRequest};
pub use state::{DebatePhase, DebateSession, DebateTransition, TransitionError};

/// Error from a debate.
#[derive(Debug, Error)]
pub enum DebateError {
    #[error("{role} call failed: {source}")]
    RoleFailed {
        role: DebateRole,
        #[source]
        source: RoleCallError,
    },
    #[error("{role} returned an unparseable response: {reason}")]
    Unparseable { role: DebateRole, reason: String },
    #[error("{role} proposed an invalid setting: {source}")]
    InvalidSetting {
        role: DebateRole,
        #[source]
        source: ValidationError,
    },
    #[error("moderator chose '{value}' for {axis}, which neither advocate argued for")]
    InventedValue { axis: SettingsAxis, value: String },
    #[error("debate cancelled during {role} turn")]
    Cancelled { role: DebateRole },
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl DebateError {
    /// Role whose turn failed, if attributable.
    pub fn role(&self) -> Option<DebateRole> {
        match self {
            Self::RoleFailed { role, .. }
            | Self::Unparseable { role, .. }
            | Self::InvalidSetting { role, .. }
            | Self::Cancelled { role } => Some(*role),
            Self::InventedValue { .. } => Some(DebateRole::Moderator),
            Self::Transition(_) => None,
        }
    }
}
