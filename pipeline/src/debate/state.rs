//! Debate state machine: phases, transitions and session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::roles::{AdvocateSide, DebateRole};

/// Phase of a debate session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebatePhase {
    /// Session created but not started.
    Idle,
    /// Performance advocate is arguing for the predicted settings.
    PerformanceTurn,
    /// Brand advocate is proposing alternatives.
    BrandTurn,
    /// Moderator is merging both positions.
    ModeratorTurn,
    /// A consensus decision was produced.
    Decided,
    /// A role call failed or returned an unusable response.
    Failed,
}

impl DebatePhase {
    /// Whether this is a terminal phase.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Decided | Self::Failed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [DebatePhase] {
        match self {
            Self::Idle => &[Self::PerformanceTurn],
            Self::PerformanceTurn => &[Self::BrandTurn, Self::Failed],
            Self::BrandTurn => &[Self::ModeratorTurn, Self::Failed],
            Self::ModeratorTurn => &[Self::Decided, Self::Failed],
            Self::Decided | Self::Failed => &[],
        }
    }

    /// Phase in which `role` speaks.
    pub fn turn_of(role: DebateRole) -> Self {
        match role {
            DebateRole::Advocate(AdvocateSide::Performance) => Self::PerformanceTurn,
            DebateRole::Advocate(AdvocateSide::Brand) => Self::BrandTurn,
            DebateRole::Moderator => Self::ModeratorTurn,
        }
    }
}

impl std::fmt::Display for DebatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::PerformanceTurn => write!(f, "performance_turn"),
            Self::BrandTurn => write!(f, "brand_turn"),
            Self::ModeratorTurn => write!(f, "moderator_turn"),
            Self::Decided => write!(f, "decided"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A phase transition record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTransition {
    pub from: DebatePhase,
    pub to: DebatePhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid debate transition {from} → {to}")]
pub struct TransitionError {
    pub from: DebatePhase,
    pub to: DebatePhase,
}

/// A debate session tracking phase and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateSession {
    pub id: String,
    pub phase: DebatePhase,
    pub transitions: Vec<DebateTransition>,
    pub created_at: DateTime<Utc>,
    /// Item the debate is about.
    pub item_id: String,
}

impl DebateSession {
    pub fn new(id: &str, item_id: &str) -> Self {
        Self {
            id: id.to_string(),
            phase: DebatePhase::Idle,
            transitions: Vec::new(),
            created_at: Utc::now(),
            item_id: item_id.to_string(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: DebatePhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }

        self.transitions.push(DebateTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Mark the session failed. No-op once terminal.
    pub fn fail(&mut self, reason: &str) {
        if !self.phase.is_terminal() {
            let _ = self.transition(DebatePhase::Failed, reason);
        }
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Compact status line.
    pub fn status_line(&self) -> String {
        format!(
            "[{}] {} transitions | item={}",
            self.phase,
            self.transitions.len(),
            self.item_id
        )
    }
}
