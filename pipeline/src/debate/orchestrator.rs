//! Debate orchestrator: drives the three ordered turns and produces the
//! transcript plus the consensus decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::consensus::{parse_brand_proposal, parse_moderator_decision, ConsensusDecision};
use super::roles::{brand_request, moderator_request, performance_request, DebateRole, RoleInvoker, RoleRequest};
use super::state::{DebatePhase, DebateSession};
use super::DebateError;
use crate::cancel::or_cancelled;
use crate::predictor::SettingsCandidate;
use crate::taxonomy::{AttributeSet, ImageSettings};

/// Default brand identity handed to the brand advocate.
pub const DEFAULT_BRAND_IDENTITY: &str = "A modern, minimalist e-commerce brand. Clean and confident.";

/// Configuration for the debate orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebateConfig {
    pub brand_identity: String,
}

impl Default for DebateConfig {
    fn default() -> Self {
        Self {
            brand_identity: DEFAULT_BRAND_IDENTITY.to_string(),
        }
    }
}

/// One role-tagged argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub role: DebateRole,
    pub content: String,
    /// Settings this turn argued for (performance, brand) or decided (moderator).
    pub settings: ImageSettings,
    pub recorded_at: DateTime<Utc>,
}

/// Immutable record of a finished debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateTranscript {
    pub entries: Vec<TranscriptEntry>,
    pub decision: ConsensusDecision,
}

impl DebateTranscript {
    pub fn entry(&self, role: DebateRole) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| e.role == role)
    }
}

/// Outcome of a completed debate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateOutcome {
    pub transcript: DebateTranscript,
    /// Session snapshot at completion.
    pub session: DebateSession,
}

impl DebateOutcome {
    pub fn decision(&self) -> &ConsensusDecision {
        &self.transcript.decision
    }

    /// Compact summary line.
    pub fn summary_line(&self) -> String {
        let decision = self.decision();
        format!(
            "[{}] {} | {} axes from brand | item={}",
            decision.provenance,
            decision.settings,
            decision
                .sources
                .values()
                .filter(|s| **s == super::AdvocateSide::Brand)
                .count(),
            self.session.item_id
        )
    }
}

/// Runs debates through a [`RoleInvoker`].
#[derive(Clone)]
pub struct DebateOrchestrator {
    invoker: Arc<dyn RoleInvoker>,
    config: DebateConfig,
}

impl DebateOrchestrator {
    pub fn new(invoker: Arc<dyn RoleInvoker>, config: DebateConfig) -> Self {
        Self { invoker, config }
    }

    pub fn config(&self) -> &DebateConfig {
        &self.config
    }

    /// Run one debate over a prediction.
    pub async fn run(
        &self,
        candidate: &SettingsCandidate,
        attributes: &AttributeSet,
        cancel: &CancellationToken,
    ) -> Result<DebateOutcome, DebateError> {
        let mut session = DebateSession::new(&Uuid::new_v4().to_string(), &attributes.identifier);

        match self.run_turns(&mut session, candidate, attributes, cancel).await {
            Ok(transcript) => {
                session.transition(DebatePhase::Decided, "moderator decided")?;
                info!(
                    item = %attributes.identifier,
                    provenance = %transcript.decision.provenance,
                    settings = %transcript.decision.settings,
                    "Debate decided"
                );
                Ok(DebateOutcome { transcript, session })
            }
            Err(e) => {
                session.fail(&e.to_string());
                warn!(item = %attributes.identifier, phase = %session.phase, error = %e, "Debate failed");
                Err(e)
            }
        }
    }

    async fn run_turns(
        &self,
        session: &mut DebateSession,
        candidate: &SettingsCandidate,
        attributes: &AttributeSet,
        cancel: &CancellationToken,
    ) -> Result<DebateTranscript, DebateError> {
        let mut entries = Vec::with_capacity(3);

        let role = DebateRole::PERFORMANCE;
        session.transition(DebatePhase::turn_of(role), "debate started")?;
        let performance_argument = self.call(role, &performance_request(candidate), cancel).await?;
        let performance_argument = performance_argument.trim().to_string();
        if performance_argument.is_empty() {
            return Err(DebateError::Unparseable {
                role,
                reason: "empty argument".into(),
            });
        }
        entries.push(TranscriptEntry {
            role,
            content: performance_argument.clone(),
            settings: candidate.settings,
            recorded_at: Utc::now(),
        });

        let role = DebateRole::BRAND;
        session.transition(DebatePhase::turn_of(role), "performance advocate argued")?;
        let raw = self
            .call(role, &brand_request(candidate, attributes, &self.config.brand_identity), cancel)
            .await?;
        let proposal = parse_brand_proposal(&raw, &candidate.settings)?;
        debug!(
            changed = ?proposal.settings.differing_axes(&candidate.settings),
            "Brand advocate proposal parsed"
        );
        entries.push(TranscriptEntry {
            role,
            content: proposal.argument.clone(),
            settings: proposal.settings,
            recorded_at: Utc::now(),
        });

        let role = DebateRole::Moderator;
        session.transition(DebatePhase::turn_of(role), "brand advocate argued")?;
        let request = moderator_request(
            candidate,
            attributes,
            &performance_argument,
            &proposal.argument,
            &proposal.settings,
        );
        let raw = self.call(role, &request, cancel).await?;
        let decision = parse_moderator_decision(&raw, &candidate.settings, &proposal.settings)?;
        entries.push(TranscriptEntry {
            role,
            content: decision.reasoning.clone(),
            settings: decision.settings,
            recorded_at: Utc::now(),
        });

        Ok(DebateTranscript { entries, decision })
    }

    async fn call(
        &self,
        role: DebateRole,
        request: &RoleRequest,
        cancel: &CancellationToken,
    ) -> Result<String, DebateError> {
        debug!(%role, "Invoking debate role");
        match or_cancelled(cancel, self.invoker.invoke(role, request)).await {
            None => Err(DebateError::Cancelled { role }),
            Some(Err(source)) => Err(DebateError::RoleFailed { role, source }),
            Some(Ok(text)) => Ok(text),
        }
    }
}
