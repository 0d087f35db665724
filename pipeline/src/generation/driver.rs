//! The bounded-retry generate → crop → validate loop for one image slot.
//!
//! The loop runs until it rests in `accepted`, `awaiting_feedback` or
//! `exhausted` and then hands control back. Guidance and abandonment are
//! supplied through methods; the whole loop is serializable so a caller can
//! persist it while waiting for a human.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::attempt::{AttemptOutcome, AttemptRequest, GenerationAttempt};
use super::crop::crop_to_portrait;
use super::state::{IllegalTransition, ImageSlot, LoopState, TransitionRecord};
use crate::cancel::{or_cancelled, pace};
use crate::collaborators::{
    Image, ImageGenerator, ImageValidator, ReferenceImages, ValidationRequest, Verdict,
};
use crate::debate::ConsensusDecision;
use crate::scenario::{GenerationDirectives, ScenarioBuilder};
use crate::taxonomy::AttributeSet;

/// Default attempts per budget cycle.
pub const DEFAULT_ATTEMPT_BUDGET: u32 = 2;

/// Collaborators and inputs shared by every step of a loop.
#[derive(Clone, Copy)]
pub struct LoopContext<'a> {
    pub scenario: &'a dyn ScenarioBuilder,
    pub generator: &'a dyn ImageGenerator,
    pub validator: &'a dyn ImageValidator,
    pub decision: &'a ConsensusDecision,
    pub attributes: &'a AttributeSet,
    pub references: &'a ReferenceImages,
    /// Delay before every external call.
    pub pacing: Duration,
    pub cancel: &'a CancellationToken,
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("{slot} loop cancelled at attempt {attempt}")]
    Cancelled { slot: ImageSlot, attempt: u32 },
    #[error(transparent)]
    Illegal(#[from] IllegalTransition),
}

/// Result of a refinement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum RefineOutcome {
    /// The edited image was validated and replaced the accepted image.
    Applied,
    /// The edit failed or was rejected; the previous image is kept.
    Failed { reason: String },
}

/// Instruction sent with a refinement edit.
pub fn refine_instruction(guidance: &str) -> String {
    format!(
        "Edit this fashion product photograph: {}. Keep everything else exactly the same: \
same person, same garment, same setting, same lighting. The garment must remain exactly \
as shown. Return a photorealistic image only.",
        guidance.trim()
    )
}

/// One slot's generation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationLoop {
    slot: ImageSlot,
    state: LoopState,
    budget: u32,
    remaining: u32,
    cycle: u32,
    guidance: Option<String>,
    directives: Option<GenerationDirectives>,
    candidate: Option<Image>,
    accepted: Option<Image>,
    attempts: Vec<GenerationAttempt>,
    transitions: Vec<TransitionRecord>,
}

impl GenerationLoop {
    pub fn new(slot: ImageSlot, budget: u32) -> Self {
        let budget = budget.max(1);
        Self {
            slot,
            state: LoopState::Drafting,
            budget,
            remaining: budget,
            cycle: 1,
            guidance: None,
            directives: None,
            candidate: None,
            accepted: None,
            attempts: Vec::new(),
            transitions: Vec::new(),
        }
    }

    pub fn slot(&self) -> ImageSlot {
        self.slot
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn budget(&self) -> u32 {
        self.budget
    }

    /// Attempts left in the current cycle.
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn guidance(&self) -> Option<&str> {
        self.guidance.as_deref()
    }

    pub fn attempts(&self) -> &[GenerationAttempt] {
        &self.attempts
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn accepted_image(&self) -> Option<&Image> {
        self.accepted.as_ref()
    }

    fn advance(&mut self, to: LoopState, reason: &str) -> Result<(), LoopError> {
        if !self.state.valid_transitions().contains(&to) {
            return Err(IllegalTransition {
                slot: self.slot,
                from: self.state,
                to,
            }
            .into());
        }
        debug!(slot = %self.slot, from = %self.state, to = %to, reason, "Loop transition");
        self.transitions.push(TransitionRecord {
            from: self.state,
            to,
            attempt: self.attempts.len() as u32,
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
        self.state = to;
        Ok(())
    }

    fn cancelled(&self) -> LoopError {
        LoopError::Cancelled {
            slot: self.slot,
            attempt: self.attempts.len() as u32 + 1,
        }
    }

    fn record(&mut self, request: AttemptRequest, outcome: AttemptOutcome) {
        self.attempts.push(GenerationAttempt {
            number: self.attempts.len() as u32 + 1,
            cycle: self.cycle,
            slot: self.slot,
            request,
            outcome,
            guidance: self.guidance.clone(),
            finished_at: Utc::now(),
        });
    }

    fn current_directives(&mut self, ctx: &LoopContext<'_>) -> GenerationDirectives {
        if let Some(directives) = &self.directives {
            return directives.clone();
        }
        let directives = ctx
            .scenario
            .build(ctx.decision, ctx.attributes, self.guidance.as_deref())
            .with_viewpoint(self.slot);
        self.directives = Some(directives.clone());
        directives
    }

    /// Drive the loop until it rests. Returns the resting state.
    pub async fn run(&mut self, ctx: &LoopContext<'_>) -> Result<LoopState, LoopError> {
        loop {
            match self.state {
                LoopState::Drafting => {
                    self.directives = None;
                    self.current_directives(ctx);
                    self.advance(LoopState::Attempting, "directives rendered")?;
                }
                LoopState::Attempting => self.attempt(ctx).await?,
                LoopState::Validating => self.validate(ctx).await?,
                resting => return Ok(resting),
            }
        }
    }

    async fn attempt(&mut self, ctx: &LoopContext<'_>) -> Result<(), LoopError> {
        if self.remaining == 0 {
            return self.advance(LoopState::AwaitingFeedback, "attempt budget exhausted");
        }
        let directives = self.current_directives(ctx);
        let number = self.attempts.len() as u32 + 1;

        if !pace(ctx.cancel, ctx.pacing).await {
            return Err(self.cancelled());
        }
        info!(slot = %self.slot, attempt = number, remaining = self.remaining, "Generating image");
        let generated = or_cancelled(ctx.cancel, ctx.generator.generate(&directives, ctx.references))
            .await
            .ok_or_else(|| self.cancelled())?;
        self.remaining -= 1;

        match generated.and_then(|image| crop_to_portrait(&image)) {
            Ok(image) => {
                self.candidate = Some(image);
                self.advance(LoopState::Validating, "image generated")
            }
            Err(failure) => {
                warn!(slot = %self.slot, attempt = number, error = %failure, "Generation failed");
                self.record(
                    AttemptRequest::Generate { directives },
                    AttemptOutcome::GenerationFailed {
                        reason: failure.to_string(),
                    },
                );
                self.after_failure("generation failed")
            }
        }
    }

    async fn validate(&mut self, ctx: &LoopContext<'_>) -> Result<(), LoopError> {
        let directives = self.current_directives(ctx);
        let request = AttemptRequest::Generate { directives };
        let Some(candidate) = self.candidate.clone() else {
            self.record(
                request,
                AttemptOutcome::GenerationFailed {
                    reason: "no candidate image to validate".into(),
                },
            );
            return self.after_failure("no candidate image");
        };

        match self.check(ctx, &candidate).await? {
            Ok(()) => {
                info!(slot = %self.slot, attempt = self.attempts.len() + 1, "Image approved");
                self.record(request, AttemptOutcome::Approved);
                self.candidate = None;
                self.accepted = Some(candidate);
                self.advance(LoopState::Accepted, "validator approved")
            }
            Err(reason) => {
                warn!(slot = %self.slot, attempt = self.attempts.len() + 1, %reason, "Image rejected");
                self.record(request, AttemptOutcome::Rejected { reason });
                self.candidate = None;
                self.after_failure("validator rejected")
            }
        }
    }

    /// Validate `candidate`; inner `Err` carries the rejection reason.
    async fn check(
        &self,
        ctx: &LoopContext<'_>,
        candidate: &Image,
    ) -> Result<Result<(), String>, LoopError> {
        if !pace(ctx.cancel, ctx.pacing).await {
            return Err(self.cancelled());
        }
        let request = ValidationRequest {
            slot: self.slot,
            attributes: ctx.attributes,
            references: ctx.references,
            candidate,
        };
        let verdict = or_cancelled(ctx.cancel, ctx.validator.validate(request))
            .await
            .ok_or_else(|| self.cancelled())?;
        Ok(match verdict {
            Ok(Verdict::Approved { .. }) => Ok(()),
            Ok(Verdict::Rejected { reason }) => Err(reason),
            Err(e) => Err(format!("validator error: {e}")),
        })
    }

    fn after_failure(&mut self, reason: &str) -> Result<(), LoopError> {
        if self.remaining > 0 {
            self.advance(LoopState::Attempting, &format!("{reason}; retrying"))
        } else {
            info!(slot = %self.slot, attempts = self.attempts.len(), "Attempt budget exhausted; awaiting feedback");
            self.advance(
                LoopState::AwaitingFeedback,
                &format!("{reason}; attempt budget exhausted"),
            )
        }
    }

    /// Resume from `awaiting_feedback` with human guidance. The budget is reset
    /// to its full value and the guidance is merged into the next directives.
    pub fn supply_guidance(&mut self, guidance: &str) -> Result<(), LoopError> {
        self.advance(LoopState::Drafting, "guidance supplied")?;
        let guidance = guidance.trim();
        self.guidance = (!guidance.is_empty()).then(|| guidance.to_string());
        self.remaining = self.budget;
        self.cycle += 1;
        self.directives = None;
        info!(slot = %self.slot, cycle = self.cycle, "Guidance supplied; budget reset");
        Ok(())
    }

    /// Give up on this slot from `awaiting_feedback`.
    pub fn abandon(&mut self) -> Result<(), LoopError> {
        self.advance(LoopState::Exhausted, "abandoned by user")?;
        info!(slot = %self.slot, attempts = self.attempts.len(), "Loop abandoned");
        Ok(())
    }

    /// Edit the accepted image once with `guidance`, then crop and validate.
    ///
    /// Success replaces the accepted image. Failure keeps the previous one.
    /// Either way the loop ends back in `accepted`. No budget applies.
    pub async fn refine(
        &mut self,
        guidance: &str,
        ctx: &LoopContext<'_>,
    ) -> Result<RefineOutcome, LoopError> {
        let Some(previous) = self.accepted.clone() else {
            return Err(IllegalTransition {
                slot: self.slot,
                from: self.state,
                to: LoopState::Attempting,
            }
            .into());
        };
        self.advance(LoopState::Attempting, "refinement requested")?;
        let instruction = refine_instruction(guidance);
        let request = AttemptRequest::Refine {
            instruction: instruction.clone(),
        };

        if !pace(ctx.cancel, ctx.pacing).await {
            self.advance(LoopState::Accepted, "refinement cancelled")?;
            return Err(self.cancelled());
        }
        let edited = match or_cancelled(ctx.cancel, ctx.generator.edit(&previous, &instruction, ctx.references)).await {
            Some(edited) => edited,
            None => {
                self.advance(LoopState::Accepted, "refinement cancelled")?;
                return Err(self.cancelled());
            }
        };

        let candidate = match edited.and_then(|image| crop_to_portrait(&image)) {
            Ok(image) => image,
            Err(failure) => {
                let reason = failure.to_string();
                warn!(slot = %self.slot, error = %reason, "Refinement edit failed; keeping previous image");
                self.record(request, AttemptOutcome::GenerationFailed { reason: reason.clone() });
                self.advance(LoopState::Accepted, "refinement failed; previous image kept")?;
                return Ok(RefineOutcome::Failed { reason });
            }
        };

        self.advance(LoopState::Validating, "refined image generated")?;
        let checked = match self.check(ctx, &candidate).await {
            Ok(checked) => checked,
            Err(e) => {
                self.advance(LoopState::Accepted, "refinement cancelled")?;
                return Err(e);
            }
        };
        match checked {
            Ok(()) => {
                self.record(request, AttemptOutcome::Approved);
                self.accepted = Some(candidate);
                self.advance(LoopState::Accepted, "refinement approved")?;
                info!(slot = %self.slot, "Refinement applied");
                Ok(RefineOutcome::Applied)
            }
            Err(reason) => {
                warn!(slot = %self.slot, %reason, "Refinement rejected; keeping previous image");
                self.record(request, AttemptOutcome::Rejected { reason: reason.clone() });
                self.advance(LoopState::Accepted, "refinement rejected; previous image kept")?;
                Ok(RefineOutcome::Failed { reason })
            }
        }
    }
}
