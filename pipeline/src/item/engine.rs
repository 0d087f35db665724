//! The engine that drives items through every stage.
//!
//! Items are processed strictly one at a time. [`Engine::advance`] drives a
//! run until it suspends or finishes; [`Engine::handle`] applies a human
//! event to a suspended run and drives it on.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::audit::AuditStore;
use super::{ItemEvent, ItemReport, ItemRun, ItemStage, ItemStatus, Upload};
use crate::cancel::or_cancelled;
use crate::collaborators::{
    AttributeExtractor, Image, ImageGenerator, ImageValidator, Publisher, ReferenceImages,
};
use crate::config::PipelineConfig;
use crate::debate::{ConsensusDecision, DebateOrchestrator, RoleInvoker};
use crate::error::{PipelineError, PipelineResult};
use crate::feedback::{Corpus, FeedbackRecorder, MeasuredOutcome};
use crate::generation::{GenerationLoop, ImageSlot, LoopContext, LoopError, LoopState, RefineOutcome};
use crate::listing::ListingDraft;
use crate::predictor::{ModelSlot, RetrainReport};
use crate::scenario::ScenarioBuilder;
use crate::taxonomy::AttributeSet;
use crate::variants::VariantGenerator;

/// External collaborators the engine calls.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn AttributeExtractor>,
    pub scenario: Arc<dyn ScenarioBuilder>,
    pub generator: Arc<dyn ImageGenerator>,
    pub validator: Arc<dyn ImageValidator>,
    pub publisher: Arc<dyn Publisher>,
    pub roles: Arc<dyn RoleInvoker>,
}

/// Decides the human events for unattended batch processing.
#[async_trait]
pub trait ReviewPolicy: Send + Sync {
    /// `slot` spent its budget. Expected: guidance, abandon or skip.
    async fn on_feedback(&self, run: &ItemRun, slot: ImageSlot) -> ItemEvent;

    /// Images are ready. Expected: publish, refine or skip.
    async fn on_review(&self, run: &ItemRun) -> ItemEvent;
}

/// Abandons exhausted slots and publishes the default copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoPublish;

#[async_trait]
impl ReviewPolicy for AutoPublish {
    async fn on_feedback(&self, _run: &ItemRun, _slot: ImageSlot) -> ItemEvent {
        ItemEvent::Abandon
    }

    async fn on_review(&self, run: &ItemRun) -> ItemEvent {
        match run.default_draft() {
            Some(draft) => ItemEvent::Publish {
                draft,
                measured: None,
            },
            None => ItemEvent::Skip,
        }
    }
}

pub struct Engine {
    services: Services,
    models: ModelSlot,
    debate: DebateOrchestrator,
    recorder: FeedbackRecorder,
    variants: VariantGenerator,
    config: PipelineConfig,
    audit: Option<AuditStore>,
}

impl Engine {
    pub fn new(
        services: Services,
        models: ModelSlot,
        corpus: Arc<Corpus>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            debate: DebateOrchestrator::new(services.roles.clone(), config.debate.clone()),
            recorder: FeedbackRecorder::new(corpus, config.noise),
            variants: VariantGenerator::new(config.variant_attempt_budget),
            services,
            models,
            config,
            audit: None,
        }
    }

    /// Persist every item report under `audit`.
    pub fn with_audit(mut self, audit: AuditStore) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn models(&self) -> &ModelSlot {
        &self.models
    }

    pub fn recorder(&self) -> &FeedbackRecorder {
        &self.recorder
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Retrain the predictor on the full corpus.
    pub async fn retrain(&self) -> PipelineResult<RetrainReport> {
        Ok(self
            .models
            .retrain(self.recorder.corpus(), &self.config.retrain)
            .await?)
    }

    pub fn start(&self, upload: Upload) -> ItemRun {
        let mut run = ItemRun::new(upload);
        run.log("queued");
        run
    }

    /// Drive `run` until it suspends or reaches a terminal stage.
    ///
    /// Stage failures end the item as `failed`, cancellation as `skipped`;
    /// both are reported through the returned status. `Err` means the item
    /// report could not be written.
    pub async fn advance(
        &self,
        run: &mut ItemRun,
        cancel: &CancellationToken,
    ) -> PipelineResult<ItemStatus> {
        if let Err(e) = self.drive(run, cancel).await {
            self.settle(run, e);
        }
        self.persist(run)?;
        Ok(run.status())
    }

    /// Apply a human event to a suspended run.
    ///
    /// A publish failure leaves the item in review and is returned as `Err`
    /// after the report is written. A corpus failure after publication leaves
    /// the item published with its sample owed; a repeated `Publish` then
    /// records the sample without publishing again. Events that do not fit the current
    /// status are rejected without touching the run.
    pub async fn handle(
        &self,
        run: &mut ItemRun,
        event: ItemEvent,
        cancel: &CancellationToken,
    ) -> PipelineResult<ItemStatus> {
        let status = run.status();
        let result = match (event, &status) {
            (ItemEvent::Skip, current) if !current.is_terminal() => {
                run.enter(ItemStage::Skipped, "skipped by user");
                Ok(())
            }
            (ItemEvent::Guidance(text), ItemStatus::AwaitingFeedback { slot }) => {
                self.resume(run, *slot, Some(&text), cancel).await
            }
            (ItemEvent::Abandon, ItemStatus::AwaitingFeedback { slot }) => {
                self.resume(run, *slot, None, cancel).await
            }
            (ItemEvent::Refine(text), ItemStatus::Review) => self.refine(run, &text, cancel).await,
            (ItemEvent::Publish { draft, measured }, ItemStatus::Review) => {
                self.publish(run, &draft, measured, cancel).await
            }
            (ItemEvent::Publish { measured, .. }, ItemStatus::Published { .. }) if run.awaiting_sample() => {
                self.record_sample(run, measured).await
            }
            (event, current) => return Err(PipelineError::invalid_event(event.name(), current)),
        };

        match result {
            Ok(()) => {}
            Err(e @ (PipelineError::Publish(_) | PipelineError::Corpus(_))) => {
                warn!(item = %run.name, stage = %run.stage, error = %e, "Item event failed");
                run.error = Some(e.to_string());
                run.log(format!("{} failed: {e}", e.stage()));
                self.persist(run)?;
                return Err(e);
            }
            Err(e) => self.settle(run, e),
        }
        self.persist(run)?;
        Ok(run.status())
    }

    /// Run one upload to completion, asking `policy` at every suspension.
    pub async fn process(
        &self,
        upload: Upload,
        policy: &dyn ReviewPolicy,
        cancel: &CancellationToken,
    ) -> PipelineResult<ItemReport> {
        let mut run = self.start(upload);
        let mut status = self.advance(&mut run, cancel).await?;
        loop {
            let event = match &status {
                ItemStatus::AwaitingFeedback { slot } => policy.on_feedback(&run, *slot).await,
                ItemStatus::Review => policy.on_review(&run).await,
                _ => break,
            };
            status = match self.handle(&mut run, event, cancel).await {
                Ok(status) => status,
                // Left in review; no requeue.
                Err(PipelineError::Publish(_)) => break,
                Err(e) => return Err(e),
            };
        }
        info!(item = %run.name, status = %status, "Item finished");
        Ok(run.report())
    }

    /// Process uploads one at a time. Stops starting new items once `cancel`
    /// fires.
    pub async fn run_batch(
        &self,
        uploads: impl IntoIterator<Item = Upload>,
        policy: &dyn ReviewPolicy,
        cancel: &CancellationToken,
    ) -> Vec<PipelineResult<ItemReport>> {
        let mut results = Vec::new();
        for upload in uploads {
            if cancel.is_cancelled() {
                warn!(upload = %upload.name, "Batch cancelled; remaining uploads not started");
                break;
            }
            let name = upload.name.clone();
            let result = self.process(upload, policy, cancel).await;
            if let Err(e) = &result {
                warn!(upload = %name, error = %e, "Item processing error");
            }
            results.push(result);
        }
        results
    }

    async fn drive(&self, run: &mut ItemRun, cancel: &CancellationToken) -> PipelineResult<()> {
        loop {
            if cancel.is_cancelled() && !run.stage.is_terminal() && run.stage != ItemStage::Review {
                return Err(PipelineError::Cancelled {
                    stage: run.stage.to_string(),
                });
            }
            match run.stage {
                ItemStage::New => run.enter(ItemStage::Extracting, "extracting attributes"),
                ItemStage::Extracting => {
                    let attributes = self.extract(run, cancel).await?;
                    let label = attributes.label();
                    run.attributes = Some(attributes);
                    run.enter(ItemStage::Predicting, format!("extracted {label}"));
                }
                ItemStage::Predicting => {
                    let Some(attributes) = run.attributes.clone() else {
                        run.enter(ItemStage::Extracting, "attributes missing; extracting again");
                        continue;
                    };
                    let candidate = self.models.predict(&attributes).await?;
                    let line = format!(
                        "predicted {} (score {:.4}, confidence {:.2}, model {})",
                        candidate.settings,
                        candidate.predicted_score,
                        candidate.confidence,
                        candidate.model_version
                    );
                    run.candidate = Some(candidate);
                    run.enter(ItemStage::Debating, line);
                }
                ItemStage::Debating => {
                    let (Some(attributes), Some(candidate)) =
                        (run.attributes.clone(), run.candidate.clone())
                    else {
                        run.enter(ItemStage::Predicting, "prediction missing; predicting again");
                        continue;
                    };
                    let outcome = self.debate.run(&candidate, &attributes, cancel).await?;
                    let line = outcome.summary_line();
                    run.debate = Some(outcome);
                    run.enter(ItemStage::Generating(ImageSlot::Main), line);
                }
                ItemStage::Generating(slot) => {
                    let (Some(attributes), Some(decision)) =
                        (run.attributes.clone(), run.decision().cloned())
                    else {
                        run.enter(ItemStage::Debating, "decision missing; debating again");
                        continue;
                    };
                    let state = self
                        .generate(slot, &mut run.loops, &run.references, &attributes, &decision, cancel)
                        .await?;
                    match state {
                        LoopState::Accepted => {
                            let next = self.after(slot);
                            run.enter(next, format!("{slot} image accepted"));
                        }
                        LoopState::Exhausted if slot == ImageSlot::Main => {
                            run.enter(ItemStage::Exhausted, "main image abandoned");
                        }
                        LoopState::Exhausted => {
                            let next = self.after(slot);
                            run.enter(next, format!("{slot} image abandoned; continuing"));
                        }
                        _ => {
                            run.log(format!("{slot} image awaiting feedback"));
                            return Ok(());
                        }
                    }
                }
                ItemStage::Review
                | ItemStage::Published
                | ItemStage::Skipped
                | ItemStage::Exhausted
                | ItemStage::Failed => return Ok(()),
            }
        }
    }

    /// Stage after `slot` is done.
    fn after(&self, slot: ImageSlot) -> ItemStage {
        match slot.next() {
            Some(next) if self.config.generate_variants => ItemStage::Generating(next),
            _ => ItemStage::Review,
        }
    }

    async fn extract(&self, run: &ItemRun, cancel: &CancellationToken) -> PipelineResult<AttributeSet> {
        let raw = or_cancelled(cancel, self.services.extractor.extract(&run.references.product))
            .await
            .ok_or_else(|| PipelineError::Cancelled {
                stage: ItemStage::Extracting.to_string(),
            })?
            .map_err(PipelineError::Extraction)?;
        Ok(raw.normalize(&run.fallback_id)?)
    }

    fn context<'a>(
        &'a self,
        references: &'a ReferenceImages,
        attributes: &'a AttributeSet,
        decision: &'a ConsensusDecision,
        cancel: &'a CancellationToken,
    ) -> LoopContext<'a> {
        LoopContext {
            scenario: self.services.scenario.as_ref(),
            generator: self.services.generator.as_ref(),
            validator: self.services.validator.as_ref(),
            decision,
            attributes,
            references,
            pacing: self.config.call_spacing(),
            cancel,
        }
    }

    async fn generate(
        &self,
        slot: ImageSlot,
        loops: &mut BTreeMap<ImageSlot, GenerationLoop>,
        references: &ReferenceImages,
        attributes: &AttributeSet,
        decision: &ConsensusDecision,
        cancel: &CancellationToken,
    ) -> PipelineResult<LoopState> {
        let ctx = self.context(references, attributes, decision, cancel);
        let main = loops
            .get(&ImageSlot::Main)
            .and_then(GenerationLoop::accepted_image)
            .cloned();
        let lp = loops.entry(slot).or_insert_with(|| {
            self.variants
                .start(slot)
                .unwrap_or_else(|| GenerationLoop::new(slot, self.config.attempt_budget))
        });

        let result = match main.filter(|_| slot.is_variant()) {
            Some(main) => self.variants.run(lp, &main, &ctx).await,
            None => lp.run(&ctx).await,
        };
        result.map_err(|source| generation_error(lp, source))
    }

    async fn resume(
        &self,
        run: &mut ItemRun,
        slot: ImageSlot,
        guidance: Option<&str>,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let status = run.status();
        let Some(lp) = run.loops.get_mut(&slot) else {
            return Err(PipelineError::invalid_event("resume", status));
        };
        match guidance {
            Some(text) => {
                lp.supply_guidance(text)
                    .map_err(|source| generation_error(lp, source))?;
                run.log(format!("guidance for {slot} image: {}", text.trim()));
            }
            None => {
                lp.abandon().map_err(|source| generation_error(lp, source))?;
                run.log(format!("{slot} image abandoned by user"));
            }
        }
        self.drive(run, cancel).await
    }

    async fn refine(&self, run: &mut ItemRun, guidance: &str, cancel: &CancellationToken) -> PipelineResult<()> {
        let status = run.status();
        let (Some(attributes), Some(decision)) = (run.attributes.clone(), run.decision().cloned()) else {
            return Err(PipelineError::invalid_event("refine", status));
        };
        let Some(main) = run.loops.get_mut(&ImageSlot::Main) else {
            return Err(PipelineError::invalid_event("refine", status));
        };

        let outcome = {
            let ctx = self.context(&run.references, &attributes, &decision, cancel);
            main.refine(guidance, &ctx)
                .await
                .map_err(|source| generation_error(main, source))?
        };

        match outcome {
            RefineOutcome::Applied if self.config.generate_variants => {
                for slot in ImageSlot::VARIANTS {
                    run.loops.remove(&slot);
                }
                run.enter(
                    ItemStage::Generating(ImageSlot::Side),
                    format!("main image refined ({}); regenerating variants", guidance.trim()),
                );
                self.drive(run, cancel).await
            }
            RefineOutcome::Applied => {
                run.log(format!("main image refined ({})", guidance.trim()));
                Ok(())
            }
            RefineOutcome::Failed { reason } => {
                run.log(format!("refinement failed, previous image kept: {reason}"));
                Ok(())
            }
        }
    }

    async fn publish(
        &self,
        run: &mut ItemRun,
        draft: &ListingDraft,
        measured: Option<MeasuredOutcome>,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let images: Vec<Image> = run
            .accepted_images()
            .into_iter()
            .map(|(_, image)| image.clone())
            .collect();

        let listing_id = or_cancelled(cancel, self.services.publisher.publish(draft, &images))
            .await
            .ok_or_else(|| PipelineError::Cancelled {
                stage: "publishing".into(),
            })??;

        run.listing_id = Some(listing_id.clone());
        run.error = None;
        run.enter(
            ItemStage::Published,
            format!("published as {listing_id} with {} images", images.len()),
        );
        self.record_sample(run, measured).await
    }

    /// Append the item's one training sample. Marks the run only once the
    /// append succeeded.
    async fn record_sample(&self, run: &mut ItemRun, measured: Option<MeasuredOutcome>) -> PipelineResult<()> {
        let (Some(attributes), Some(decision), Some(candidate)) =
            (run.attributes.as_ref(), run.decision(), run.candidate.as_ref())
        else {
            warn!(item = %run.name, "Published item has no decision; no training sample");
            return Ok(());
        };
        let sample = self
            .recorder
            .record(attributes, decision, candidate.predicted_score, measured)
            .await?;
        run.sample_recorded = true;
        run.error = None;
        run.log(format!(
            "recorded training sample (score {:.4}, {} exposures)",
            sample.score, sample.exposures
        ));
        Ok(())
    }

    fn settle(&self, run: &mut ItemRun, error: PipelineError) {
        run.error = Some(error.to_string());
        if error.is_cancelled() {
            info!(item = %run.name, stage = %run.stage, "Item cancelled");
            run.enter(ItemStage::Skipped, format!("skipped: {error}"));
        } else {
            warn!(item = %run.name, stage = %run.stage, error = %error, "Item failed");
            run.enter(ItemStage::Failed, format!("failed: {error}"));
        }
    }

    fn persist(&self, run: &ItemRun) -> PipelineResult<()> {
        if let Some(audit) = &self.audit {
            audit.save(&run.report())?;
        }
        Ok(())
    }
}

fn generation_error(lp: &GenerationLoop, source: LoopError) -> PipelineError {
    PipelineError::Generation {
        slot: lp.slot(),
        attempt: lp.attempts().len() as u32 + 1,
        source,
    }
}
