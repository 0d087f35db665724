//! End-to-end item pipeline test with stub collaborators (no network).
//!
//! Covers: extraction ↔ prediction ↔ debate ↔ generation loops ↔ variants ↔
//! publish ↔ feedback corpus ↔ audit reports.

mod common;

use std::sync::Arc;

use pipeline::collaborators::PublishError;
use pipeline::{
    AuditStore, AutoPublish, Corpus, Engine, ImageSlot, ItemEvent, ItemStage, ItemStatus,
    ModelSlot, ModelStore, PipelineConfig, PipelineError, Provenance, Upload,
};
use tokio_util::sync::CancellationToken;

use common::{failure, png, trained_slot, RecordingPublisher, ScriptedGenerator, Stubs};

const SEED: usize = 60;

fn upload() -> Upload {
    Upload::new("ART-1042.jpg", vec![png(400, 500)])
}

async fn engine_with(dir: &std::path::Path, stubs: &Stubs) -> (Engine, Arc<Corpus>) {
    let (slot, corpus) = trained_slot(dir, SEED).await;
    let engine = Engine::new(stubs.services(), slot, corpus.clone(), PipelineConfig::default());
    (engine, corpus)
}

fn publish(run: &pipeline::ItemRun) -> ItemEvent {
    ItemEvent::Publish {
        draft: run.default_draft().unwrap(),
        measured: None,
    }
}

// ── Publication and the corpus ──────────────────────────────────────

#[tokio::test]
async fn test_published_item_adds_exactly_one_sample() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::default());
    let (engine, corpus) = engine_with(dir.path(), &stubs).await;
    let engine = engine.with_audit(AuditStore::new(dir.path().join("reports")));

    let report = engine
        .process(upload(), &AutoPublish, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.stage, ItemStage::Published);
    assert_eq!(
        report.status,
        ItemStatus::Published {
            listing_id: "gid://shop/Product/1".into()
        }
    );
    assert_eq!(report.attributes.as_ref().unwrap().identifier, "ART-1042");
    assert_eq!(report.decision.as_ref().unwrap().provenance, Provenance::Hybrid);
    assert_eq!(report.transcript.as_ref().unwrap().entries.len(), 3);
    assert_eq!(report.attempts.len(), 3);
    assert!(report.sample_recorded);
    assert_eq!(corpus.len().await.unwrap(), SEED + 1);

    let published = stubs.publisher.published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].1, 3, "main, side and back images");
    drop(published);

    let last = corpus.read_all().await.unwrap().pop().unwrap();
    assert_eq!(last.attributes.identifier, "ART-1042");
    assert_eq!(last.settings, report.decision.unwrap().settings);
    assert_eq!(last.provenance, Some(Provenance::Hybrid));

    let saved = AuditStore::new(dir.path().join("reports"))
        .load(&report.run_id)
        .unwrap()
        .unwrap();
    assert_eq!(saved.status, report.status);
}

#[tokio::test]
async fn test_skip_at_suspension_writes_no_sample() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::with(vec![failure(), failure()]));
    let (engine, corpus) = engine_with(dir.path(), &stubs).await;
    let cancel = CancellationToken::new();

    let mut run = engine.start(upload());
    let status = engine.advance(&mut run, &cancel).await.unwrap();
    assert_eq!(status, ItemStatus::AwaitingFeedback { slot: ImageSlot::Main });
    assert_eq!(stubs.generator.generate_calls(), 2);

    let status = engine.handle(&mut run, ItemEvent::Skip, &cancel).await.unwrap();
    assert_eq!(status, ItemStatus::Skipped);
    assert_eq!(corpus.len().await.unwrap(), SEED);

    let event = publish(&run);
    let err = engine.handle(&mut run, event, &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidEvent { .. }));
    assert!(stubs.publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_abandoned_main_image_exhausts_item() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::with(vec![failure(), failure()]));
    let (engine, corpus) = engine_with(dir.path(), &stubs).await;
    let cancel = CancellationToken::new();

    let mut run = engine.start(upload());
    engine.advance(&mut run, &cancel).await.unwrap();
    let status = engine.handle(&mut run, ItemEvent::Abandon, &cancel).await.unwrap();

    assert_eq!(status, ItemStatus::Exhausted);
    assert_eq!(stubs.generator.generate_calls(), 2);
    assert_eq!(corpus.len().await.unwrap(), SEED);
}

// ── Guidance and variants ───────────────────────────────────────────

#[tokio::test]
async fn test_guidance_resumes_with_full_budget() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::with(vec![failure(), failure(), failure()]));
    let (engine, _corpus) = engine_with(dir.path(), &stubs).await;
    let cancel = CancellationToken::new();

    let mut run = engine.start(upload());
    engine.advance(&mut run, &cancel).await.unwrap();
    let status = engine
        .handle(&mut run, ItemEvent::Guidance("hood up, no logo on the wall".into()), &cancel)
        .await
        .unwrap();

    // Third call fails, fourth (second of the new budget) succeeds.
    assert_eq!(status, ItemStatus::Review);
    let main = run.generation_loop(ImageSlot::Main).unwrap();
    assert_eq!(main.attempts().len(), 4);
    assert_eq!(main.cycle(), 2);
    assert!(stubs.generator.prompts.lock().unwrap()[3].contains("hood up, no logo on the wall"));
}

#[tokio::test]
async fn test_abandoned_variant_does_not_block_item() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::with(vec![
        Ok(png(160, 200)),
        failure(),
        failure(),
    ]));
    let (engine, corpus) = engine_with(dir.path(), &stubs).await;
    let cancel = CancellationToken::new();

    let mut run = engine.start(upload());
    let status = engine.advance(&mut run, &cancel).await.unwrap();
    assert_eq!(status, ItemStatus::AwaitingFeedback { slot: ImageSlot::Side });

    let status = engine.handle(&mut run, ItemEvent::Abandon, &cancel).await.unwrap();
    assert_eq!(status, ItemStatus::Review);
    assert_eq!(
        run.accepted_images().iter().map(|(slot, _)| *slot).collect::<Vec<_>>(),
        vec![ImageSlot::Main, ImageSlot::Back]
    );

    let event = publish(&run);
    let status = engine.handle(&mut run, event, &cancel).await.unwrap();
    assert!(matches!(status, ItemStatus::Published { .. }));
    assert_eq!(stubs.publisher.published.lock().unwrap()[0].1, 2);
    assert_eq!(corpus.len().await.unwrap(), SEED + 1);
}

#[tokio::test]
async fn test_refine_regenerates_variants_without_new_debate() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::default());
    let (engine, _corpus) = engine_with(dir.path(), &stubs).await;
    let cancel = CancellationToken::new();

    let mut run = engine.start(upload());
    assert_eq!(engine.advance(&mut run, &cancel).await.unwrap(), ItemStatus::Review);
    assert_eq!(stubs.generator.generate_calls(), 3);
    let decision = run.decision().cloned().unwrap();

    let status = engine
        .handle(&mut run, ItemEvent::Refine("warmer light".into()), &cancel)
        .await
        .unwrap();
    assert_eq!(status, ItemStatus::Review);
    assert_eq!(stubs.generator.edit_calls(), 1);
    assert_eq!(stubs.generator.generate_calls(), 5, "side and back regenerated");
    assert_eq!(stubs.roles.calls.lock().unwrap().len(), 3, "debate ran once");
    assert_eq!(run.decision(), Some(&decision));
}

// ── Failures ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_publish_failure_stays_in_review() {
    let dir = tempfile::tempdir().unwrap();
    let mut stubs = Stubs::new(ScriptedGenerator::default());
    stubs.publisher = Arc::new(RecordingPublisher::failing(PublishError::Transport(
        "connection reset".into(),
    )));
    let (engine, corpus) = engine_with(dir.path(), &stubs).await;
    let cancel = CancellationToken::new();

    let mut run = engine.start(upload());
    engine.advance(&mut run, &cancel).await.unwrap();

    let event = publish(&run);
    let err = engine.handle(&mut run, event, &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Publish(_)));
    assert_eq!(run.status(), ItemStatus::Review);
    assert!(run.error().unwrap().contains("connection reset"));
    assert_eq!(corpus.len().await.unwrap(), SEED);

    // A second publish is a fresh user action.
    let event = publish(&run);
    let status = engine.handle(&mut run, event, &cancel).await.unwrap();
    assert!(matches!(status, ItemStatus::Published { .. }));
    assert_eq!(corpus.len().await.unwrap(), SEED + 1);
}

#[tokio::test]
async fn test_corpus_failure_after_publish_is_retried_without_republishing() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::default());
    let (slot, _seeded) = trained_slot(dir.path(), SEED).await;
    // A directory where the corpus file should be makes every append fail.
    let corpus_path = dir.path().join("feedback.jsonl");
    std::fs::create_dir(&corpus_path).unwrap();
    let corpus = Arc::new(Corpus::open(&corpus_path));
    let engine = Engine::new(stubs.services(), slot, corpus.clone(), PipelineConfig::default());
    let cancel = CancellationToken::new();

    let mut run = engine.start(upload());
    engine.advance(&mut run, &cancel).await.unwrap();

    let event = publish(&run);
    let err = engine.handle(&mut run, event, &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::Corpus(_)));
    assert!(matches!(run.status(), ItemStatus::Published { .. }));
    assert!(run.awaiting_sample());
    assert!(run.error().is_some());
    assert_eq!(stubs.publisher.published.lock().unwrap().len(), 1);

    std::fs::remove_dir(&corpus_path).unwrap();
    let event = publish(&run);
    let status = engine.handle(&mut run, event, &cancel).await.unwrap();
    assert_eq!(
        status,
        ItemStatus::Published {
            listing_id: "gid://shop/Product/1".into()
        }
    );
    assert!(run.sample_recorded());
    assert!(run.error().is_none());
    assert_eq!(stubs.publisher.published.lock().unwrap().len(), 1, "published once");
    assert_eq!(corpus.len().await.unwrap(), 1);

    // The sample is owed exactly once.
    let event = publish(&run);
    let err = engine.handle(&mut run, event, &cancel).await.unwrap_err();
    assert!(matches!(err, PipelineError::InvalidEvent { .. }));
    assert_eq!(corpus.len().await.unwrap(), 1);
}

#[tokio::test]
async fn test_cancelled_item_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::default());
    let (engine, corpus) = engine_with(dir.path(), &stubs).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let mut run = engine.start(upload());
    let status = engine.advance(&mut run, &cancel).await.unwrap();
    assert_eq!(status, ItemStatus::Skipped);
    assert_eq!(stubs.generator.generate_calls(), 0);
    assert!(stubs.roles.calls.lock().unwrap().is_empty());
    assert_eq!(corpus.len().await.unwrap(), SEED);
}

#[tokio::test]
async fn test_missing_model_fails_at_prediction() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::default());
    let corpus = Arc::new(Corpus::open(dir.path().join("corpus.jsonl")));
    let slot = ModelSlot::empty(ModelStore::new(dir.path().join("model.json")));
    let engine = Engine::new(stubs.services(), slot, corpus, PipelineConfig::default());

    let mut run = engine.start(upload());
    let status = engine.advance(&mut run, &CancellationToken::new()).await.unwrap();
    match status {
        ItemStatus::Failed { stage, error } => {
            assert_eq!(stage, "predicting");
            assert!(error.contains("no trained settings model"));
        }
        other => panic!("unexpected status: {other}"),
    }
    assert!(stubs.roles.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_batch_processes_items_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let stubs = Stubs::new(ScriptedGenerator::default());
    let (engine, corpus) = engine_with(dir.path(), &stubs).await;

    let uploads = vec![
        Upload::new("first.jpg", vec![png(400, 500)]),
        Upload::new("second.jpg", vec![png(400, 500)]),
    ];
    let reports = engine
        .run_batch(uploads, &AutoPublish, &CancellationToken::new())
        .await;

    assert_eq!(reports.len(), 2);
    let names: Vec<_> = reports
        .iter()
        .map(|r| r.as_ref().unwrap().attributes.as_ref().unwrap().identifier.clone())
        .collect();
    assert_eq!(names, vec!["first", "second"]);
    assert_eq!(corpus.len().await.unwrap(), SEED + 2);
}
