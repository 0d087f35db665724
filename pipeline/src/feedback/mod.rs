//! Feedback loop: published outcomes become training samples.
//!
//! ```text
//! publish ok ──▶ FeedbackRecorder::record ──append──▶ corpus.jsonl ──▶ ModelSlot::retrain
//! ```
//!
//! Only successfully published items contribute, exactly once each.

pub mod corpus;
pub mod recorder;

pub use corpus::{Corpus, CorpusError, ScoreSource, TrainingSample};
pub use recorder::{FeedbackRecorder, MeasuredOutcome, NoiseConfig};
