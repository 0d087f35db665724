//! Append-only JSONL training corpus of published outcomes.
//!
//! Each line is one [`TrainingSample`]. Appends open the file in append mode
//! and write a whole line in one call under an in-process writer lock; the
//! file is never rewritten.

use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::debate::Provenance;
use crate::taxonomy::{AttributeSet, ImageSettings};

/// Errors reading or appending the corpus.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("corpus I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corpus line {line} in {path} is malformed: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("failed to serialize training sample: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Where a sample's score came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    /// Real click-through / conversion measurement.
    Measured,
    /// Predicted score perturbed with bounded noise.
    #[default]
    Synthetic,
}

/// One flattened training record.
///
/// Legacy dataset rows (`ctr`, `impressions`) deserialize into the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSample {
    #[serde(flatten)]
    pub attributes: AttributeSet,
    #[serde(flatten)]
    pub settings: ImageSettings,
    /// Observed or synthesized performance score.
    #[serde(alias = "ctr")]
    pub score: f64,
    /// Exposure count backing the score.
    #[serde(alias = "impressions")]
    pub exposures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
    #[serde(default)]
    pub score_source: ScoreSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Handle to the corpus file. Share it behind an `Arc`.
#[derive(Debug)]
pub struct Corpus {
    path: PathBuf,
    writer: Mutex<()>,
}

impl Corpus {
    /// Open (lazily) the corpus at `path`. The file is created on first append.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one sample as a single JSON line.
    pub async fn append(&self, sample: &TrainingSample) -> Result<(), CorpusError> {
        let mut line = serde_json::to_string(sample)?;
        line.push('\n');

        let _guard = self.writer.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io(e))?;
        file.write_all(line.as_bytes()).map_err(|e| self.io(e))?;
        file.sync_data().map_err(|e| self.io(e))?;

        debug!(path = %self.path.display(), item = %sample.attributes.identifier, "Appended training sample");
        Ok(())
    }

    /// Read every sample. A missing file is an empty corpus; blank lines are skipped.
    pub async fn read_all(&self) -> Result<Vec<TrainingSample>, CorpusError> {
        let _guard = self.writer.lock().await;
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let file = std::fs::File::open(&self.path).map_err(|e| self.io(e))?;
        let mut samples = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io(e))?;
            if line.trim().is_empty() {
                continue;
            }
            let sample: TrainingSample =
                serde_json::from_str(&line).map_err(|e| CorpusError::Malformed {
                    path: self.path.clone(),
                    line: idx + 1,
                    message: e.to_string(),
                })?;
            samples.push(sample);
        }
        Ok(samples)
    }

    /// Number of samples in the corpus.
    pub async fn len(&self) -> Result<usize, CorpusError> {
        Ok(self.read_all().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool, CorpusError> {
        Ok(self.len().await? == 0)
    }

    /// Append every record of a legacy JSON-array dataset. Returns the count.
    pub async fn import_json_array(&self, source: &Path) -> Result<usize, CorpusError> {
        let content = std::fs::read_to_string(source).map_err(|e| CorpusError::Io {
            path: source.to_path_buf(),
            source: e,
        })?;
        let records: Vec<TrainingSample> =
            serde_json::from_str(&content).map_err(|e| CorpusError::Malformed {
                path: source.to_path_buf(),
                line: e.line(),
                message: e.to_string(),
            })?;
        for record in &records {
            self.append(record).await?;
        }
        info!(source = %source.display(), count = records.len(), "Imported legacy dataset");
        Ok(records.len())
    }

    fn io(&self, source: std::io::Error) -> CorpusError {
        CorpusError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::taxonomy::*;

    pub(crate) fn sample(score: f64) -> TrainingSample {
        TrainingSample {
            attributes: AttributeSet {
                identifier: "sku-1".into(),
                garment_type: GarmentType::Hoodie,
                color: Color::Black,
                fit: Fit::Oversized,
                gender: Gender::Unisex,
                composition: String::new(),
            },
            settings: ImageSettings {
                style: Style::Streetwear,
                lighting: Lighting::Studio,
                background: Background::UrbanStreet,
                pose: Pose::Standing,
                expression: Expression::Confident,
                angle: Angle::Front,
            },
            score,
            exposures: 1200,
            provenance: Some(Provenance::Hybrid),
            score_source: ScoreSource::Synthetic,
            recorded_at: None,
        }
    }

    #[tokio::test]
    async fn test_append_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let corpus = Corpus::open(dir.path().join("corpus.jsonl"));
        assert!(corpus.is_empty().await.unwrap());

        corpus.append(&sample(0.4)).await.unwrap();
        corpus.append(&sample(0.6)).await.unwrap();

        let all = corpus.read_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].score, 0.6);
        assert_eq!(all[0].provenance, Some(Provenance::Hybrid));
    }

    #[tokio::test]
    async fn test_blank_lines_skipped_and_malformed_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.jsonl");
        let line = serde_json::to_string(&sample(0.5)).unwrap();
        std::fs::write(&path, format!("{line}\n\n{line}\n")).unwrap();

        let corpus = Corpus::open(&path);
        assert_eq!(corpus.len().await.unwrap(), 2);

        std::fs::write(&path, format!("{line}\nnot json\n")).unwrap();
        match corpus.read_all().await.unwrap_err() {
            CorpusError::Malformed { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_flattened_wire_format() {
        let json = serde_json::to_value(sample(0.5)).unwrap();
        assert_eq!(json["garment_type"], "hoodie");
        assert_eq!(json["lighting"], "studio");
        assert_eq!(json["exposures"], 1200);
    }

    #[tokio::test]
    async fn test_import_legacy_rows() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("ctr_dataset.json");
        std::fs::write(
            &legacy,
            r#"[{"garment_type":"jeans","color":"light","fit":"regular","gender":"female",
                "style":"studio_minimal","lighting":"natural","background":"park","pose":"walking",
                "expression":"smiling","angle":"3/4","ctr":0.051,"impressions":2400}]"#,
        )
        .unwrap();

        let corpus = Corpus::open(dir.path().join("corpus.jsonl"));
        assert_eq!(corpus.import_json_array(&legacy).await.unwrap(), 1);
        let all = corpus.read_all().await.unwrap();
        assert_eq!(all[0].attributes.garment_type, GarmentType::Jeans);
        assert_eq!(all[0].exposures, 2400);
        assert!((all[0].score - 0.051).abs() < 1e-12);
        assert_eq!(all[0].attributes.identifier, "");
    }
}
