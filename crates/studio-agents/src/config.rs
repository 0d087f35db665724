use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use pipeline::PipelineConfig;
use serde::Deserialize;

/// Chat-completions endpoint serving the debate roles.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LlmEndpoint {
    /// Base URL up to and including the API version, e.g. `https://host/v1`.
    pub url: String,
    pub model: String,
    /// Bearer token. Local servers usually need none.
    pub api_key: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for LlmEndpoint {
    fn default() -> Self {
        Self {
            url: std::env::var("STUDIO_LLM_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".into()),
            model: std::env::var("STUDIO_LLM_MODEL").unwrap_or_else(|_| "gpt-4o".into()),
            api_key: std::env::var("STUDIO_LLM_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|key| !key.is_empty()),
            temperature: 0.7,
            max_tokens: 1024,
            timeout: Duration::from_secs(120),
        }
    }
}

/// Top-level configuration for the CLI.
#[derive(Debug, Clone)]
pub struct StudioConfig {
    pub llm: LlmEndpoint,
    /// JSONL training corpus.
    pub corpus_path: PathBuf,
    /// Persisted settings model.
    pub model_path: PathBuf,
    /// Per-item audit reports.
    pub audit_dir: PathBuf,
    pub pipeline: PipelineConfig,
}

impl Default for StudioConfig {
    fn default() -> Self {
        let data_dir =
            PathBuf::from(std::env::var("STUDIO_DATA_DIR").unwrap_or_else(|_| "data".into()));
        let mut pipeline = PipelineConfig::default();
        // Remote image and chat services rate-limit bursts.
        pipeline.call_spacing_ms = 3000;
        Self {
            llm: LlmEndpoint::default(),
            corpus_path: data_dir.join("training_corpus.jsonl"),
            model_path: data_dir.join("settings_model.json"),
            audit_dir: data_dir.join("reports"),
            pipeline,
        }
    }
}

/// On-disk overrides. Every field is optional; absent fields keep the
/// environment-derived defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    llm: Option<FileLlm>,
    corpus_path: Option<PathBuf>,
    model_path: Option<PathBuf>,
    audit_dir: Option<PathBuf>,
    pipeline: Option<toml::Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileLlm {
    url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

impl StudioConfig {
    /// Defaults, overlaid with the TOML file at `path` when given.
    ///
    /// API keys are never read from the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = path {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            config
                .apply_toml(&source)
                .with_context(|| format!("Invalid config {}", path.display()))?;
        }
        Ok(config)
    }

    pub fn apply_toml(&mut self, source: &str) -> Result<()> {
        let file: FileConfig = toml::from_str(source)?;
        if let Some(llm) = file.llm {
            if let Some(url) = llm.url {
                self.llm.url = url;
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(secs) = llm.timeout_secs {
                self.llm.timeout = Duration::from_secs(secs);
            }
        }
        if let Some(path) = file.corpus_path {
            self.corpus_path = path;
        }
        if let Some(path) = file.model_path {
            self.model_path = path;
        }
        if let Some(dir) = file.audit_dir {
            self.audit_dir = dir;
        }
        if let Some(overrides) = file.pipeline {
            let mut merged = toml::Value::try_from(&self.pipeline)?;
            merge_toml(&mut merged, overrides);
            self.pipeline = PipelineConfig::from_toml_str(&toml::to_string(&merged)?)
                .context("Invalid [pipeline] table")?;
        }
        Ok(())
    }
}

/// Overlay `overrides` onto `base`, table by table.
fn merge_toml(base: &mut toml::Value, overrides: toml::Value) {
    match (base, overrides) {
        (toml::Value::Table(base), toml::Value::Table(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(existing) => merge_toml(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, value) => *base = value,
    }
}
