use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pipeline::predictor::RetrainConfig;
use pipeline::{AuditStore, Corpus, DebateOrchestrator, ModelSlot, ModelStore, RawAttributes};
use studio_agents::{ChatRoleInvoker, StudioConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "studio-agents", about = "Listing image settings: predict, debate, retrain")]
struct Cli {
    /// TOML config file overriding environment defaults.
    #[arg(long, env = "STUDIO_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, clap::Args)]
struct ProductArgs {
    #[arg(long)]
    garment_type: String,
    #[arg(long)]
    color: String,
    #[arg(long)]
    fit: String,
    #[arg(long)]
    gender: String,
    #[arg(long)]
    composition: Option<String>,
    #[arg(long)]
    identifier: Option<String>,
}

impl ProductArgs {
    fn raw(&self) -> RawAttributes {
        RawAttributes {
            identifier: self.identifier.clone(),
            garment_type: self.garment_type.clone(),
            color: self.color.clone(),
            fit: self.fit.clone(),
            gender: self.gender.clone(),
            composition: self.composition.clone().map(serde_json::Value::String),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Predict the best settings for one product.
    Predict(ProductArgs),
    /// Predict, then run the advocate debate.
    Debate(ProductArgs),
    /// Retrain the settings model from the corpus.
    Retrain {
        /// Override the minimum corpus size.
        #[arg(long)]
        min_samples: Option<usize>,
    },
    /// Inspect or seed the training corpus.
    #[command(subcommand)]
    Corpus(CorpusCommand),
    /// Print the audit report for a run.
    Report { run_id: String },
}

#[derive(Debug, Subcommand)]
enum CorpusCommand {
    /// Number of samples.
    Size,
    /// Append samples from a JSON array file.
    Import { path: PathBuf },
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Token cancelled on Ctrl-C.
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });
    token
}

fn load_model(config: &StudioConfig) -> Result<ModelSlot> {
    ModelSlot::load(ModelStore::new(&config.model_path))
        .with_context(|| format!("Failed to load model {}", config.model_path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = StudioConfig::load(cli.config.as_deref())?;
    info!(
        llm = %config.llm.url,
        model = %config.llm.model,
        corpus = %config.corpus_path.display(),
        "Studio agents starting"
    );

    match cli.command {
        Command::Predict(product) => {
            let slot = load_model(&config)?;
            let candidate = slot.predict_raw(&product.raw()).await?;
            println!("{}", serde_json::to_string_pretty(&candidate)?);
        }
        Command::Debate(product) => {
            let slot = load_model(&config)?;
            let raw = product.raw();
            let attributes = raw.normalize("cli")?;
            let candidate = slot.predict(&attributes).await?;

            let invoker = ChatRoleInvoker::new(config.llm.clone())
                .context("Failed to build chat client")?;
            let orchestrator =
                DebateOrchestrator::new(Arc::new(invoker), config.pipeline.debate.clone());
            let cancel = ctrl_c_token();
            let outcome = orchestrator.run(&candidate, &attributes, &cancel).await?;

            info!("{}", outcome.summary_line());
            println!("{}", serde_json::to_string_pretty(&outcome.transcript)?);
        }
        Command::Retrain { min_samples } => {
            let corpus = Corpus::open(&config.corpus_path);
            let slot = ModelSlot::load(ModelStore::new(&config.model_path))?;
            let mut retrain: RetrainConfig = config.pipeline.retrain;
            if let Some(min) = min_samples {
                retrain.min_samples = min;
            }
            let report = slot.retrain(&corpus, &retrain).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Corpus(CorpusCommand::Size) => {
            let corpus = Corpus::open(&config.corpus_path);
            println!("{}", corpus.len().await?);
        }
        Command::Corpus(CorpusCommand::Import { path }) => {
            let corpus = Corpus::open(&config.corpus_path);
            let added = corpus
                .import_json_array(&path)
                .await
                .with_context(|| format!("Failed to import {}", path.display()))?;
            info!(added, total = corpus.len().await?, "Corpus import complete");
        }
        Command::Report { run_id } => {
            let store = AuditStore::new(&config.audit_dir);
            match store.load(&run_id)? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => anyhow::bail!("No report for run {run_id} in {}", config.audit_dir.display()),
            }
        }
    }

    Ok(())
}
