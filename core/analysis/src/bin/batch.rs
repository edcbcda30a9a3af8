//! Batch Binary - runs one monthly analysis pass immediately and prints the tally
//!
//! Usage:
//!   goal-insight-batch [--db-path <path>] [--min-text-length <n>] [--delay-ms <ms>]
//!                      [--budget-secs <s>] [--at <rfc3339>] [--scripted] [--verbose]
//!
//! The model comes from AI_MODEL unless --scripted is given. --scripted needs
//! a build with the `testing` feature.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use goal_insight_analysis::{BatchConfig, BatchRunner, Database, ServiceConfig};
use goal_insight_llm::{LanguageModel, ModelConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "goal-insight-batch")]
#[command(about = "Run the monthly sentiment and personality analysis once")]
struct Args {
    /// Path to SQLite database file (defaults to DB_PATH)
    #[arg(long, short)]
    db_path: Option<PathBuf>,

    /// Minimum corpus length in characters
    #[arg(long)]
    min_text_length: Option<usize>,

    /// Delay between subjects that reached the model, in milliseconds
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Wall-clock budget for the whole run, in seconds
    #[arg(long)]
    budget_secs: Option<u64>,

    /// Run as of this RFC3339 timestamp instead of now
    #[arg(long)]
    at: Option<String>,

    /// Use the built-in scripted model (no network)
    #[arg(long)]
    scripted: bool,

    /// Print every subject's terminal state
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args = Args::parse();

    let db_path = args
        .db_path
        .unwrap_or_else(|| PathBuf::from(ServiceConfig::from_env().db_path));
    info!("Database: {}", db_path.display());

    let mut config = BatchConfig::from_env();
    if let Some(n) = args.min_text_length {
        config.min_text_length = n;
    }
    if let Some(ms) = args.delay_ms {
        config.inter_call_delay = Duration::from_millis(ms);
    }
    if let Some(secs) = args.budget_secs {
        config.time_budget = Duration::from_secs(secs);
    }

    let now = match args.at.as_deref() {
        Some(at) => DateTime::parse_from_rfc3339(at)
            .with_context(|| format!("Invalid --at timestamp \"{}\"", at))?,
        None => Local::now().fixed_offset(),
    };

    let model: Arc<dyn LanguageModel> = if args.scripted {
        scripted_model()?
    } else {
        let model_config = ModelConfig::from_env().context("Invalid AI_MODEL configuration")?;
        info!("Using {:?} model {}", model_config.provider, model_config.model);
        model_config.build()?
    };

    let db = Arc::new(Mutex::new(Database::new(&db_path)?));
    let runner = BatchRunner::new(Arc::new(db), model, config);

    let report = runner.run_at(now).await?;

    if args.verbose {
        for (subject, state) in &report.subjects {
            println!("{}\t{:?}", subject, state);
        }
    }
    println!("{}", serde_json::to_string_pretty(&report.tally)?);

    Ok(())
}

#[cfg(feature = "testing")]
fn scripted_model() -> Result<Arc<dyn LanguageModel>> {
    info!("Using scripted model");
    Ok(Arc::new(goal_insight_analysis::testing::ScriptedModel::new()))
}

#[cfg(not(feature = "testing"))]
fn scripted_model() -> Result<Arc<dyn LanguageModel>> {
    anyhow::bail!("--scripted requires a build with the \"testing\" feature")
}
