//! Voxtune CLI - fine-tuning pipeline entry point.
//!
//! `voxtune prepare` brings the corpus caches up to date; `voxtune train`
//! runs the whole pipeline including the training loop.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use voxtune_training::pipeline::{self, PipelineContext};
use voxtune_training::{BigramBaseline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(
    name = "voxtune",
    author,
    version,
    about = "Speech-to-text fine-tuning pipeline",
    long_about = "Voxtune turns a raw speech corpus into a trained sequence-to-text model:\n\
                  split loading, resumable preprocessing caches, resource-aware chunked\n\
                  transformation, and a training loop with early stopping and bounded\n\
                  checkpoint retention."
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transform and cache all corpus splits without training
    ///
    /// Idempotent: splits with a valid cache entry are skipped entirely,
    /// so re-running after an interruption only does the remaining work.
    Prepare {
        /// Path to the pipeline config document (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Run the full pipeline: prepare splits, train, export the best model
    Train {
        /// Path to the pipeline config document (JSON)
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber =
        FmtSubscriber::builder().with_max_level(level).without_time().with_target(false).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match args.command {
        Command::Prepare { config } => {
            let ctx = load_context(&config)?;
            pipeline::prepare_corpus(&ctx)?;
            println!("corpus prepared; caches under {}", ctx.cache.root().display());
        }
        Command::Train { config } => {
            let ctx = load_context(&config)?;
            let outcome = pipeline::run(&ctx, BigramBaseline::new())?;
            println!(
                "training finished: {:?} after {} steps (best step: {}, best WER: {})",
                outcome.status,
                outcome.steps,
                outcome.best_step.map_or_else(|| "-".to_string(), |s| s.to_string()),
                outcome
                    .best_metric
                    .map_or_else(|| "-".to_string(), |wer| format!("{wer:.2}%")),
            );
        }
    }

    Ok(())
}

fn load_context(config_path: &PathBuf) -> anyhow::Result<PipelineContext> {
    let config = PipelineConfig::load(config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    Ok(PipelineContext::from_config(config)?)
}
