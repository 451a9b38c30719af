//! End-to-end pipeline driver: corpus → cache → transform → train.

use crate::cache::SplitCache;
use crate::chunk::{transform_split, ChunkReport};
use crate::config::PipelineConfig;
use crate::corpus::{self, DatasetSplit, SplitKind};
use crate::error::TrainingResult;
use crate::layout::OutputLayout;
use crate::metrics::Evaluator;
use crate::resources;
use crate::trainer::{RunOutcome, SpeechModel, Trainer};
use crate::transform::{AudioTransform, SampleTransform, Tokenizer};
use std::path::{Path, PathBuf};

/// Everything the pipeline needs, constructed once and passed along.
/// No ambient globals anywhere in the crate.
#[derive(Debug, Clone)]
pub struct PipelineContext {
    pub config: PipelineConfig,
    pub tokenizer: Tokenizer,
    pub cache: SplitCache,
    pub layout: OutputLayout,
    pub workers: usize,
}

impl PipelineContext {
    pub fn from_config(config: PipelineConfig) -> TrainingResult<Self> {
        config.validate()?;
        let vocab_path = PathBuf::from(&config.model_path).join("vocab.json");
        let tokenizer = if vocab_path.is_file() {
            Tokenizer::from_vocab_file(&vocab_path)?
        } else {
            tracing::info!("no vocab.json under model_path, using built-in English inventory");
            Tokenizer::english()
        };
        let cache = SplitCache::new(Path::new(&config.dataset_path));
        let layout = OutputLayout::new(&config.training.output_dir);
        let workers = resources::detect_workers();
        Ok(Self { config, tokenizer, cache, layout, workers })
    }
}

/// Bring one split to its transformed form, preferring the cache.
///
/// On a valid cache hit no transform work happens at all. Otherwise the raw
/// split is loaded, transformed chunk by chunk, and the result persisted
/// before being returned, so an interrupted later phase can reuse it.
pub fn prepare_split_with<T: SampleTransform>(
    ctx: &PipelineContext,
    kind: SplitKind,
    transform: &T,
) -> TrainingResult<(DatasetSplit, Option<ChunkReport>)> {
    if let Some(split) = ctx.cache.load_valid(kind) {
        return Ok((split, None));
    }
    let raw = corpus::load_split(Path::new(&ctx.config.dataset_path), kind)?;
    let (split, report) = transform_split(&raw, ctx.workers, transform)?;
    ctx.cache.store(&split)?;
    Ok((split, Some(report)))
}

pub fn prepare_split(ctx: &PipelineContext, kind: SplitKind) -> TrainingResult<DatasetSplit> {
    let transform = AudioTransform::new(ctx.tokenizer.clone());
    let (split, _) = prepare_split_with(ctx, kind, &transform)?;
    Ok(split)
}

/// Cache all three splits without training. Safe to re-run; valid caches
/// short-circuit.
pub fn prepare_corpus(ctx: &PipelineContext) -> TrainingResult<()> {
    for kind in SplitKind::ALL {
        let split = prepare_split(ctx, kind)?;
        tracing::info!(split = %kind, samples = split.len(), "split ready");
    }
    Ok(())
}

/// Run the whole pipeline: data readiness, training, best-model export.
pub fn run<M: SpeechModel>(ctx: &PipelineContext, model: M) -> TrainingResult<RunOutcome> {
    let train = prepare_split(ctx, SplitKind::Train)?;
    let validation = prepare_split(ctx, SplitKind::Validation)?;
    prepare_split(ctx, SplitKind::Test)?;

    let mut trainer = Trainer::new(
        model,
        train,
        validation,
        ctx.config.training.clone(),
        ctx.layout.clone(),
        Evaluator::new(ctx.tokenizer.clone()),
    )?;
    let outcome = trainer.run()?;
    trainer.export_best()?;
    Ok(outcome)
}
