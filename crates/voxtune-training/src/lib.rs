//! Voxtune Training
//!
//! Data-readiness and training-orchestration core for fine-tuning a
//! speech-to-text model on a raw corpus:
//! - Loading tabular split metadata and resolving clips (`corpus`)
//! - Resource-aware parallelism sizing (`resources`)
//! - Validated on-disk caching of transformed splits (`cache`)
//! - Chunked, failure-tolerant transformation (`chunk`, `transform`)
//! - Padding collation with a loss-ignore sentinel (`collate`)
//! - The train/evaluate loop with early stopping and bounded checkpoint
//!   retention (`trainer`, `checkpoint`)
//! - Word-error-rate evaluation (`metrics`)

pub mod artifacts;
pub mod cache;
pub mod checkpoint;
pub mod chunk;
pub mod collate;
pub mod config;
pub mod corpus;
pub mod error;
pub mod layout;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod resources;
pub mod trainer;
pub mod transform;

pub use artifacts::{EvalPoint, RunArtifact, RunManifest};
pub use cache::SplitCache;
pub use checkpoint::CheckpointStore;
pub use chunk::{chunk_ranges, transform_split, ChunkReport};
pub use collate::{collate, Batch, IGNORE_INDEX};
pub use config::{EvaluationStrategy, PipelineConfig, TrainingParams};
pub use corpus::{load_corpus, load_split, Corpus, DatasetSplit, SampleRecord, SplitKind};
pub use error::{TrainingError, TrainingResult};
pub use layout::OutputLayout;
pub use metrics::{word_error_rate, Evaluator};
pub use model::BigramBaseline;
pub use pipeline::{prepare_corpus, prepare_split, PipelineContext};
pub use progress::{ProgressEvent, ProgressSink, TracingProgressSink};
pub use resources::{detect_workers, worker_count};
pub use trainer::{RunOutcome, RunStatus, SpeechModel, Trainer};
pub use transform::{AudioTransform, SampleTransform, Tokenizer};
