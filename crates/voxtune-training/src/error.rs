use std::path::PathBuf;
use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    #[error("missing metadata file for {split} split: {path}")]
    MissingMetadata { split: String, path: PathBuf },

    #[error("invalid pipeline config: {0}")]
    Config(String),

    #[error("train split is empty after transformation; refusing to train on zero samples")]
    EmptyTrainSplit,

    #[error("transform error: {0}")]
    Transform(String),

    #[error("collate error: {0}")]
    Collate(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("audio decode error: {0}")]
    Audio(#[from] hound::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
