//! Pipeline configuration.
//!
//! The config document is validated at load time: typed fields, explicit
//! defaults, and unknown keys rejected up front rather than at first use.

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub model_path: String,
    pub dataset_path: String,
    pub training: TrainingParams,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingParams {
    pub learning_rate: f64,
    pub per_device_train_batch_size: usize,
    pub gradient_accumulation_steps: usize,
    pub warmup_steps: u64,
    pub max_steps: u64,
    pub logging_steps: u64,
    pub eval_steps: u64,
    pub save_steps: u64,
    pub fp16: bool,
    pub evaluation_strategy: EvaluationStrategy,
    pub output_dir: String,
    /// Consecutive non-improving evaluations before stopping early.
    #[serde(default = "default_patience")]
    pub early_stopping_patience: u32,
    /// Non-best checkpoints retained by rotation.
    #[serde(default = "default_retention")]
    pub checkpoint_retention: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStrategy {
    Steps,
    No,
}

fn default_patience() -> u32 {
    3
}

fn default_retention() -> usize {
    3
}

impl PipelineConfig {
    /// Load and validate a JSON config document.
    pub fn load(path: &Path) -> TrainingResult<Self> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)
            .map_err(|e| TrainingError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.model_path.trim().is_empty() {
            return Err(TrainingError::Config("model_path must not be empty".to_string()));
        }
        if self.dataset_path.trim().is_empty() {
            return Err(TrainingError::Config("dataset_path must not be empty".to_string()));
        }
        self.training.validate()
    }
}

impl TrainingParams {
    pub fn validate(&self) -> TrainingResult<()> {
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainingError::Config("training.learning_rate must be > 0".to_string()));
        }
        if self.per_device_train_batch_size == 0 {
            return Err(TrainingError::Config(
                "training.per_device_train_batch_size must be >= 1".to_string(),
            ));
        }
        if self.gradient_accumulation_steps == 0 {
            return Err(TrainingError::Config(
                "training.gradient_accumulation_steps must be >= 1".to_string(),
            ));
        }
        if self.max_steps == 0 {
            return Err(TrainingError::Config("training.max_steps must be >= 1".to_string()));
        }
        for (name, value) in [
            ("logging_steps", self.logging_steps),
            ("eval_steps", self.eval_steps),
            ("save_steps", self.save_steps),
        ] {
            if value == 0 {
                return Err(TrainingError::Config(format!("training.{name} must be >= 1")));
            }
        }
        if self.output_dir.trim().is_empty() {
            return Err(TrainingError::Config("training.output_dir must not be empty".to_string()));
        }
        if self.early_stopping_patience == 0 {
            return Err(TrainingError::Config(
                "training.early_stopping_patience must be >= 1".to_string(),
            ));
        }
        if self.checkpoint_retention == 0 {
            return Err(TrainingError::Config(
                "training.checkpoint_retention must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
