//! Run manifest and artifact digests.

use crate::error::{TrainingError, TrainingResult};
use crate::trainer::RunStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifact {
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalPoint {
    pub step: u64,
    pub wer: f64,
}

/// End-of-run record written under `logs/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub steps: u64,
    pub best_step: Option<u64>,
    pub best_metric: Option<f64>,
    pub evaluations: Vec<EvalPoint>,
    #[serde(default)]
    pub artifacts: Vec<RunArtifact>,
}

pub const MANIFEST_FILE: &str = "run_manifest.json";

pub fn sha256_file(path: &Path) -> TrainingResult<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

pub fn make_artifact(path: PathBuf) -> TrainingResult<RunArtifact> {
    if !path.exists() {
        return Err(TrainingError::Checkpoint(format!(
            "artifact path does not exist: {}",
            path.display()
        )));
    }
    let sha256 = sha256_file(&path)?;
    Ok(RunArtifact { path, sha256 })
}

pub fn write_manifest(logs_dir: &Path, manifest: &RunManifest) -> TrainingResult<PathBuf> {
    std::fs::create_dir_all(logs_dir)?;
    let path = logs_dir.join(MANIFEST_FILE);
    std::fs::write(&path, serde_json::to_vec_pretty(manifest)?)?;
    Ok(path)
}

pub fn read_manifest(logs_dir: &Path) -> TrainingResult<RunManifest> {
    let bytes = std::fs::read(logs_dir.join(MANIFEST_FILE))?;
    Ok(serde_json::from_slice(&bytes)?)
}
