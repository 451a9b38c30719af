//! Bounded checkpoint retention with a protected best snapshot.

use crate::error::{TrainingError, TrainingResult};
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "state.json";
const CHECKPOINT_PREFIX: &str = "checkpoint-";

/// Rotating store of `checkpoint-<step>/state.json` snapshots.
///
/// At most `retain` non-best checkpoints are kept, oldest evicted first.
/// The best-metric checkpoint is never evicted by rotation; it is only
/// superseded when a later step is marked best, at which point the old
/// best rotates out like any other checkpoint.
#[derive(Debug)]
pub struct CheckpointStore {
    dir: PathBuf,
    retain: usize,
    saved: Vec<u64>,
    best: Option<u64>,
}

impl CheckpointStore {
    /// Open a store, discovering checkpoints left by a previous run so a
    /// retry can reuse them.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, retain: usize) -> Self {
        let dir = dir.into();
        let mut saved = discover_steps(&dir);
        saved.sort_unstable();
        if !saved.is_empty() {
            tracing::info!(dir = %dir.display(), found = saved.len(), "found existing checkpoints");
        }
        Self { dir, retain: retain.max(1), saved, best: None }
    }

    #[must_use]
    pub fn step_dir(&self, step: u64) -> PathBuf {
        self.dir.join(format!("{CHECKPOINT_PREFIX}{step}"))
    }

    /// Steps currently retained, oldest first.
    #[must_use]
    pub fn retained_steps(&self) -> &[u64] {
        &self.saved
    }

    #[must_use]
    pub fn best_step(&self) -> Option<u64> {
        self.best
    }

    /// Write a snapshot for `step` and rotate out stale checkpoints.
    pub fn save(&mut self, step: u64, state: &serde_json::Value) -> TrainingResult<()> {
        let dir = self.step_dir(step);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(STATE_FILE), serde_json::to_vec_pretty(state)?)?;
        if !self.saved.contains(&step) {
            self.saved.push(step);
        }
        tracing::debug!(step, "saved checkpoint");
        self.rotate()
    }

    /// Mark `step` as the best-metric checkpoint. Must already be saved.
    pub fn mark_best(&mut self, step: u64) -> TrainingResult<()> {
        if !self.saved.contains(&step) {
            return Err(TrainingError::Checkpoint(format!(
                "cannot mark unsaved step {step} as best"
            )));
        }
        self.best = Some(step);
        tracing::debug!(step, "marked best checkpoint");
        Ok(())
    }

    fn rotate(&mut self) -> TrainingResult<()> {
        while self.saved.iter().filter(|&&s| Some(s) != self.best).count() > self.retain {
            let Some(pos) = self.saved.iter().position(|&s| Some(s) != self.best) else {
                break;
            };
            let step = self.saved.remove(pos);
            let dir = self.step_dir(step);
            if dir.exists() {
                std::fs::remove_dir_all(&dir)?;
            }
            tracing::debug!(step, "evicted checkpoint");
        }
        Ok(())
    }

    /// Read the snapshot for `step`.
    pub fn load(&self, step: u64) -> TrainingResult<serde_json::Value> {
        let path = self.step_dir(step).join(STATE_FILE);
        let bytes = std::fs::read(&path).map_err(|e| {
            TrainingError::Checkpoint(format!("cannot read checkpoint {step}: {e}"))
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Copy the best snapshot into `target` (the run's `final/` directory).
    pub fn export_best(&self, target: &Path) -> TrainingResult<PathBuf> {
        let best = self
            .best
            .ok_or_else(|| TrainingError::Checkpoint("no best checkpoint to export".to_string()))?;
        std::fs::create_dir_all(target)?;
        let source = self.step_dir(best).join(STATE_FILE);
        let destination = target.join(STATE_FILE);
        std::fs::copy(&source, &destination)?;
        tracing::info!(step = best, path = %destination.display(), "exported best checkpoint");
        Ok(destination)
    }
}

/// Write a snapshot outside the rotation, e.g. the `interrupted/` one.
pub fn save_snapshot(dir: &Path, state: &serde_json::Value) -> TrainingResult<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(STATE_FILE);
    std::fs::write(&path, serde_json::to_vec_pretty(state)?)?;
    Ok(path)
}

fn discover_steps(dir: &Path) -> Vec<u64> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .filter(|e| e.path().is_dir())
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(|name| name.strip_prefix(CHECKPOINT_PREFIX))
                .and_then(|step| step.parse().ok())
        })
        .collect()
}
