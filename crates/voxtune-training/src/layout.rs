use crate::error::TrainingResult;
use std::path::{Path, PathBuf};

/// Filesystem layout under the run's output directory.
///
/// Rotating step checkpoints live directly under the root; `final/` holds
/// the end-of-run best model, `interrupted/` the best-effort failure
/// snapshot, and `logs/` the run metrics.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn checkpoints_dir(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn final_dir(&self) -> PathBuf {
        self.root.join("final")
    }

    #[must_use]
    pub fn interrupted_dir(&self) -> PathBuf {
        self.root.join("interrupted")
    }

    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn ensure_dirs(&self) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
