//! Per-split on-disk cache of transformed splits.
//!
//! A cache entry is trusted only after every record passes the derived-field
//! check; any failure invalidates the whole entry and the split is
//! regenerated. Corrupt or unreadable entries are regeneration triggers,
//! never errors.

use crate::corpus::{DatasetSplit, SplitKind};
use crate::error::TrainingResult;
use std::path::{Path, PathBuf};

const CACHE_DIR: &str = "preprocessed_cache";

#[derive(Debug, Clone)]
pub struct SplitCache {
    root: PathBuf,
}

impl SplitCache {
    #[must_use]
    pub fn new(dataset_path: &Path) -> Self {
        Self { root: dataset_path.join(CACHE_DIR) }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deterministic entry path for a split.
    #[must_use]
    pub fn entry_path(&self, kind: SplitKind) -> PathBuf {
        self.root.join(format!("{}_preprocessed.arrow", kind.name()))
    }

    /// Load a split's cache entry if it exists and validates.
    ///
    /// Returns `None` on a missing file, unreadable file, parse failure,
    /// split-name mismatch, or any record missing a derived field.
    #[must_use]
    pub fn load_valid(&self, kind: SplitKind) -> Option<DatasetSplit> {
        let path = self.entry_path(kind);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(split = %kind, error = %e, "unreadable cache entry, regenerating");
                return None;
            }
        };

        let split: DatasetSplit = match serde_json::from_slice(&bytes) {
            Ok(split) => split,
            Err(e) => {
                tracing::warn!(split = %kind, error = %e, "corrupt cache entry, regenerating");
                return None;
            }
        };

        if split.kind != kind {
            tracing::warn!(split = %kind, found = %split.kind, "cache entry names wrong split, regenerating");
            return None;
        }
        if !split.records.iter().all(crate::corpus::SampleRecord::is_transformed) {
            tracing::warn!(split = %kind, "cache entry has records missing derived fields, regenerating");
            return None;
        }

        tracing::info!(split = %kind, samples = split.len(), "cache hit, skipping transformation");
        Some(split)
    }

    /// Persist a transformed split, creating the cache root if absent.
    ///
    /// The write goes through a temp file and rename so an interrupted run
    /// never leaves a half-written entry behind.
    pub fn store(&self, split: &DatasetSplit) -> TrainingResult<()> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.entry_path(split.kind);
        let tmp = path.with_extension("arrow.tmp");
        std::fs::write(&tmp, serde_json::to_vec(split)?)?;
        std::fs::rename(&tmp, &path)?;
        tracing::info!(split = %split.kind, samples = split.len(), path = %path.display(), "cached split");
        Ok(())
    }
}
