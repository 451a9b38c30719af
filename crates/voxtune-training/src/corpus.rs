use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A named partition of the corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitKind {
    Train,
    Validation,
    Test,
}

impl SplitKind {
    pub const ALL: [SplitKind; 3] = [SplitKind::Train, SplitKind::Validation, SplitKind::Test];

    /// Metadata table filename under the corpus root.
    #[must_use]
    pub fn metadata_file(self) -> &'static str {
        match self {
            Self::Train => "train.tsv",
            Self::Validation => "dev.tsv",
            Self::Test => "test.tsv",
        }
    }

    /// Name used for cache entries and logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validation => "validation",
            Self::Test => "test",
        }
    }
}

impl std::fmt::Display for SplitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One corpus sample.
///
/// Raw form carries only the clip path and reference transcript. The
/// transform fills in both derived fields; a record with only one of them
/// is never considered transformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub audio_path: PathBuf,
    pub transcript: String,
    #[serde(default)]
    pub features: Option<Vec<f32>>,
    #[serde(default)]
    pub labels: Option<Vec<i64>>,
}

impl SampleRecord {
    #[must_use]
    pub fn raw(audio_path: PathBuf, transcript: String) -> Self {
        Self { audio_path, transcript, features: None, labels: None }
    }

    #[must_use]
    pub fn is_transformed(&self) -> bool {
        self.features.is_some() && self.labels.is_some()
    }
}

/// An ordered sequence of samples for one split.
///
/// Splits are values: caching and transformation return new splits instead
/// of mutating one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSplit {
    pub kind: SplitKind,
    pub records: Vec<SampleRecord>,
}

impl DatasetSplit {
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// All three splits of a corpus.
#[derive(Debug, Clone)]
pub struct Corpus {
    pub train: DatasetSplit,
    pub validation: DatasetSplit,
    pub test: DatasetSplit,
}

#[derive(Debug, Deserialize)]
struct MetadataRow {
    path: String,
    sentence: String,
}

/// Load one split from its metadata table.
///
/// A missing metadata file is fatal. A row whose resolved clip does not
/// exist on disk is dropped and counted; the drop count is logged.
pub fn load_split(dataset_path: &Path, kind: SplitKind) -> TrainingResult<DatasetSplit> {
    let metadata_path = dataset_path.join(kind.metadata_file());
    if !metadata_path.is_file() {
        return Err(TrainingError::MissingMetadata {
            split: kind.name().to_string(),
            path: metadata_path,
        });
    }

    let mut reader = csv::ReaderBuilder::new().delimiter(b'\t').from_path(&metadata_path)?;
    let clips_dir = dataset_path.join("clips");

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for row in reader.deserialize() {
        let row: MetadataRow = row?;
        let audio_path = clips_dir.join(&row.path);
        if !audio_path.is_file() {
            dropped += 1;
            continue;
        }
        records.push(SampleRecord::raw(audio_path, row.sentence));
    }

    if dropped > 0 {
        tracing::warn!(split = %kind, dropped, "dropped rows with missing clips");
    }
    tracing::info!(split = %kind, samples = records.len(), "loaded split metadata");

    Ok(DatasetSplit { kind, records })
}

/// Load all three splits from a corpus root.
pub fn load_corpus(dataset_path: &Path) -> TrainingResult<Corpus> {
    Ok(Corpus {
        train: load_split(dataset_path, SplitKind::Train)?,
        validation: load_split(dataset_path, SplitKind::Validation)?,
        test: load_split(dataset_path, SplitKind::Test)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_corpus(root: &Path, rows: &[(&str, &str)], clips: &[&str]) {
        std::fs::create_dir_all(root.join("clips")).unwrap();
        let mut tsv = String::from("client_id\tpath\tsentence\n");
        for (path, sentence) in rows {
            tsv.push_str(&format!("c0\t{path}\t{sentence}\n"));
        }
        std::fs::write(root.join("train.tsv"), tsv).unwrap();
        for clip in clips {
            std::fs::write(root.join("clips").join(clip), b"riff").unwrap();
        }
    }

    #[test]
    fn test_load_split_drops_rows_with_missing_clips() {
        let temp = TempDir::new().unwrap();
        write_corpus(
            temp.path(),
            &[("a.wav", "hello there"), ("b.wav", "gone"), ("c.wav", "still here")],
            &["a.wav", "c.wav"],
        );

        let split = load_split(temp.path(), SplitKind::Train).unwrap();
        assert_eq!(split.len(), 2);
        for record in &split.records {
            assert!(record.audio_path.is_file());
            assert!(!record.is_transformed());
        }
    }

    #[test]
    fn test_load_split_tolerates_extra_columns() {
        let temp = TempDir::new().unwrap();
        write_corpus(temp.path(), &[("a.wav", "with extras")], &["a.wav"]);

        let split = load_split(temp.path(), SplitKind::Train).unwrap();
        assert_eq!(split.records[0].transcript, "with extras");
    }

    #[test]
    fn test_missing_metadata_is_fatal() {
        let temp = TempDir::new().unwrap();
        let err = load_split(temp.path(), SplitKind::Validation).unwrap_err();
        assert!(matches!(err, TrainingError::MissingMetadata { .. }));
    }

    #[test]
    fn test_split_kind_names() {
        assert_eq!(SplitKind::Train.metadata_file(), "train.tsv");
        assert_eq!(SplitKind::Validation.metadata_file(), "dev.tsv");
        assert_eq!(SplitKind::Validation.name(), "validation");
        assert_eq!(SplitKind::Test.name(), "test");
    }
}
