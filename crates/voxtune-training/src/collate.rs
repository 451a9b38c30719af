//! Batch collation: padding variable-length samples to a uniform shape.

use crate::corpus::SampleRecord;
use crate::error::{TrainingError, TrainingResult};

/// Label value excluded from the loss after padding.
pub const IGNORE_INDEX: i64 = -100;

/// A collated batch. Built lazily at training time, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    /// Feature rows, zero-padded to the longest in the batch.
    pub features: Vec<Vec<f32>>,
    /// Pre-padding feature lengths, for masking downstream.
    pub feature_lens: Vec<usize>,
    /// Label rows, padded with [`IGNORE_INDEX`] to the longest in the batch.
    pub labels: Vec<Vec<i64>>,
}

impl Batch {
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Pad a group of transformed records into a batch.
///
/// Features and labels pad independently to their own batch maxima. A batch
/// of one goes through the same path. Untransformed records are a caller
/// bug: collation only ever sees post-transform splits.
pub fn collate(records: &[SampleRecord]) -> TrainingResult<Batch> {
    if records.is_empty() {
        return Err(TrainingError::Collate("cannot collate an empty batch".to_string()));
    }

    let mut features = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());
    for record in records {
        let (Some(f), Some(l)) = (&record.features, &record.labels) else {
            return Err(TrainingError::Collate(format!(
                "record {} is not transformed",
                record.audio_path.display()
            )));
        };
        features.push(f.as_slice());
        labels.push(l.as_slice());
    }

    let feature_max = features.iter().map(|f| f.len()).max().unwrap_or(0);
    let label_max = labels.iter().map(|l| l.len()).max().unwrap_or(0);

    let feature_lens = features.iter().map(|f| f.len()).collect();
    let features = features
        .into_iter()
        .map(|row| {
            let mut padded = row.to_vec();
            padded.resize(feature_max, 0.0);
            padded
        })
        .collect();
    let labels = labels
        .into_iter()
        .map(|row| {
            let mut padded = row.to_vec();
            padded.resize(label_max, IGNORE_INDEX);
            padded
        })
        .collect();

    Ok(Batch { features, feature_lens, labels })
}
