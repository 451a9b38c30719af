//! Chunked, failure-tolerant split transformation.
//!
//! A split is partitioned into contiguous chunks sized to roughly 1% of the
//! split, bounded between [`MIN_CHUNK`] and [`MAX_CHUNK`]. Chunks run in
//! sequence so only one worker pool's worth of samples is in flight; records
//! within a chunk transform in parallel. A failing chunk is dropped whole
//! and the run continues.

use crate::corpus::{DatasetSplit, SampleRecord};
use crate::error::{TrainingError, TrainingResult};
use crate::transform::SampleTransform;
use rayon::prelude::*;
use std::ops::Range;

pub const MIN_CHUNK: usize = 10;
pub const MAX_CHUNK: usize = 500;

/// Chunk index ranges covering `0..len` exactly, with no gaps or overlap.
#[must_use]
pub fn chunk_ranges(len: usize) -> Vec<Range<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let size = (len / 100).clamp(MIN_CHUNK, MAX_CHUNK);
    (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect()
}

/// Outcome summary for one split's transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    pub chunks_total: usize,
    pub chunks_failed: usize,
    pub records_in: usize,
    pub records_out: usize,
}

/// Transform a split chunk by chunk with at most `workers` parallel
/// transforms in flight.
///
/// Each chunk is a `Result`: on failure the chunk's partial output is
/// discarded, the failure is logged with its index and size, and the next
/// chunk proceeds. Surviving chunks concatenate in original order, so the
/// output may be smaller than the input. If nothing survives the split
/// comes back empty with a warning; whether that is acceptable is the
/// caller's policy.
pub fn transform_split<T: SampleTransform>(
    split: &DatasetSplit,
    workers: usize,
    transform: &T,
) -> TrainingResult<(DatasetSplit, ChunkReport)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .build()
        .map_err(|e| TrainingError::Transform(format!("failed to build worker pool: {e}")))?;

    let ranges = chunk_ranges(split.len());
    let mut report = ChunkReport {
        chunks_total: ranges.len(),
        chunks_failed: 0,
        records_in: split.len(),
        records_out: 0,
    };

    let mut records = Vec::with_capacity(split.len());
    for (index, range) in ranges.into_iter().enumerate() {
        let chunk = &split.records[range];
        let result: TrainingResult<Vec<SampleRecord>> =
            pool.install(|| chunk.par_iter().map(|r| transform.transform(r)).collect());

        match result {
            Ok(mut transformed) => records.append(&mut transformed),
            Err(e) => {
                report.chunks_failed += 1;
                tracing::warn!(
                    split = %split.kind,
                    chunk = index,
                    samples = chunk.len(),
                    error = %e,
                    "dropping failed chunk"
                );
            }
        }
    }

    report.records_out = records.len();
    if report.records_out == 0 && report.records_in > 0 {
        tracing::warn!(split = %split.kind, "all chunks failed, split is empty");
    } else if report.chunks_failed > 0 {
        tracing::warn!(
            split = %split.kind,
            chunks_failed = report.chunks_failed,
            chunks_total = report.chunks_total,
            records_in = report.records_in,
            records_out = report.records_out,
            "split shrank during transformation"
        );
    } else {
        tracing::info!(
            split = %split.kind,
            chunks = report.chunks_total,
            samples = report.records_out,
            "transformed split"
        );
    }

    Ok((DatasetSplit { kind: split.kind, records }, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::SplitKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTransform {
        calls: AtomicUsize,
        fail_transcript: Option<&'static str>,
    }

    impl FakeTransform {
        fn new(fail_transcript: Option<&'static str>) -> Self {
            Self { calls: AtomicUsize::new(0), fail_transcript }
        }
    }

    impl SampleTransform for FakeTransform {
        fn transform(&self, record: &SampleRecord) -> TrainingResult<SampleRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if Some(record.transcript.as_str()) == self.fail_transcript {
                return Err(TrainingError::Transform("scripted failure".to_string()));
            }
            let mut out = record.clone();
            out.features = Some(vec![record.transcript.len() as f32]);
            out.labels = Some(vec![record.transcript.len() as i64]);
            Ok(out)
        }
    }

    fn split_of(n: usize) -> DatasetSplit {
        DatasetSplit {
            kind: SplitKind::Train,
            records: (0..n)
                .map(|i| SampleRecord::raw(format!("clips/{i}.wav").into(), format!("s{i}")))
                .collect(),
        }
    }

    #[test]
    fn test_chunk_ranges_cover_exactly() {
        for len in [0, 1, 9, 10, 11, 99, 100, 1_000, 4_999, 50_000, 60_001] {
            let ranges = chunk_ranges(len);
            let mut next = 0;
            for range in &ranges {
                assert_eq!(range.start, next, "gap or overlap at len={len}");
                assert!(range.end > range.start);
                next = range.end;
            }
            assert_eq!(next, len);
        }
    }

    #[test]
    fn test_chunk_size_bounds() {
        // Small splits get the floor, huge splits the ceiling.
        assert_eq!(chunk_ranges(50)[0].len(), 10);
        assert_eq!(chunk_ranges(60_000)[0].len(), 500);
        // Mid-size splits land near 1%.
        assert_eq!(chunk_ranges(10_000)[0].len(), 100);
    }

    #[test]
    fn test_transform_preserves_order() {
        let split = split_of(25);
        let transform = FakeTransform::new(None);
        let (out, report) = transform_split(&split, 4, &transform).unwrap();

        assert_eq!(report.chunks_failed, 0);
        assert_eq!(out.len(), 25);
        for (record, original) in out.records.iter().zip(&split.records) {
            assert_eq!(record.transcript, original.transcript);
            assert!(record.is_transformed());
        }
    }

    #[test]
    fn test_failed_chunk_dropped_run_continues() {
        let split = split_of(30);
        // s5 lives in the first chunk of 10; that whole chunk is dropped.
        let transform = FakeTransform::new(Some("s5"));
        let (out, report) = transform_split(&split, 2, &transform).unwrap();

        assert_eq!(report.chunks_total, 3);
        assert_eq!(report.chunks_failed, 1);
        assert_eq!(report.records_in, 30);
        assert_eq!(out.len(), 20);
        // Survivors keep original order and none came from the failed chunk.
        assert_eq!(out.records[0].transcript, "s10");
        assert_eq!(out.records.last().unwrap().transcript, "s29");
    }

    #[test]
    fn test_all_chunks_failed_yields_empty_split() {
        let mut split = split_of(12);
        for record in &mut split.records {
            record.transcript = "s0".to_string();
        }
        let transform = FakeTransform::new(Some("s0"));
        let (out, report) = transform_split(&split, 2, &transform).unwrap();

        assert!(out.is_empty());
        assert_eq!(report.chunks_failed, report.chunks_total);
    }

    #[test]
    fn test_empty_split_transforms_to_empty() {
        let split = split_of(0);
        let transform = FakeTransform::new(None);
        let (out, report) = transform_split(&split, 2, &transform).unwrap();
        assert!(out.is_empty());
        assert_eq!(report.chunks_total, 0);
        assert_eq!(transform.calls.load(Ordering::SeqCst), 0);
    }
}
