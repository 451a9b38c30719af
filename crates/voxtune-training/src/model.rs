//! Reference model backend.
//!
//! The orchestrator is backend-agnostic behind [`SpeechModel`]; this module
//! ships a label-bigram baseline so the pipeline can run end to end without
//! an accelerator stack. It learns label transition counts from batches and
//! greedily decodes from them. Useful for wiring checks and smoke runs, not
//! for transcription quality.

use crate::collate::{Batch, IGNORE_INDEX};
use crate::error::{TrainingError, TrainingResult};
use crate::trainer::SpeechModel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct BigramState {
    /// Transition counts keyed by "from:to".
    transitions: HashMap<String, u64>,
    /// Counts of sequence-initial labels.
    starts: HashMap<String, u64>,
    steps: u64,
}

#[derive(Debug, Default)]
pub struct BigramBaseline {
    state: BigramState,
}

impl BigramBaseline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn label_rows(batch: &Batch) -> impl Iterator<Item = Vec<i64>> + '_ {
        batch
            .labels
            .iter()
            .map(|row| row.iter().copied().filter(|&l| l != IGNORE_INDEX).collect())
    }

    /// Mean negative log-probability of the batch's transitions under the
    /// counts accumulated so far, with add-one smoothing over a nominal
    /// label inventory.
    fn loss(&self, batch: &Batch) -> f32 {
        const SMOOTHING_VOCAB: f64 = 32.0;

        let mut from_totals: HashMap<i64, u64> = HashMap::new();
        for (key, &count) in &self.state.transitions {
            if let Some(from) = key.split(':').next().and_then(|s| s.parse::<i64>().ok()) {
                *from_totals.entry(from).or_insert(0) += count;
            }
        }

        let mut nll = 0.0f64;
        let mut transitions = 0usize;
        for row in Self::label_rows(batch) {
            for pair in row.windows(2) {
                let count = self
                    .state
                    .transitions
                    .get(&format!("{}:{}", pair[0], pair[1]))
                    .copied()
                    .unwrap_or(0);
                let from_total = from_totals.get(&pair[0]).copied().unwrap_or(0);
                let p = (count + 1) as f64 / (from_total as f64 + SMOOTHING_VOCAB);
                nll -= p.ln();
                transitions += 1;
            }
        }
        if transitions == 0 { 0.0 } else { (nll / transitions as f64) as f32 }
    }

    fn argmax_next(&self, from: i64) -> Option<i64> {
        let prefix = format!("{from}:");
        self.state
            .transitions
            .iter()
            .filter_map(|(key, &count)| {
                key.strip_prefix(&prefix).and_then(|to| to.parse::<i64>().ok()).map(|to| (to, count))
            })
            .max_by_key(|&(to, count)| (count, std::cmp::Reverse(to)))
            .map(|(to, _)| to)
    }
}

impl SpeechModel for BigramBaseline {
    fn train_step(&mut self, batch: &Batch) -> TrainingResult<f32> {
        let loss = self.loss(batch);
        for row in Self::label_rows(batch) {
            if let Some(&first) = row.first() {
                *self.state.starts.entry(first.to_string()).or_insert(0) += 1;
            }
            for pair in row.windows(2) {
                let key = format!("{}:{}", pair[0], pair[1]);
                *self.state.transitions.entry(key).or_insert(0) += 1;
            }
        }
        self.state.steps += 1;
        Ok(loss)
    }

    fn predict(&mut self, batch: &Batch) -> TrainingResult<Vec<Vec<i64>>> {
        let start = self
            .state
            .starts
            .iter()
            .filter_map(|(label, &count)| label.parse::<i64>().ok().map(|l| (l, count)))
            .max_by_key(|&(label, count)| (count, std::cmp::Reverse(label)))
            .map(|(label, _)| label);

        let hypotheses = Self::label_rows(batch)
            .map(|row| {
                let Some(mut current) = start else {
                    return Vec::new();
                };
                let mut out = Vec::with_capacity(row.len());
                for _ in 0..row.len() {
                    out.push(current);
                    match self.argmax_next(current) {
                        Some(next) => current = next,
                        None => break,
                    }
                }
                out
            })
            .collect();
        Ok(hypotheses)
    }

    fn state(&self) -> TrainingResult<serde_json::Value> {
        Ok(serde_json::to_value(&self.state)?)
    }

    fn load_state(&mut self, state: &serde_json::Value) -> TrainingResult<()> {
        self.state = serde_json::from_value(state.clone())
            .map_err(|e| TrainingError::Model(format!("invalid bigram state: {e}")))?;
        Ok(())
    }
}
