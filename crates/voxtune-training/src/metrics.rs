//! Word-error-rate evaluation.

use crate::collate::IGNORE_INDEX;
use crate::transform::Tokenizer;

/// Word-level edit distance (substitutions + insertions + deletions).
fn edit_distance(reference: &[&str], hypothesis: &[&str]) -> usize {
    let mut previous: Vec<usize> = (0..=hypothesis.len()).collect();
    let mut current = vec![0usize; hypothesis.len() + 1];

    for (i, r) in reference.iter().enumerate() {
        current[0] = i + 1;
        for (j, h) in hypothesis.iter().enumerate() {
            let substitution = previous[j] + usize::from(r != h);
            let deletion = previous[j + 1] + 1;
            let insertion = current[j] + 1;
            current[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[hypothesis.len()]
}

/// Word error rate between one reference and one hypothesis, in percent.
///
/// An empty reference scores 0% against an empty hypothesis and 100%
/// against anything else.
#[must_use]
pub fn word_error_rate(reference: &str, hypothesis: &str) -> f64 {
    let reference: Vec<&str> = reference.split_whitespace().collect();
    let hypothesis: Vec<&str> = hypothesis.split_whitespace().collect();
    if reference.is_empty() {
        return if hypothesis.is_empty() { 0.0 } else { 100.0 };
    }
    edit_distance(&reference, &hypothesis) as f64 / reference.len() as f64 * 100.0
}

/// Decodes model output and reference labels to text and scores them.
///
/// The same decode path runs at every evaluation point so the monitored
/// metric stays comparable across the run.
#[derive(Debug, Clone)]
pub struct Evaluator {
    tokenizer: Tokenizer,
}

impl Evaluator {
    #[must_use]
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Corpus-level WER over parallel prediction/reference id sequences,
    /// in percent. Ignore-sentinel positions in the references are restored
    /// to the pad id before decoding.
    #[must_use]
    pub fn error_rate(&self, predictions: &[Vec<i64>], references: &[Vec<i64>]) -> f64 {
        let mut total_edits = 0usize;
        let mut total_words = 0usize;
        let mut extra_hyp_words = 0usize;

        for (prediction, reference) in predictions.iter().zip(references) {
            let restored: Vec<i64> = reference
                .iter()
                .map(|&id| if id == IGNORE_INDEX { self.tokenizer.pad_id() } else { id })
                .collect();
            let reference_text = self.tokenizer.decode(&restored);
            let hypothesis_text = self.tokenizer.decode(prediction);

            let reference_words: Vec<&str> = reference_text.split_whitespace().collect();
            let hypothesis_words: Vec<&str> = hypothesis_text.split_whitespace().collect();
            if reference_words.is_empty() {
                extra_hyp_words += hypothesis_words.len();
                continue;
            }
            total_edits += edit_distance(&reference_words, &hypothesis_words);
            total_words += reference_words.len();
        }

        if total_words == 0 {
            return if extra_hyp_words == 0 { 0.0 } else { 100.0 };
        }
        total_edits as f64 / total_words as f64 * 100.0
    }
}
