//! Training orchestration: the train/evaluate loop, metric-driven early
//! stopping, checkpoint rotation, and the failure path.

use crate::artifacts::{self, EvalPoint, RunManifest};
use crate::checkpoint::{save_snapshot, CheckpointStore};
use crate::collate::{collate, Batch};
use crate::config::{EvaluationStrategy, TrainingParams};
use crate::corpus::DatasetSplit;
use crate::error::{TrainingError, TrainingResult};
use crate::layout::OutputLayout;
use crate::metrics::Evaluator;
use crate::progress::{ProgressEvent, ProgressSink, TracingProgressSink};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backend seam: the orchestrator drives any model that can take a batch,
/// emit predictions, and snapshot its state as JSON.
pub trait SpeechModel: Send {
    /// One optimizer micro-step on a collated batch; returns the loss.
    fn train_step(&mut self, batch: &Batch) -> TrainingResult<f32>;

    /// Decode label-id hypotheses for a batch.
    fn predict(&mut self, batch: &Batch) -> TrainingResult<Vec<Vec<i64>>>;

    fn state(&self) -> TrainingResult<serde_json::Value>;

    fn load_state(&mut self, state: &serde_json::Value) -> TrainingResult<()>;
}

/// Terminal state of a successful run. A fatal step failure surfaces as an
/// error instead, after the best-effort interrupted snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    StoppedBudget,
    StoppedEarly,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub steps: u64,
    pub best_step: Option<u64>,
    pub best_metric: Option<f64>,
}

pub struct Trainer<M: SpeechModel> {
    model: M,
    train: DatasetSplit,
    eval: DatasetSplit,
    params: TrainingParams,
    layout: OutputLayout,
    store: CheckpointStore,
    evaluator: Evaluator,
    sink: Box<dyn ProgressSink>,
    cursor: usize,
}

impl<M: SpeechModel> Trainer<M> {
    pub fn new(
        model: M,
        train: DatasetSplit,
        eval: DatasetSplit,
        params: TrainingParams,
        layout: OutputLayout,
        evaluator: Evaluator,
    ) -> TrainingResult<Self> {
        params.validate()?;
        if train.is_empty() {
            return Err(TrainingError::EmptyTrainSplit);
        }
        if eval.is_empty() && params.evaluation_strategy == EvaluationStrategy::Steps {
            tracing::warn!("evaluation split is empty, evaluations disabled for this run");
        }
        let store = CheckpointStore::new(layout.checkpoints_dir(), params.checkpoint_retention);
        Ok(Self {
            model,
            train,
            eval,
            params,
            layout,
            store,
            evaluator,
            sink: Box::new(TracingProgressSink),
            cursor: 0,
        })
    }

    #[must_use]
    pub fn with_progress_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// Drive the run to a terminal state.
    ///
    /// On success both terminal states reload the best-tracked checkpoint
    /// (not necessarily the last) and write a run manifest under `logs/`.
    /// On a step failure an interrupted snapshot is attempted and the
    /// original error propagates regardless of the snapshot's fate.
    pub fn run(&mut self) -> TrainingResult<RunOutcome> {
        let created_at = Utc::now();
        self.layout.ensure_dirs()?;
        self.sink.on_event(ProgressEvent::Started { max_steps: self.params.max_steps });

        let (status, steps, best_metric, evaluations) = match self.run_loop() {
            Ok(result) => result,
            Err(original) => {
                self.interrupted_snapshot();
                return Err(original);
            }
        };

        if let Some(best) = self.store.best_step() {
            let state = self.store.load(best)?;
            self.model.load_state(&state)?;
            tracing::info!(step = best, "reloaded best checkpoint");
        }

        self.sink.on_event(ProgressEvent::Finished { status });
        let outcome = RunOutcome { status, steps, best_step: self.store.best_step(), best_metric };
        self.write_manifest(created_at, &outcome, evaluations)?;
        Ok(outcome)
    }

    fn run_loop(&mut self) -> TrainingResult<(RunStatus, u64, Option<f64>, Vec<EvalPoint>)> {
        let eval_enabled = self.params.evaluation_strategy == EvaluationStrategy::Steps
            && !self.eval.is_empty();
        let patience = self.params.early_stopping_patience;

        let mut step: u64 = 0;
        let mut best_metric: Option<f64> = None;
        let mut stagnant: u32 = 0;
        let mut evaluations = Vec::new();

        let status = loop {
            if step >= self.params.max_steps {
                tracing::info!(step, "step budget exhausted");
                break RunStatus::StoppedBudget;
            }

            let loss = self.train_one_step()?;
            step += 1;
            if step % self.params.logging_steps == 0 {
                self.sink.on_event(ProgressEvent::TrainStep { step, loss });
            }

            let mut saved_this_step = false;
            if eval_enabled && step % self.params.eval_steps == 0 {
                let wer = self.evaluate()?;
                let improved = best_metric.is_none_or(|best| wer < best);
                evaluations.push(EvalPoint { step, wer });
                self.sink.on_event(ProgressEvent::Evaluated { step, wer, improved });

                if improved {
                    best_metric = Some(wer);
                    stagnant = 0;
                    self.checkpoint(step)?;
                    saved_this_step = true;
                    self.store.mark_best(step)?;
                } else {
                    stagnant += 1;
                    if stagnant >= patience {
                        tracing::info!(step, stagnant, "early stopping on stagnant metric");
                        break RunStatus::StoppedEarly;
                    }
                }
            }

            if step % self.params.save_steps == 0 && !saved_this_step {
                self.checkpoint(step)?;
            }
        };

        Ok((status, step, best_metric, evaluations))
    }

    /// One orchestrator step: `gradient_accumulation_steps` micro-batches,
    /// loss averaged across them.
    fn train_one_step(&mut self) -> TrainingResult<f32> {
        let micro_steps = self.params.gradient_accumulation_steps;
        let mut total = 0.0f32;
        for _ in 0..micro_steps {
            let batch = self.next_batch()?;
            total += self.model.train_step(&batch)?;
        }
        Ok(total / micro_steps as f32)
    }

    fn next_batch(&mut self) -> TrainingResult<Batch> {
        let len = self.train.len();
        let size = self.params.per_device_train_batch_size.min(len);
        let mut records = Vec::with_capacity(size);
        for _ in 0..size {
            records.push(self.train.records[self.cursor].clone());
            self.cursor = (self.cursor + 1) % len;
        }
        collate(&records)
    }

    fn evaluate(&mut self) -> TrainingResult<f64> {
        let size = self.params.per_device_train_batch_size.max(1);
        let mut predictions = Vec::new();
        let mut references = Vec::new();
        for chunk in self.eval.records.chunks(size) {
            let batch = collate(chunk)?;
            predictions.append(&mut self.model.predict(&batch)?);
            references.extend_from_slice(&batch.labels);
        }
        Ok(self.evaluator.error_rate(&predictions, &references))
    }

    fn checkpoint(&mut self, step: u64) -> TrainingResult<()> {
        let state = self.model.state()?;
        self.store.save(step, &state)?;
        self.sink.on_event(ProgressEvent::Checkpointed { step });
        Ok(())
    }

    /// Stage one of the failure path. Stage two (propagating the original
    /// error) happens in `run`; a snapshot failure is logged, never masks
    /// the original error, and never counts as success.
    fn interrupted_snapshot(&mut self) {
        tracing::error!("training step failed, attempting interrupted snapshot");
        let result =
            self.model.state().and_then(|state| save_snapshot(&self.layout.interrupted_dir(), &state));
        match result {
            Ok(path) => tracing::info!(path = %path.display(), "interrupted snapshot saved"),
            Err(e) => tracing::warn!(error = %e, "interrupted snapshot failed"),
        }
    }

    /// Copy the best checkpoint into `final/`; with no tracked best (for
    /// example an eval-free run) the current model state is snapshotted
    /// instead.
    pub fn export_best(&mut self) -> TrainingResult<PathBuf> {
        match self.store.best_step() {
            Some(_) => self.store.export_best(&self.layout.final_dir()),
            None => {
                let state = self.model.state()?;
                save_snapshot(&self.layout.final_dir(), &state)
            }
        }
    }

    fn write_manifest(
        &self,
        created_at: DateTime<Utc>,
        outcome: &RunOutcome,
        evaluations: Vec<EvalPoint>,
    ) -> TrainingResult<()> {
        let mut manifest_artifacts = Vec::new();
        if let Some(best) = self.store.best_step() {
            let state_path = self.store.step_dir(best).join("state.json");
            manifest_artifacts.push(artifacts::make_artifact(state_path)?);
        }
        let manifest = RunManifest {
            created_at,
            finished_at: Utc::now(),
            status: outcome.status,
            steps: outcome.steps,
            best_step: outcome.best_step,
            best_metric: outcome.best_metric,
            evaluations,
            artifacts: manifest_artifacts,
        };
        artifacts::write_manifest(&self.layout.logs_dir(), &manifest)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{SampleRecord, SplitKind};
    use crate::transform::Tokenizer;
    use std::collections::VecDeque;
    use tempfile::TempDir;

    /// Model whose predictions follow a per-evaluation script and whose
    /// state is just how many steps it has trained.
    struct ScriptedModel {
        tokenizer: Tokenizer,
        trained_steps: u64,
        fail_at_step: Option<u64>,
        eval_script: VecDeque<&'static str>,
    }

    impl ScriptedModel {
        fn new(eval_script: &[&'static str]) -> Self {
            Self {
                tokenizer: Tokenizer::english(),
                trained_steps: 0,
                fail_at_step: None,
                eval_script: eval_script.iter().copied().collect(),
            }
        }
    }

    impl SpeechModel for ScriptedModel {
        fn train_step(&mut self, _batch: &Batch) -> TrainingResult<f32> {
            if Some(self.trained_steps + 1) == self.fail_at_step {
                return Err(TrainingError::Model("scripted step failure".to_string()));
            }
            self.trained_steps += 1;
            Ok(1.0 / self.trained_steps as f32)
        }

        fn predict(&mut self, batch: &Batch) -> TrainingResult<Vec<Vec<i64>>> {
            let hypothesis = self.eval_script.pop_front().unwrap_or("");
            Ok(vec![self.tokenizer.encode(hypothesis); batch.len()])
        }

        fn state(&self) -> TrainingResult<serde_json::Value> {
            Ok(serde_json::json!({ "trained_steps": self.trained_steps }))
        }

        fn load_state(&mut self, state: &serde_json::Value) -> TrainingResult<()> {
            self.trained_steps = state["trained_steps"]
                .as_u64()
                .ok_or_else(|| TrainingError::Model("bad state".to_string()))?;
            Ok(())
        }
    }

    fn transformed_record(transcript: &str) -> SampleRecord {
        let tokenizer = Tokenizer::english();
        SampleRecord {
            audio_path: "clips/x.wav".into(),
            transcript: transcript.to_string(),
            features: Some(vec![0.1; 8]),
            labels: Some(tokenizer.encode(transcript)),
        }
    }

    fn split(kind: SplitKind, transcripts: &[&str]) -> DatasetSplit {
        DatasetSplit { kind, records: transcripts.iter().map(|t| transformed_record(t)).collect() }
    }

    fn params(max_steps: u64, eval_steps: u64) -> TrainingParams {
        TrainingParams {
            learning_rate: 1e-4,
            per_device_train_batch_size: 1,
            gradient_accumulation_steps: 1,
            warmup_steps: 0,
            max_steps,
            logging_steps: 1,
            eval_steps,
            save_steps: 1_000,
            fp16: false,
            evaluation_strategy: EvaluationStrategy::Steps,
            output_dir: "unused".to_string(),
            early_stopping_patience: 3,
            checkpoint_retention: 3,
        }
    }

    fn trainer_with(
        temp: &TempDir,
        model: ScriptedModel,
        params: TrainingParams,
    ) -> Trainer<ScriptedModel> {
        let train = split(SplitKind::Train, &["a b c d", "b c d a"]);
        let eval = split(SplitKind::Validation, &["a b c d"]);
        let layout = OutputLayout::new(temp.path().join("out"));
        Trainer::new(model, train, eval, params, layout, Evaluator::new(Tokenizer::english()))
            .unwrap()
    }

    #[test]
    fn test_empty_train_split_is_refused() {
        let temp = TempDir::new().unwrap();
        let train = DatasetSplit { kind: SplitKind::Train, records: Vec::new() };
        let eval = split(SplitKind::Validation, &["a b"]);
        let layout = OutputLayout::new(temp.path().join("out"));
        let result = Trainer::new(
            ScriptedModel::new(&[]),
            train,
            eval,
            params(10, 5),
            layout,
            Evaluator::new(Tokenizer::english()),
        );
        assert!(matches!(result, Err(TrainingError::EmptyTrainSplit)));
    }

    #[test]
    fn test_budget_stop_without_evals() {
        let temp = TempDir::new().unwrap();
        let mut trainer = trainer_with(&temp, ScriptedModel::new(&[]), params(5, 100));
        let outcome = trainer.run().unwrap();

        assert_eq!(outcome.status, RunStatus::StoppedBudget);
        assert_eq!(outcome.steps, 5);
        assert_eq!(outcome.best_step, None);
        assert_eq!(trainer.model().trained_steps, 5);
    }

    #[test]
    fn test_early_stop_after_patience_and_best_reload() {
        let temp = TempDir::new().unwrap();
        // WER per eval: 75, 50, 25, then flat 50s. Best is eval 3 (step 3);
        // patience 3 stops exactly 3 evaluations later, at step 6.
        let script =
            ["a x x x", "a b x x", "a b c x", "a b x x", "a b x x", "a b x x", "a b x x"];
        let mut trainer = trainer_with(&temp, ScriptedModel::new(&script), params(100, 1));
        let outcome = trainer.run().unwrap();

        assert_eq!(outcome.status, RunStatus::StoppedEarly);
        assert_eq!(outcome.steps, 6);
        assert_eq!(outcome.best_step, Some(3));
        assert!((outcome.best_metric.unwrap() - 25.0).abs() < 1e-9);
        // The model trained 6 steps but came back as the step-3 snapshot.
        assert_eq!(trainer.model().trained_steps, 3);
    }

    #[test]
    fn test_improvement_resets_stagnation_counter() {
        let temp = TempDir::new().unwrap();
        // Two flat evals, an improvement, then three flat: stops at eval 6.
        let script = ["a b x x", "a b x x", "a b x x", "a b c x", "a b x x", "a b x x", "a b x x"];
        let mut trainer = trainer_with(&temp, ScriptedModel::new(&script), params(100, 1));
        let outcome = trainer.run().unwrap();

        assert_eq!(outcome.status, RunStatus::StoppedEarly);
        assert_eq!(outcome.steps, 7);
        assert_eq!(outcome.best_step, Some(4));
    }

    #[test]
    fn test_step_failure_snapshots_then_propagates() {
        let temp = TempDir::new().unwrap();
        let mut model = ScriptedModel::new(&[]);
        model.fail_at_step = Some(4);
        let mut trainer = trainer_with(&temp, model, params(10, 100));

        let err = trainer.run().unwrap_err();
        assert!(matches!(err, TrainingError::Model(_)));

        // Best-effort snapshot of the last good state landed in interrupted/.
        let snapshot = temp.path().join("out/interrupted/state.json");
        let state: serde_json::Value =
            serde_json::from_slice(&std::fs::read(snapshot).unwrap()).unwrap();
        assert_eq!(state["trained_steps"], 3);
    }

    #[test]
    fn test_periodic_save_steps_checkpointing() {
        let temp = TempDir::new().unwrap();
        let mut p = params(6, 100);
        p.save_steps = 2;
        let mut trainer = trainer_with(&temp, ScriptedModel::new(&[]), p);
        trainer.run().unwrap();

        assert_eq!(trainer.store.retained_steps(), &[2, 4, 6]);
    }

    #[test]
    fn test_manifest_written_on_success() {
        let temp = TempDir::new().unwrap();
        let script = ["a b c d", "a b x x", "a b x x", "a b x x"];
        let mut trainer = trainer_with(&temp, ScriptedModel::new(&script), params(100, 1));
        let outcome = trainer.run().unwrap();

        let manifest = crate::artifacts::read_manifest(&temp.path().join("out/logs")).unwrap();
        assert_eq!(manifest.status, outcome.status);
        assert_eq!(manifest.best_step, Some(1));
        assert_eq!(manifest.evaluations.len(), 4);
        assert_eq!(manifest.artifacts.len(), 1);
    }

    #[test]
    fn test_export_best_falls_back_to_current_state() {
        let temp = TempDir::new().unwrap();
        let mut trainer = trainer_with(&temp, ScriptedModel::new(&[]), params(3, 100));
        trainer.run().unwrap();
        let path = trainer.export_best().unwrap();
        assert!(path.ends_with("final/state.json"));
        assert!(path.is_file());
    }
}
