use crate::trainer::RunStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Started { max_steps: u64 },
    TrainStep { step: u64, loss: f32 },
    Evaluated { step: u64, wer: f64, improved: bool },
    Checkpointed { step: u64 },
    Finished { status: RunStatus },
}

pub trait ProgressSink: Send {
    fn on_event(&mut self, event: ProgressEvent);
}

/// Default sink: events become tracing records.
#[derive(Debug, Default)]
pub struct TracingProgressSink;

impl ProgressSink for TracingProgressSink {
    fn on_event(&mut self, event: ProgressEvent) {
        match event {
            ProgressEvent::Started { max_steps } => {
                tracing::info!(max_steps, "training started");
            }
            ProgressEvent::TrainStep { step, loss } => {
                tracing::info!(step, loss = f64::from(loss), "train step");
            }
            ProgressEvent::Evaluated { step, wer, improved } => {
                tracing::info!(step, wer = format!("{wer:.2}"), improved, "evaluation");
            }
            ProgressEvent::Checkpointed { step } => {
                tracing::debug!(step, "checkpointed");
            }
            ProgressEvent::Finished { status } => {
                tracing::info!(?status, "training finished");
            }
        }
    }
}
