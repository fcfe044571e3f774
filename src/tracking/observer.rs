//! Training-loop events and the observer that logs them to a tracking session.

use std::path::PathBuf;

use super::checkpoint::{CheckpointPaths, CheckpointWriter};
use super::format::{MetricMap, RawMetrics, format_metrics};
use super::session::MetricSink;
use super::TrackingError;
use crate::config::TrainingConfig;
use crate::grading::AgreementReport;

/// Batch metrics are logged every this many batches.
pub const BATCH_LOG_INTERVAL: u64 = 100;
/// Validation metric that selects the best model.
pub const BEST_MODEL_METRIC: &str = "val_f1_mean";

#[derive(Debug, Clone, PartialEq)]
pub struct BatchCompleted {
    /// Batch index within the current epoch.
    pub batch: u64,
    pub metrics: RawMetrics,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochCompleted {
    /// Zero-based epoch index.
    pub epoch: u64,
    pub metrics: RawMetrics,
}

/// Handler the training loop calls synchronously after each batch and epoch.
pub trait TrainingObserver {
    fn on_batch_end(&mut self, event: &BatchCompleted) -> Result<(), TrackingError>;
    fn on_epoch_end(&mut self, event: &EpochCompleted) -> Result<(), TrackingError>;
}

/// Logs formatted metrics to a session and checkpoints on a new best `val_f1_mean`.
pub struct TrackingObserver<S, C> {
    session: S,
    checkpoint: C,
    steps_per_epoch: u64,
    artifact_dir: PathBuf,
    save_name: Option<String>,
    finished_epochs: u64,
    best_result: f64,
    new_best_result: bool,
}

impl<S: MetricSink, C: CheckpointWriter> TrackingObserver<S, C> {
    pub fn new(session: S, checkpoint: C, config: &TrainingConfig, steps_per_epoch: u64) -> Self {
        Self {
            session,
            checkpoint,
            steps_per_epoch,
            artifact_dir: config.data.artifact_dir.clone(),
            save_name: config.model.save_name.clone(),
            finished_epochs: 0,
            best_result: 0.0,
            new_best_result: false,
        }
    }

    /// Record the run configuration as flat parameters.
    pub fn log_config(&mut self, config: &TrainingConfig) -> Result<(), TrackingError> {
        self.session.log_params(&config.as_params()?)
    }

    /// Log slide-level agreement metrics and confusion matrices at the current step.
    pub fn log_slide_results(&mut self, report: &AgreementReport) -> Result<(), TrackingError> {
        let step = self.current_step();
        self.session.log_metrics(&report.metrics, step)?;
        for (name, matrix) in &report.confusion_matrices {
            self.session.log_artifact(name, &serde_json::to_value(matrix)?)?;
        }
        Ok(())
    }

    pub fn finished_epochs(&self) -> u64 {
        self.finished_epochs
    }

    pub fn best_result(&self) -> f64 {
        self.best_result
    }

    /// Whether the most recent epoch produced a new best model.
    pub fn new_best_result(&self) -> bool {
        self.new_best_result
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    /// Hand the session back, e.g. to close it.
    pub fn into_session(self) -> S {
        self.session
    }

    fn current_step(&self) -> u64 {
        self.finished_epochs * self.steps_per_epoch
    }

    fn record_best(&mut self, value: f64) -> Result<(), TrackingError> {
        self.new_best_result = true;
        self.best_result = value;
        tracing::info!(val_f1_mean = value, epoch = self.finished_epochs, "New best model");
        if let Some(name) = &self.save_name {
            let paths = CheckpointPaths::new(&self.artifact_dir, name);
            paths.prepare()?;
            self.checkpoint.save_weights(&paths)?;
            tracing::info!("Saved checkpoint to {}", paths.head.display());
        }
        let step = self.current_step();
        let best = MetricMap::from([
            (format!("best_{BEST_MODEL_METRIC}"), value),
            ("saved_model_epoch".to_string(), self.finished_epochs as f64),
        ]);
        self.session.log_metrics(&best, step)
    }
}

impl<S: MetricSink, C: CheckpointWriter> TrainingObserver for TrackingObserver<S, C> {
    fn on_batch_end(&mut self, event: &BatchCompleted) -> Result<(), TrackingError> {
        if event.batch % BATCH_LOG_INTERVAL != 0 {
            return Ok(());
        }
        let step = self.current_step() + event.batch;
        self.session.log_metrics(&format_metrics(&event.metrics)?, step)
    }

    fn on_epoch_end(&mut self, event: &EpochCompleted) -> Result<(), TrackingError> {
        self.finished_epochs = event.epoch + 1;
        let step = self.current_step();
        let mut metrics = format_metrics(&event.metrics)?;
        let value = *metrics
            .get(BEST_MODEL_METRIC)
            .ok_or_else(|| TrackingError::MissingMetric(BEST_MODEL_METRIC.to_string()))?;
        metrics.insert("finished_epochs".to_string(), self.finished_epochs as f64);
        self.session.log_metrics(&metrics, step)?;

        if value > self.best_result {
            self.record_best(value)
        } else {
            self.new_best_result = false;
            Ok(())
        }
    }
}
