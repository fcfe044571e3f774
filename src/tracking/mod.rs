//! Experiment tracking: run sessions, metric formatting, checkpoints and the
//! training-event observer that ties them together.

pub mod checkpoint;
pub mod format;
pub mod observer;
pub mod session;

pub use checkpoint::{CheckpointPaths, CheckpointWriter};
pub use format::{MetricMap, MetricValue, RawMetrics, format_metrics};
pub use observer::{BatchCompleted, EpochCompleted, TrackingObserver, TrainingObserver};
pub use session::{FileSession, MetricSink};

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackingError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("metric `{0}` is missing")]
    MissingMetric(String),
    #[error("metric `{name}` is invalid: {reason}")]
    InvalidMetric { name: String, reason: &'static str },
    #[error("invalid run name `{0}`")]
    InvalidRunName(String),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl TrackingError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
