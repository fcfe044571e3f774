//! Tracking sessions: an explicit handle for one training run.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::TrackingError;
use super::format::MetricMap;

const PARAMS_FILE: &str = "params.json";
const METRICS_FILE: &str = "metrics.jsonl";
const RUN_FILE: &str = "run.json";
const ARTIFACTS_DIR: &str = "artifacts";

/// Destination for run parameters, step metrics and JSON artifacts.
pub trait MetricSink {
    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), TrackingError>;
    fn log_metrics(&mut self, metrics: &MetricMap, step: u64) -> Result<(), TrackingError>;
    fn log_artifact(&mut self, name: &str, artifact: &serde_json::Value) -> Result<(), TrackingError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Finished,
}

/// Contents of `run.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub experiment: String,
    pub run_name: String,
    pub status: RunStatus,
    pub started_at: i64,
    #[serde(default)]
    pub ended_at: Option<i64>,
}

#[derive(Debug, Serialize)]
struct MetricRecord<'a> {
    name: &'a str,
    value: f64,
    step: u64,
}

/// File-backed session writing under `<tracking_dir>/<experiment>/<run_name>`.
///
/// The run directory gets a numeric suffix when the name is already taken.
/// Call [`FileSession::close`] to mark the run finished.
#[derive(Debug)]
pub struct FileSession {
    run_dir: PathBuf,
    info: RunInfo,
    metrics: BufWriter<File>,
}

impl FileSession {
    pub fn open(tracking_dir: &Path, experiment: &str, run_name: &str) -> Result<Self, TrackingError> {
        for name in [experiment, run_name] {
            if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
                return Err(TrackingError::InvalidRunName(name.to_string()));
            }
        }
        let experiment_dir = tracking_dir.join(experiment);
        let run_dir = unique_run_dir(&experiment_dir, run_name);
        std::fs::create_dir_all(run_dir.join(ARTIFACTS_DIR))
            .map_err(TrackingError::io(&run_dir))?;

        let metrics_path = run_dir.join(METRICS_FILE);
        let metrics = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&metrics_path)
            .map_err(TrackingError::io(&metrics_path))?;
        let info = RunInfo {
            experiment: experiment.to_string(),
            run_name: run_name.to_string(),
            status: RunStatus::Running,
            started_at: OffsetDateTime::now_utc().unix_timestamp(),
            ended_at: None,
        };
        let session = Self {
            run_dir,
            info,
            metrics: BufWriter::new(metrics),
        };
        session.write_json(RUN_FILE, &session.info)?;
        tracing::info!("Opened tracking run at {}", session.run_dir.display());
        Ok(session)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    /// Flush pending metrics and mark the run finished.
    pub fn close(mut self) -> Result<RunInfo, TrackingError> {
        self.metrics
            .flush()
            .map_err(TrackingError::io(self.run_dir.join(METRICS_FILE)))?;
        self.info.status = RunStatus::Finished;
        self.info.ended_at = Some(OffsetDateTime::now_utc().unix_timestamp());
        self.write_json(RUN_FILE, &self.info)?;
        tracing::info!("Closed tracking run at {}", self.run_dir.display());
        Ok(self.info)
    }

    fn write_json(&self, relative: impl AsRef<Path>, value: &impl Serialize) -> Result<(), TrackingError> {
        let path = self.run_dir.join(relative);
        let data = serde_json::to_vec_pretty(value)?;
        std::fs::write(&path, data).map_err(TrackingError::io(path))
    }
}

impl MetricSink for FileSession {
    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), TrackingError> {
        self.write_json(PARAMS_FILE, params)
    }

    fn log_metrics(&mut self, metrics: &MetricMap, step: u64) -> Result<(), TrackingError> {
        for (name, &value) in metrics {
            let line = serde_json::to_string(&MetricRecord { name, value, step })?;
            writeln!(self.metrics, "{line}")
                .map_err(TrackingError::io(self.run_dir.join(METRICS_FILE)))?;
        }
        Ok(())
    }

    fn log_artifact(&mut self, name: &str, artifact: &serde_json::Value) -> Result<(), TrackingError> {
        self.write_json(Path::new(ARTIFACTS_DIR).join(format!("{name}.json")), artifact)
    }
}

fn unique_run_dir(experiment_dir: &Path, run_name: &str) -> PathBuf {
    let candidate = experiment_dir.join(run_name);
    if !candidate.exists() {
        return candidate;
    }
    (2..)
        .map(|idx| experiment_dir.join(format!("{run_name}_{idx}")))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

/// In-memory sink for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    pub params: BTreeMap<String, String>,
    pub metrics: Vec<(u64, MetricMap)>,
    pub artifacts: BTreeMap<String, serde_json::Value>,
}

#[cfg(test)]
impl MemorySink {
    pub fn metric(&self, name: &str) -> Vec<(u64, f64)> {
        self.metrics
            .iter()
            .filter_map(|(step, map)| map.get(name).map(|v| (*step, *v)))
            .collect()
    }
}

#[cfg(test)]
impl MetricSink for MemorySink {
    fn log_params(&mut self, params: &BTreeMap<String, String>) -> Result<(), TrackingError> {
        self.params.extend(params.clone());
        Ok(())
    }

    fn log_metrics(&mut self, metrics: &MetricMap, step: u64) -> Result<(), TrackingError> {
        self.metrics.push((step, metrics.clone()));
        Ok(())
    }

    fn log_artifact(&mut self, name: &str, artifact: &serde_json::Value) -> Result<(), TrackingError> {
        self.artifacts.insert(name.to_string(), artifact.clone());
        Ok(())
    }
}
