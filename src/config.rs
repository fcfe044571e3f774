//! Typed training configuration loaded from TOML.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::app_dirs;
use crate::labeling::{LabelWeights, PseudoLabelMode, PseudoLabelOptions};

/// Default filename of the configuration inside the app directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Errors that may occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Failed to parse TOML config.
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    SerializeToml(#[from] toml::ser::Error),
    /// A field holds a value outside its allowed range.
    #[error("Invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error(transparent)]
    AppDir(#[from] app_dirs::AppDirError),
}

/// Complete training configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainingConfig {
    pub data: DataSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub pseudo_labels: PseudoLabelSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataSettings {
    /// Experiment name used by the tracking session.
    pub dataset_name: String,
    /// Root for models and other run outputs.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    #[serde(default = "default_tracking_dir")]
    pub tracking_dir: PathBuf,
    #[serde(default = "default_run_name")]
    pub run_name: String,
    /// Log file directory; the app logs directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            tracking_dir: default_tracking_dir(),
            run_name: default_run_name(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelSettings {
    /// Base name for checkpoints; no checkpoints are written when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_name: Option<String>,
}

/// Controls how weak slide labels become tile training labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PseudoLabelSettings {
    #[serde(default)]
    pub mode: PseudoLabelMode,
    #[serde(default = "default_labels_per_class")]
    pub number_of_pseudo_labels_per_class: usize,
    #[serde(default)]
    pub label_weights: LabelWeights,
}

impl Default for PseudoLabelSettings {
    fn default() -> Self {
        Self {
            mode: PseudoLabelMode::default(),
            number_of_pseudo_labels_per_class: default_labels_per_class(),
            label_weights: LabelWeights::default(),
        }
    }
}

impl PseudoLabelSettings {
    pub fn options(&self) -> PseudoLabelOptions {
        PseudoLabelOptions {
            mode: self.mode,
            labels_per_class: self.number_of_pseudo_labels_per_class,
            weights: self.label_weights,
        }
    }
}

impl TrainingConfig {
    /// Configuration with defaults everywhere except the required dataset name.
    pub fn with_dataset_name(dataset_name: impl Into<String>) -> Self {
        Self {
            data: DataSettings {
                dataset_name: dataset_name.into(),
                artifact_dir: default_artifact_dir(),
            },
            logging: LoggingSettings::default(),
            model: ModelSettings::default(),
            pseudo_labels: PseudoLabelSettings::default(),
        }
    }

    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        tracing::debug!("Loaded training config from {}", path.display());
        Ok(config)
    }

    /// Load `config.toml` from the app directory, if present.
    pub fn load_from_app_dir() -> Result<Option<Self>, ConfigError> {
        let path = app_dirs::app_root_dir()?.join(CONFIG_FILE_NAME);
        if !path.exists() {
            return Ok(None);
        }
        Self::load(&path).map(Some)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data.dataset_name.trim().is_empty() {
            return Err(invalid("data.dataset_name", "must not be empty"));
        }
        if self.logging.run_name.trim().is_empty() {
            return Err(invalid("logging.run_name", "must not be empty"));
        }
        if self
            .model
            .save_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(invalid("model.save_name", "must not be empty when set"));
        }
        if self.pseudo_labels.number_of_pseudo_labels_per_class == 0 {
            return Err(invalid(
                "pseudo_labels.number_of_pseudo_labels_per_class",
                "must be > 0",
            ));
        }
        let weights = &self.pseudo_labels.label_weights;
        for (field, value) in [
            ("pseudo_labels.label_weights.positive_gt_labels", weights.positive_gt_labels),
            ("pseudo_labels.label_weights.negative_gt_labels", weights.negative_gt_labels),
            ("pseudo_labels.label_weights.pseudo_labels", weights.pseudo_labels),
            ("pseudo_labels.label_weights.soft_labels", weights.soft_labels),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(field, format!("{value} must be finite and >= 0")));
            }
        }
        Ok(())
    }

    /// Flatten into dotted `section.key -> value` pairs for run parameter logging.
    pub fn as_params(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let value = toml::Value::try_from(self)?;
        let mut params = BTreeMap::new();
        flatten_value("", &value, &mut params);
        Ok(params)
    }
}

fn flatten_value(prefix: &str, value: &toml::Value, out: &mut BTreeMap<String, String>) {
    match value {
        toml::Value::Table(table) => {
            for (key, child) in table {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_value(&key, child, out);
            }
        }
        toml::Value::String(text) => {
            out.insert(prefix.to_string(), text.clone());
        }
        other => {
            out.insert(prefix.to_string(), other.to_string());
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_tracking_dir() -> PathBuf {
    PathBuf::from("runs")
}

fn default_run_name() -> String {
    "run".to_string()
}

fn default_labels_per_class() -> usize {
    10
}
