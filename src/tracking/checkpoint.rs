//! Model checkpoint locations and the writer collaborator.

use std::path::{Path, PathBuf};

use super::TrackingError;

const MODELS_DIR: &str = "models";

/// Destination of the two weight blobs of one checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointPaths {
    pub feature_extractor: PathBuf,
    pub head: PathBuf,
}

impl CheckpointPaths {
    /// `<artifact_dir>/models/<name>_feature_extractor` and `<name>_head`.
    pub fn new(artifact_dir: &Path, save_name: &str) -> Self {
        let dir = artifact_dir.join(MODELS_DIR);
        Self {
            feature_extractor: dir.join(format!("{save_name}_feature_extractor")),
            head: dir.join(format!("{save_name}_head")),
        }
    }

    /// Create the directory holding both blobs.
    pub fn prepare(&self) -> Result<(), TrackingError> {
        for path in [&self.feature_extractor, &self.head] {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(TrackingError::io(parent))?;
            }
        }
        Ok(())
    }
}

/// Writes model weights; the blobs are opaque to this crate.
pub trait CheckpointWriter {
    fn save_weights(&mut self, paths: &CheckpointPaths) -> Result<(), TrackingError>;
}

impl<F> CheckpointWriter for F
where
    F: FnMut(&CheckpointPaths) -> Result<(), TrackingError>,
{
    fn save_weights(&mut self, paths: &CheckpointPaths) -> Result<(), TrackingError> {
        self(paths)
    }
}
