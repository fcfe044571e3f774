//! Pseudo-label training targets and clinical grading for whole-slide images.
/// Application directory helpers.
pub mod app_dirs;
/// Typed training configuration.
pub mod config;
/// Gleason/ISUP grading and agreement scoring.
pub mod grading;
/// Tile label propagation, sample weights and training targets.
pub mod labeling;
/// Logging setup.
pub mod logging;
/// Shared metrics.
pub mod ml;
/// Experiment tracking and training-loop events.
pub mod tracking;
