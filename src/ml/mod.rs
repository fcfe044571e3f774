//! Machine learning helpers shared by labeling and grading.

pub mod metrics;

pub use metrics::{ConfusionMatrix, MetricsError, quadratic_weighted_kappa};
