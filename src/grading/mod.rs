//! Clinical grading of prostate-cancer slides and agreement scoring.

pub mod agreement;
pub mod gleason;

pub use agreement::{AgreementReport, SlideScore, score_agreement, slide_scores};
pub use gleason::{GRADE_BINS, GleasonGrade, grade_from_counts};

use thiserror::Error;

use crate::ml::metrics::MetricsError;

#[derive(Debug, Error)]
pub enum GradingError {
    /// The pattern pair has no ISUP grade group.
    #[error("no ISUP grade for Gleason {}+{}", .0.primary, .0.secondary)]
    UnknownIsupPair(GleasonGrade),
    #[error("{predicted} predicted slides but {truth} ground-truth slides")]
    SlideCountMismatch { predicted: usize, truth: usize },
    #[error(transparent)]
    Metrics(#[from] MetricsError),
}
