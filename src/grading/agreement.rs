//! Slide-level agreement between predicted and ground-truth Gleason grades.

use std::collections::BTreeMap;

use serde::Serialize;

use super::{GleasonGrade, GradingError};
use crate::ml::metrics::{ConfusionMatrix, quadratic_weighted_kappa};

/// Gleason score values that appear in reports.
pub const GLEASON_SCORE_LABELS: &[i64] = &[0, 6, 7, 8, 9, 10];
/// ISUP grade groups.
pub const ISUP_GRADE_LABELS: &[i64] = &[0, 1, 2, 3, 4, 5];

pub const GS_KAPPA_METRIC: &str = "wsi_gs_cohens_quadratic_kappa";
pub const ISUP_KAPPA_METRIC: &str = "wsi_isup_cohens_quadratic_kappa";
pub const GS_CONFUSION_ARTIFACT: &str = "wsi_gs_confusion_matrix";
pub const ISUP_CONFUSION_ARTIFACT: &str = "wsi_isup_confusion_matrix";

/// Gleason score and ISUP grade of one slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlideScore {
    pub gleason_score: u16,
    pub isup_grade: u8,
}

/// Derive score and ISUP grade for every slide, failing on the first unknown pair.
pub fn slide_scores(grades: &[GleasonGrade]) -> Result<Vec<SlideScore>, GradingError> {
    grades
        .iter()
        .map(|grade| {
            let isup_grade = grade.isup_grade()?;
            Ok(SlideScore {
                gleason_score: grade.gleason_score(),
                isup_grade,
            })
        })
        .collect()
}

/// Kappa metrics, confusion-matrix artifacts and the combined objective.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgreementReport {
    pub metrics: BTreeMap<String, f64>,
    pub confusion_matrices: BTreeMap<String, ConfusionMatrix>,
    /// Mean of the Gleason-score and ISUP kappas.
    pub objective: f64,
}

/// Compare predicted slide grades against ground truth, slide by slide.
///
/// Confusion matrices have ground truth on rows and predictions on columns.
pub fn score_agreement(
    predicted: &[GleasonGrade],
    truth: &[GleasonGrade],
) -> Result<AgreementReport, GradingError> {
    if predicted.len() != truth.len() {
        return Err(GradingError::SlideCountMismatch {
            predicted: predicted.len(),
            truth: truth.len(),
        });
    }
    let predicted = slide_scores(predicted)?;
    let truth = slide_scores(truth)?;

    let gs_cm = ConfusionMatrix::from_pairs(
        GLEASON_SCORE_LABELS,
        &truth.iter().map(|s| s.gleason_score as i64).collect::<Vec<_>>(),
        &predicted.iter().map(|s| s.gleason_score as i64).collect::<Vec<_>>(),
    )?;
    let isup_cm = ConfusionMatrix::from_pairs(
        ISUP_GRADE_LABELS,
        &truth.iter().map(|s| s.isup_grade as i64).collect::<Vec<_>>(),
        &predicted.iter().map(|s| s.isup_grade as i64).collect::<Vec<_>>(),
    )?;
    let gs_kappa = quadratic_weighted_kappa(&gs_cm)?;
    let isup_kappa = quadratic_weighted_kappa(&isup_cm)?;
    tracing::info!(slides = truth.len(), gs_kappa, isup_kappa, "Scored slide agreement");

    let metrics = BTreeMap::from([
        (GS_KAPPA_METRIC.to_string(), gs_kappa),
        (ISUP_KAPPA_METRIC.to_string(), isup_kappa),
    ]);
    let confusion_matrices = BTreeMap::from([
        (GS_CONFUSION_ARTIFACT.to_string(), gs_cm),
        (ISUP_CONFUSION_ARTIFACT.to_string(), isup_cm),
    ]);
    Ok(AgreementReport {
        metrics,
        confusion_matrices,
        objective: (gs_kappa + isup_kappa) / 2.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::metrics::MetricsError;

    fn g(primary: u8, secondary: u8) -> GleasonGrade {
        GleasonGrade::new(primary, secondary)
    }

    #[test]
    fn identical_grades_score_perfectly() {
        let grades = [g(0, 0), g(3, 4), g(4, 3), g(5, 5)];
        let report = score_agreement(&grades, &grades).unwrap();
        assert_eq!(report.metrics[GS_KAPPA_METRIC], 1.0);
        assert_eq!(report.metrics[ISUP_KAPPA_METRIC], 1.0);
        assert_eq!(report.objective, 1.0);
    }

    #[test]
    fn confusion_matrices_cover_full_domain() {
        let report = score_agreement(&[g(3, 3), g(4, 4)], &[g(3, 3), g(3, 4)]).unwrap();
        let gs = &report.confusion_matrices[GS_CONFUSION_ARTIFACT];
        assert_eq!(gs.n_classes(), 6);
        // truth 6 -> predicted 6, truth 7 -> predicted 8
        assert_eq!(gs.get(1, 1), 1);
        assert_eq!(gs.get(2, 3), 1);
        let isup = &report.confusion_matrices[ISUP_CONFUSION_ARTIFACT];
        assert_eq!(isup.get(1, 1), 1);
        assert_eq!(isup.get(2, 4), 1);
        assert_eq!(isup.rows()[5], vec![0; 6]);
    }

    #[test]
    fn objective_is_mean_of_kappas() {
        let truth = [g(0, 0), g(3, 3), g(4, 4), g(5, 5), g(3, 4)];
        let predicted = [g(0, 0), g(3, 4), g(4, 4), g(4, 5), g(4, 3)];
        let report = score_agreement(&predicted, &truth).unwrap();
        let mean = (report.metrics[GS_KAPPA_METRIC] + report.metrics[ISUP_KAPPA_METRIC]) / 2.0;
        assert!((report.objective - mean).abs() < 1e-12);
        assert!(report.objective < 1.0);
    }

    #[test]
    fn unknown_pair_aborts_scoring() {
        let err = score_agreement(&[g(3, 0)], &[g(3, 3)]).unwrap_err();
        assert!(matches!(err, GradingError::UnknownIsupPair(_)));
    }

    #[test]
    fn out_of_range_patterns_are_rejected() {
        let err = score_agreement(&[g(200, 100)], &[g(3, 3)]).unwrap_err();
        assert!(matches!(err, GradingError::UnknownIsupPair(pair) if pair == g(200, 100)));
    }

    #[test]
    fn slide_counts_must_match() {
        let err = score_agreement(&[g(3, 3)], &[]).unwrap_err();
        assert!(matches!(err, GradingError::SlideCountMismatch { predicted: 1, truth: 0 }));
    }

    #[test]
    fn no_slides_is_an_error() {
        let err = score_agreement(&[], &[]).unwrap_err();
        assert!(matches!(err, GradingError::Metrics(MetricsError::Empty)));
    }
}
