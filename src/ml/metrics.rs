//! Agreement metrics over a fixed, ordered label domain.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum MetricsError {
    #[error("truth and prediction lengths differ ({truth} vs {predicted})")]
    LengthMismatch { truth: usize, predicted: usize },
    #[error("no samples to score")]
    Empty,
    #[error("label {0} is not part of the label domain")]
    UnknownLabel(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Confusion matrix over an ordered label domain.
pub struct ConfusionMatrix {
    /// Label values, in row/column order.
    pub labels: Vec<i64>,
    /// Row-major `KxK` counts (`truth * K + predicted`).
    pub counts: Vec<u32>,
}

impl ConfusionMatrix {
    /// Create an empty matrix; every domain label gets a row and column.
    pub fn new(labels: &[i64]) -> Self {
        Self {
            labels: labels.to_vec(),
            counts: vec![0; labels.len() * labels.len()],
        }
    }

    /// Count paired samples; labels outside the domain are rejected.
    pub fn from_pairs(labels: &[i64], truth: &[i64], predicted: &[i64]) -> Result<Self, MetricsError> {
        if truth.len() != predicted.len() {
            return Err(MetricsError::LengthMismatch {
                truth: truth.len(),
                predicted: predicted.len(),
            });
        }
        let mut cm = Self::new(labels);
        for (&t, &p) in truth.iter().zip(predicted) {
            let t = cm.index_of(t)?;
            let p = cm.index_of(p)?;
            cm.add(t, p);
        }
        Ok(cm)
    }

    pub fn n_classes(&self) -> usize {
        self.labels.len()
    }

    pub fn add(&mut self, truth: usize, predicted: usize) {
        let k = self.n_classes();
        if truth >= k || predicted >= k {
            return;
        }
        let idx = truth * k + predicted;
        self.counts[idx] = self.counts[idx].saturating_add(1);
    }

    pub fn get(&self, truth: usize, predicted: usize) -> u32 {
        self.counts[truth * self.n_classes() + predicted]
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().map(|&c| c as u64).sum()
    }

    /// Rows as nested vectors, for reports.
    pub fn rows(&self) -> Vec<Vec<u32>> {
        self.counts
            .chunks(self.n_classes().max(1))
            .map(|row| row.to_vec())
            .collect()
    }

    fn index_of(&self, label: i64) -> Result<usize, MetricsError> {
        self.labels
            .iter()
            .position(|&l| l == label)
            .ok_or(MetricsError::UnknownLabel(label))
    }
}

/// Cohen's kappa with quadratic weights `(i - j)^2` over domain positions.
///
/// When both raters put every sample in the same single class the expected
/// disagreement is zero; agreement is then perfect and the score is 1.
pub fn quadratic_weighted_kappa(cm: &ConfusionMatrix) -> Result<f64, MetricsError> {
    let k = cm.n_classes();
    let total = cm.total() as f64;
    if total == 0.0 {
        return Err(MetricsError::Empty);
    }
    let mut row_sums = vec![0f64; k];
    let mut col_sums = vec![0f64; k];
    for truth in 0..k {
        for predicted in 0..k {
            let v = cm.get(truth, predicted) as f64;
            row_sums[truth] += v;
            col_sums[predicted] += v;
        }
    }

    let mut observed = 0f64;
    let mut expected = 0f64;
    for truth in 0..k {
        for predicted in 0..k {
            let diff = truth as f64 - predicted as f64;
            let weight = diff * diff;
            observed += weight * cm.get(truth, predicted) as f64;
            expected += weight * row_sums[truth] * col_sums[predicted] / total;
        }
    }
    if expected == 0.0 {
        return Ok(if observed == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - observed / expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &[i64] = &[0, 1, 2, 3];

    #[test]
    fn matrix_keeps_empty_classes() {
        let cm = ConfusionMatrix::from_pairs(DOMAIN, &[0, 1], &[0, 2]).unwrap();
        assert_eq!(cm.rows().len(), 4);
        assert_eq!(cm.get(0, 0), 1);
        assert_eq!(cm.get(1, 2), 1);
        assert_eq!(cm.rows()[3], vec![0, 0, 0, 0]);
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = ConfusionMatrix::from_pairs(DOMAIN, &[7], &[0]).unwrap_err();
        assert_eq!(err, MetricsError::UnknownLabel(7));
    }

    #[test]
    fn identical_ratings_have_kappa_one() {
        let labels = [0, 1, 2, 3, 3, 1];
        let cm = ConfusionMatrix::from_pairs(DOMAIN, &labels, &labels).unwrap();
        assert!((quadratic_weighted_kappa(&cm).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_class_agreement_is_perfect() {
        let cm = ConfusionMatrix::from_pairs(DOMAIN, &[2, 2], &[2, 2]).unwrap();
        assert_eq!(quadratic_weighted_kappa(&cm).unwrap(), 1.0);
    }

    #[test]
    fn matches_reference_value() {
        // sklearn: cohen_kappa_score([0, 1, 2, 3], [0, 2, 2, 3], weights="quadratic") == 0.9
        let cm = ConfusionMatrix::from_pairs(DOMAIN, &[0, 1, 2, 3], &[0, 2, 2, 3]).unwrap();
        let kappa = quadratic_weighted_kappa(&cm).unwrap();
        assert!((kappa - 0.9).abs() < 1e-9, "kappa {kappa}");
    }

    #[test]
    fn reversed_ratings_stay_in_bounds() {
        let cm = ConfusionMatrix::from_pairs(DOMAIN, &[0, 1, 2, 3], &[3, 2, 1, 0]).unwrap();
        let kappa = quadratic_weighted_kappa(&cm).unwrap();
        assert!((-1.0..=1.0).contains(&kappa));
        assert!((kappa + 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_matrix_has_no_kappa() {
        let cm = ConfusionMatrix::new(DOMAIN);
        assert_eq!(quadratic_weighted_kappa(&cm), Err(MetricsError::Empty));
    }
}
