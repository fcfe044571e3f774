//! Training targets and sample weights for weakly-supervised tile training.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use thiserror::Error;

use super::label_algebra::{blend, one_hot};
use super::pseudo::{PseudoLabelError, PseudoLabelMode, assign_pseudo_labels, pad_predictions};
use super::tile_table::TileTable;
use super::weights::{LabelWeights, sample_weights};

#[derive(Debug, Error)]
pub enum TargetError {
    #[error(transparent)]
    PseudoLabels(#[from] PseudoLabelError),
    #[error("label {label} in row {row} is outside {num_classes} classes")]
    ClassOutOfRange {
        row: usize,
        label: usize,
        num_classes: usize,
    },
    #[error("expected {expected} {what}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("prediction shape {actual:?} does not match expected {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
    /// No weight rule matched the tile.
    #[error("sample in row {row} matched no label weight category")]
    UnweightedSample { row: usize },
    #[error("batch index {index} is outside {len} training targets")]
    BatchIndexOutOfRange { index: usize, len: usize },
}

/// Per-tile targets and weights, aligned with the full tile table.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingTargets {
    /// `tiles x classes`; each row is one-hot or a soft prediction row.
    pub targets: Array2<f32>,
    pub sample_weights: Array1<f32>,
}

impl TrainingTargets {
    pub fn len(&self) -> usize {
        self.sample_weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample_weights.is_empty()
    }

    /// Look up the targets and weights of a batch by tile-table row index.
    pub fn select(&self, indices: &[usize]) -> Result<(Array2<f32>, Array1<f32>), TargetError> {
        if let Some(&index) = indices.iter().find(|&&index| index >= self.len()) {
            return Err(TargetError::BatchIndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        Ok((
            self.targets.select(Axis(0), indices),
            self.sample_weights.select(Axis(0), indices),
        ))
    }
}

/// Pseudo-labeling parameters for one call of [`build_training_targets`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PseudoLabelOptions {
    pub mode: PseudoLabelMode,
    /// Top-`k` tiles per weak label in MIL mode.
    pub labels_per_class: usize,
    pub weights: LabelWeights,
}

/// Ground truth wins wherever it is informative; elsewhere the pseudo-label is used,
/// which may itself still be `unlabeled_index`.
pub fn reconcile(
    gt_labels: &[usize],
    pseudo_labels: &[usize],
    unlabeled_index: usize,
) -> Result<Vec<usize>, TargetError> {
    if gt_labels.len() != pseudo_labels.len() {
        return Err(TargetError::LengthMismatch {
            what: "pseudo labels",
            expected: gt_labels.len(),
            actual: pseudo_labels.len(),
        });
    }
    Ok(gt_labels
        .iter()
        .zip(pseudo_labels)
        .map(|(&gt, &pseudo)| if gt == unlabeled_index { pseudo } else { gt })
        .collect())
}

/// Combine pseudo-labels with tile ground truth into training targets.
///
/// `predictions` covers the rows named by `prediction_indices`; its column count
/// is the number of real classes and doubles as the unlabeled index.
pub fn build_training_targets(
    predictions: ArrayView2<'_, f32>,
    prediction_indices: &[usize],
    table: &TileTable,
    options: &PseudoLabelOptions,
) -> Result<TrainingTargets, TargetError> {
    let unlabeled_index = predictions.ncols();
    check_ground_truth(table.class(), unlabeled_index)?;

    let predictions = pad_predictions(predictions, prediction_indices, table.len())?;
    let pseudo_labels = assign_pseudo_labels(
        predictions.view(),
        table,
        unlabeled_index,
        options.labels_per_class,
        options.mode,
    )?;
    let resolved = reconcile(table.class(), &pseudo_labels, unlabeled_index)?;
    let weights = sample_weights(table.class(), &resolved, &options.weights, unlabeled_index)?;
    let targets = blend(&resolved, predictions.view(), unlabeled_index)?;

    let soft = resolved.iter().filter(|&&l| l == unlabeled_index).count();
    tracing::info!(
        tiles = table.len(),
        soft,
        hard = table.len() - soft,
        "Built training targets"
    );
    Ok(TrainingTargets {
        targets,
        sample_weights: Array1::from(weights),
    })
}

/// Targets from ground truth alone, used before any predictions exist.
///
/// Weights are computed as if every tile had pseudo-label 0. Tiles without
/// ground truth cannot be one-hot encoded and are rejected.
pub fn ground_truth_targets(
    table: &TileTable,
    weights: &LabelWeights,
    num_classes: usize,
) -> Result<TrainingTargets, TargetError> {
    let pseudo_labels = vec![0; table.len()];
    let sample_weights = sample_weights(table.class(), &pseudo_labels, weights, num_classes)?;
    let targets = one_hot(table.class(), num_classes)?;
    Ok(TrainingTargets {
        targets,
        sample_weights: Array1::from(sample_weights),
    })
}

fn check_ground_truth(gt_labels: &[usize], unlabeled_index: usize) -> Result<(), TargetError> {
    match gt_labels.iter().position(|&label| label > unlabeled_index) {
        Some(row) => Err(TargetError::ClassOutOfRange {
            row,
            label: gt_labels[row],
            num_classes: unlabeled_index + 1,
        }),
        None => Ok(()),
    }
}
