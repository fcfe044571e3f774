//! One-hot encoding and the one-hot/soft label blend used for training targets.

use ndarray::{Array2, ArrayView2, s};

use super::targets::TargetError;

/// Expand class indices into a `labels.len() x num_classes` one-hot matrix.
pub fn one_hot(labels: &[usize], num_classes: usize) -> Result<Array2<f32>, TargetError> {
    let mut out = Array2::<f32>::zeros((labels.len(), num_classes));
    for (row, &label) in labels.iter().enumerate() {
        if label >= num_classes {
            return Err(TargetError::ClassOutOfRange {
                row,
                label,
                num_classes,
            });
        }
        out[(row, label)] = 1.0;
    }
    Ok(out)
}

/// Build training targets that are one-hot where the label is resolved and equal to the
/// prediction row where it is not.
///
/// Labels are encoded over `unlabeled_index + 1` classes; rows whose extra column is hot
/// take the prediction row, and the extra column is dropped from every row.
pub fn blend(
    resolved_labels: &[usize],
    predictions: ArrayView2<'_, f32>,
    unlabeled_index: usize,
) -> Result<Array2<f32>, TargetError> {
    if predictions.nrows() != resolved_labels.len() || predictions.ncols() != unlabeled_index {
        return Err(TargetError::ShapeMismatch {
            expected: (resolved_labels.len(), unlabeled_index),
            actual: predictions.dim(),
        });
    }
    let with_unlabeled = one_hot(resolved_labels, unlabeled_index + 1)?;
    let mut out = with_unlabeled.slice(s![.., ..unlabeled_index]).to_owned();
    for (row, mut target) in out.rows_mut().into_iter().enumerate() {
        if with_unlabeled[(row, unlabeled_index)] == 1.0 {
            target.assign(&predictions.row(row));
        }
    }
    Ok(out)
}
