//! Pseudo-label assignment from tile predictions and slide-level weak labels.
//!
//! Two policies are supported:
//! - [`PseudoLabelMode::Mil`]: per slide, the top-`k` tiles for each weak label take that label.
//! - [`PseudoLabelMode::Ssl`]: per tile, a confident non-background prediction becomes the label.

use std::cmp::Ordering;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tile_table::{TileTable, TileTableError};

/// Confidence a prediction must exceed to become an SSL pseudo-label.
pub const SSL_CONFIDENCE_THRESHOLD: f32 = 0.95;

/// Class treated as negative/background; never emitted as an SSL pseudo-label.
pub const BACKGROUND_CLASS: usize = 0;

#[derive(Debug, Error)]
pub enum PseudoLabelError {
    #[error(transparent)]
    Table(#[from] TileTableError),
    #[error("prediction rows ({predictions}) do not match tile table rows ({tiles})")]
    RowMismatch { predictions: usize, tiles: usize },
    #[error("{indices} prediction indices for {predictions} prediction rows")]
    IndexCountMismatch { indices: usize, predictions: usize },
    #[error("prediction index {index} is outside the tile table ({len} rows)")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("weak label {label} of slide `{wsi}` has no prediction column ({num_classes} classes)")]
    WeakLabelOutOfRange {
        wsi: String,
        label: usize,
        num_classes: usize,
    },
}

/// Pseudo-labeling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PseudoLabelMode {
    #[default]
    Mil,
    Ssl,
}

/// Scatter predictions made on a filtered subset back into full tile-table order.
///
/// Rows of tiles that were not predicted are zero.
pub fn pad_predictions(
    predictions: ArrayView2<'_, f32>,
    prediction_indices: &[usize],
    len: usize,
) -> Result<Array2<f32>, PseudoLabelError> {
    if prediction_indices.len() != predictions.nrows() {
        return Err(PseudoLabelError::IndexCountMismatch {
            indices: prediction_indices.len(),
            predictions: predictions.nrows(),
        });
    }
    let mut padded = Array2::<f32>::zeros((len, predictions.ncols()));
    for (row, &index) in prediction_indices.iter().enumerate() {
        if index >= len {
            return Err(PseudoLabelError::IndexOutOfRange { index, len });
        }
        padded.row_mut(index).assign(&predictions.row(row));
    }
    Ok(padded)
}

/// Assign one pseudo-label per tile; unresolved tiles get `unlabeled_index`.
///
/// `predictions` must already be aligned with `table` (see [`pad_predictions`]).
pub fn assign_pseudo_labels(
    predictions: ArrayView2<'_, f32>,
    table: &TileTable,
    unlabeled_index: usize,
    k: usize,
    mode: PseudoLabelMode,
) -> Result<Vec<usize>, PseudoLabelError> {
    if predictions.nrows() != table.len() {
        return Err(PseudoLabelError::RowMismatch {
            predictions: predictions.nrows(),
            tiles: table.len(),
        });
    }
    let labels = match mode {
        PseudoLabelMode::Mil => mil_pseudo_labels(predictions, table, unlabeled_index, k)?,
        PseudoLabelMode::Ssl => ssl_pseudo_labels(predictions, unlabeled_index),
    };
    let assigned = labels.iter().filter(|&&l| l != unlabeled_index).count();
    tracing::debug!(?mode, assigned, tiles = labels.len(), "Assigned pseudo labels");
    Ok(labels)
}

fn mil_pseudo_labels(
    predictions: ArrayView2<'_, f32>,
    table: &TileTable,
    unlabeled_index: usize,
    k: usize,
) -> Result<Vec<usize>, PseudoLabelError> {
    let mut labels = vec![unlabeled_index; table.len()];
    for block in table.slide_blocks()? {
        let start = block.rows.start;
        if !table.wsi_contains_unlabeled()[start] {
            continue;
        }
        let weak_labels = table.weak_labels().labels_at(start).unwrap_or_default();
        // Secondary runs after primary, so it wins tiles in both top-k sets.
        for label in weak_labels {
            if label >= predictions.ncols() {
                return Err(PseudoLabelError::WeakLabelOutOfRange {
                    wsi: block.wsi.clone(),
                    label,
                    num_classes: predictions.ncols(),
                });
            }
            let scores = predictions.column(label);
            let mut ranked: Vec<usize> = block.rows.clone().collect();
            ranked.sort_by(|&a, &b| scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal));
            for &row in ranked.iter().take(k) {
                labels[row] = label;
            }
        }
    }
    Ok(labels)
}

fn ssl_pseudo_labels(predictions: ArrayView2<'_, f32>, unlabeled_index: usize) -> Vec<usize> {
    predictions
        .rows()
        .into_iter()
        .map(|row| {
            let mut best: Option<(usize, f32)> = None;
            for (class, &p) in row.iter().enumerate() {
                if p <= SSL_CONFIDENCE_THRESHOLD {
                    continue;
                }
                if best.is_none_or(|(_, best_p)| p > best_p) {
                    best = Some((class, p));
                }
            }
            match best {
                Some((class, _)) if class != BACKGROUND_CLASS => class,
                _ => unlabeled_index,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labeling::tile_table::TileRecord;
    use crate::labeling::tile_table::tests::record;
    use ndarray::array;

    fn paired(wsi: &str, primary: usize, secondary: usize) -> TileRecord {
        TileRecord {
            wsi: wsi.to_string(),
            class: Some(4),
            wsi_primary_label: Some(primary),
            wsi_secondary_label: Some(secondary),
            wsi_label: None,
            wsi_contains_unlabeled: Some(true),
        }
    }

    #[test]
    fn mil_top_one_picks_highest_scoring_tile() {
        let table = TileTable::from_records((0..4).map(|_| record("s", 2, 1, true)).collect())
            .unwrap();
        let predictions = array![[0.9, 0.1], [0.1, 0.9], [0.7, 0.3], [0.8, 0.2]];
        let labels =
            assign_pseudo_labels(predictions.view(), &table, 2, 1, PseudoLabelMode::Mil).unwrap();
        assert_eq!(labels, vec![2, 1, 2, 2]);
    }

    #[test]
    fn mil_top_k_assigns_exactly_k_tiles() {
        let table = TileTable::from_records((0..5).map(|_| record("s", 3, 2, true)).collect())
            .unwrap();
        let predictions = array![
            [0.1, 0.1, 0.4],
            [0.1, 0.1, 0.9],
            [0.1, 0.1, 0.2],
            [0.1, 0.1, 0.7],
            [0.1, 0.1, 0.1]
        ];
        let labels =
            assign_pseudo_labels(predictions.view(), &table, 3, 2, PseudoLabelMode::Mil).unwrap();
        assert_eq!(labels, vec![3, 2, 3, 2, 3]);
    }

    #[test]
    fn mil_skips_slides_without_unlabeled_tiles() {
        let table = TileTable::from_records(vec![
            record("a", 1, 1, false),
            record("a", 1, 1, false),
            record("b", 2, 1, true),
            record("b", 2, 1, true),
        ])
        .unwrap();
        let predictions = array![[0.0, 0.9], [0.0, 0.8], [0.0, 0.1], [0.0, 0.2]];
        let labels =
            assign_pseudo_labels(predictions.view(), &table, 2, 1, PseudoLabelMode::Mil).unwrap();
        assert_eq!(labels, vec![2, 2, 2, 1]);
    }

    #[test]
    fn mil_secondary_label_overwrites_primary_on_collision() {
        let table = TileTable::from_records(vec![
            paired("s", 1, 3),
            paired("s", 1, 3),
            paired("s", 1, 3),
        ])
        .unwrap();
        let predictions = array![
            [0.0, 0.9, 0.0, 0.8],
            [0.0, 0.5, 0.0, 0.1],
            [0.0, 0.1, 0.0, 0.2]
        ];
        let labels =
            assign_pseudo_labels(predictions.view(), &table, 4, 1, PseudoLabelMode::Mil).unwrap();
        assert_eq!(labels, vec![3, 4, 4]);
    }

    #[test]
    fn mil_ties_prefer_earlier_tile() {
        let table = TileTable::from_records((0..3).map(|_| record("s", 2, 1, true)).collect())
            .unwrap();
        let predictions = array![[0.0, 0.5], [0.0, 0.5], [0.0, 0.5]];
        let labels =
            assign_pseudo_labels(predictions.view(), &table, 2, 1, PseudoLabelMode::Mil).unwrap();
        assert_eq!(labels, vec![1, 2, 2]);
    }

    #[test]
    fn mil_rejects_scattered_slides() {
        let table = TileTable::from_records(vec![
            record("a", 2, 1, true),
            record("b", 2, 1, true),
            record("a", 2, 1, true),
        ])
        .unwrap();
        let predictions = Array2::<f32>::zeros((3, 2));
        let err = assign_pseudo_labels(predictions.view(), &table, 2, 1, PseudoLabelMode::Mil)
            .unwrap_err();
        assert!(matches!(
            err,
            PseudoLabelError::Table(TileTableError::SlidePartition { .. })
        ));
    }

    #[test]
    fn ssl_only_labels_confident_positive_classes() {
        let table = TileTable::from_records((0..4).map(|_| record("s", 3, 1, true)).collect())
            .unwrap();
        let predictions = array![
            [0.97, 0.02, 0.01],
            [0.01, 0.96, 0.03],
            [0.30, 0.40, 0.30],
            [0.00, 0.04, 0.95]
        ];
        let labels =
            assign_pseudo_labels(predictions.view(), &table, 3, 1, PseudoLabelMode::Ssl).unwrap();
        assert_eq!(labels, vec![3, 1, 3, 3]);
    }

    #[test]
    fn ssl_picks_highest_thresholded_class() {
        let table = TileTable::from_records(vec![record("s", 3, 1, true)]).unwrap();
        let predictions = array![[0.96, 0.99, 0.97]];
        let labels =
            assign_pseudo_labels(predictions.view(), &table, 3, 1, PseudoLabelMode::Ssl).unwrap();
        assert_eq!(labels, vec![1]);
    }

    #[test]
    fn pad_scatters_rows_by_index() {
        let predictions = array![[0.1, 0.9], [0.6, 0.4]];
        let padded = pad_predictions(predictions.view(), &[2, 0], 3).unwrap();
        assert_eq!(padded, array![[0.6, 0.4], [0.0, 0.0], [0.1, 0.9]]);
    }

    #[test]
    fn pad_rejects_index_outside_table() {
        let predictions = array![[0.1, 0.9]];
        let err = pad_predictions(predictions.view(), &[5], 3).unwrap_err();
        assert!(matches!(err, PseudoLabelError::IndexOutOfRange { index: 5, len: 3 }));
    }
}
