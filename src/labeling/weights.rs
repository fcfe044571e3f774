//! Per-sample training weights chosen by label provenance.

use serde::{Deserialize, Serialize};

use super::targets::TargetError;

/// Weight applied to each label provenance category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LabelWeights {
    /// Informative, non-background ground truth.
    #[serde(default = "default_weight")]
    pub positive_gt_labels: f32,
    /// Background (class 0) ground truth.
    #[serde(default = "default_weight")]
    pub negative_gt_labels: f32,
    /// Unlabeled tiles resolved by pseudo-labeling.
    #[serde(default = "default_weight")]
    pub pseudo_labels: f32,
    /// Tiles left unresolved, trained on their own predictions.
    #[serde(default = "default_weight")]
    pub soft_labels: f32,
}

impl Default for LabelWeights {
    fn default() -> Self {
        Self {
            positive_gt_labels: default_weight(),
            negative_gt_labels: default_weight(),
            pseudo_labels: default_weight(),
            soft_labels: default_weight(),
        }
    }
}

fn default_weight() -> f32 {
    1.0
}

/// Compute one weight per tile.
///
/// Rules are applied in order and later matches override earlier ones:
/// negative ground truth, then pseudo-label (resolved and ground truth not 0),
/// then positive ground truth, then soft label (both unresolved).
/// A tile matching no rule is an error.
pub fn sample_weights(
    gt_labels: &[usize],
    resolved_labels: &[usize],
    weights: &LabelWeights,
    unlabeled_index: usize,
) -> Result<Vec<f32>, TargetError> {
    if gt_labels.len() != resolved_labels.len() {
        return Err(TargetError::LengthMismatch {
            what: "resolved labels",
            expected: gt_labels.len(),
            actual: resolved_labels.len(),
        });
    }
    let mut out = Vec::with_capacity(gt_labels.len());
    for (row, (&gt, &resolved)) in gt_labels.iter().zip(resolved_labels).enumerate() {
        let mut weight = None;
        if gt == 0 {
            weight = Some(weights.negative_gt_labels);
        }
        // Also fires for informative positive ground truth; the next rule overrides it.
        if resolved != unlabeled_index && gt != 0 {
            weight = Some(weights.pseudo_labels);
        }
        if gt != 0 && gt != unlabeled_index {
            weight = Some(weights.positive_gt_labels);
        }
        if resolved == unlabeled_index && gt == unlabeled_index {
            weight = Some(weights.soft_labels);
        }
        out.push(weight.ok_or(TargetError::UnweightedSample { row })?);
    }
    Ok(out)
}
