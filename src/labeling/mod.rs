//! Tile label propagation for weakly-supervised slide training.
//!
//! Slide-level weak labels are pushed down to tiles as pseudo-labels, reconciled with
//! tile ground truth, weighted by provenance, and turned into training targets.

pub mod label_algebra;
pub mod pseudo;
pub mod targets;
pub mod tile_table;
pub mod weights;

pub use label_algebra::{blend, one_hot};
pub use pseudo::{
    PseudoLabelError, PseudoLabelMode, SSL_CONFIDENCE_THRESHOLD, assign_pseudo_labels,
    pad_predictions,
};
pub use targets::{
    PseudoLabelOptions, TargetError, TrainingTargets, build_training_targets,
    ground_truth_targets, reconcile,
};
pub use tile_table::{SlideBlock, TileRecord, TileTable, TileTableError, WeakLabelColumns};
pub use weights::{LabelWeights, sample_weights};
