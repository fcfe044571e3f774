//! Flattening of training-loop metrics into scalar name/value pairs.

use std::collections::BTreeMap;

use super::TrackingError;

const F1_SCORE: &str = "f1_score";
const VALIDATION_PREFIX: &str = "val_";

/// Metric as reported by the training loop.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Scalar(f64),
    /// One value per class, e.g. F1 score.
    PerClass(Vec<f64>),
}

pub type RawMetrics = BTreeMap<String, MetricValue>;
pub type MetricMap = BTreeMap<String, f64>;

/// Flatten metrics, breaking per-class F1 out into `f1_class_id_<i>` and `f1_mean`.
///
/// `f1_score` is required; `val_f1_score` is handled the same way when present.
pub fn format_metrics(raw: &RawMetrics) -> Result<MetricMap, TrackingError> {
    let validation_f1 = format!("{VALIDATION_PREFIX}{F1_SCORE}");
    let prefixes: &[&str] = if raw.contains_key(&validation_f1) {
        &[VALIDATION_PREFIX, ""]
    } else {
        &[""]
    };

    let mut out = MetricMap::new();
    for prefix in prefixes {
        let key = format!("{prefix}{F1_SCORE}");
        let scores = match raw.get(&key) {
            Some(MetricValue::PerClass(scores)) if !scores.is_empty() => scores,
            Some(_) => {
                return Err(TrackingError::InvalidMetric {
                    name: key,
                    reason: "expected one score per class",
                });
            }
            None => return Err(TrackingError::MissingMetric(key)),
        };
        for (class_id, score) in scores.iter().enumerate() {
            out.insert(format!("{prefix}f1_class_id_{class_id}"), *score);
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        out.insert(format!("{prefix}f1_mean"), mean);
    }

    for (name, value) in raw {
        if prefixes.iter().any(|p| *name == format!("{p}{F1_SCORE}")) {
            continue;
        }
        match value {
            MetricValue::Scalar(v) => {
                out.insert(name.clone(), *v);
            }
            MetricValue::PerClass(_) => {
                return Err(TrackingError::InvalidMetric {
                    name: name.clone(),
                    reason: "only f1_score may be reported per class",
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(entries: &[(&str, MetricValue)]) -> RawMetrics {
        entries
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn breaks_out_training_f1() {
        let metrics = format_metrics(&raw(&[
            ("loss", MetricValue::Scalar(0.4)),
            ("f1_score", MetricValue::PerClass(vec![0.2, 0.6])),
        ]))
        .unwrap();
        assert_eq!(metrics["f1_class_id_0"], 0.2);
        assert_eq!(metrics["f1_class_id_1"], 0.6);
        assert!((metrics["f1_mean"] - 0.4).abs() < 1e-12);
        assert_eq!(metrics["loss"], 0.4);
        assert!(!metrics.contains_key("f1_score"));
    }

    #[test]
    fn breaks_out_validation_f1_when_present() {
        let metrics = format_metrics(&raw(&[
            ("f1_score", MetricValue::PerClass(vec![1.0])),
            ("val_f1_score", MetricValue::PerClass(vec![0.5, 0.7])),
            ("val_loss", MetricValue::Scalar(0.9)),
        ]))
        .unwrap();
        assert_eq!(metrics["val_f1_class_id_1"], 0.7);
        assert!((metrics["val_f1_mean"] - 0.6).abs() < 1e-12);
        assert_eq!(metrics["f1_mean"], 1.0);
        assert_eq!(metrics["val_loss"], 0.9);
        assert_eq!(metrics.len(), 6);
    }

    #[test]
    fn missing_f1_is_an_error() {
        let err = format_metrics(&raw(&[("loss", MetricValue::Scalar(0.1))])).unwrap_err();
        assert!(matches!(err, TrackingError::MissingMetric(name) if name == "f1_score"));
    }

    #[test]
    fn other_per_class_metrics_are_rejected() {
        let err = format_metrics(&raw(&[
            ("f1_score", MetricValue::PerClass(vec![1.0])),
            ("precision", MetricValue::PerClass(vec![1.0])),
        ]))
        .unwrap_err();
        assert!(matches!(err, TrackingError::InvalidMetric { .. }));
    }
}
