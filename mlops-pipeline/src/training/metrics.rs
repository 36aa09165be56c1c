//! Binary classification metrics.

use crate::artifact::ClassificationMetric;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Label treated as the positive class.
pub const POSITIVE_LABEL: f64 = 1.0;

/// Confusion counts against a positive label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionCounts {
    pub true_positive: usize,
    pub false_positive: usize,
    pub true_negative: usize,
    pub false_negative: usize,
}

impl ConfusionCounts {
    pub fn from_predictions(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Self {
        let mut counts = Self::default();
        for (&t, &p) in y_true.iter().zip(y_pred.iter()) {
            match (t == POSITIVE_LABEL, p == POSITIVE_LABEL) {
                (true, true) => counts.true_positive += 1,
                (false, true) => counts.false_positive += 1,
                (true, false) => counts.false_negative += 1,
                (false, false) => counts.true_negative += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.true_positive + self.false_positive + self.true_negative + self.false_negative
    }

    /// Zero when nothing was predicted positive.
    pub fn precision(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_positive)
    }

    /// Zero when there are no positive samples.
    pub fn recall(&self) -> f64 {
        ratio(self.true_positive, self.true_positive + self.false_negative)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 { 0.0 } else { 2.0 * p * r / (p + r) }
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positive + self.true_negative, self.total())
    }

    pub fn metric(&self) -> ClassificationMetric {
        ClassificationMetric {
            f1_score: self.f1(),
            precision_score: self.precision(),
            recall_score: self.recall(),
            accuracy: self.accuracy(),
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

/// F1, precision, recall and accuracy of `y_pred` against `y_true`.
pub fn classification_metric(
    y_true: ArrayView1<'_, f64>,
    y_pred: ArrayView1<'_, f64>,
) -> ClassificationMetric {
    ConfusionCounts::from_predictions(y_true, y_pred).metric()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_metrics_from_confusion() {
        let y_true = array![1.0, 1.0, 1.0, 0.0, 0.0, 0.0];
        let y_pred = array![1.0, 1.0, 0.0, 1.0, 0.0, 0.0];
        let counts = ConfusionCounts::from_predictions(y_true.view(), y_pred.view());
        assert_eq!(
            counts,
            ConfusionCounts {
                true_positive: 2,
                false_positive: 1,
                true_negative: 2,
                false_negative: 1,
            }
        );
        let m = counts.metric();
        assert!((m.precision_score - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.recall_score - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.f1_score - 2.0 / 3.0).abs() < 1e-12);
        assert!((m.accuracy - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_no_positive_predictions_scores_zero() {
        let y_true = array![1.0, 0.0];
        let y_pred = array![0.0, 0.0];
        let m = classification_metric(y_true.view(), y_pred.view());
        assert_eq!(m.precision_score, 0.0);
        assert_eq!(m.f1_score, 0.0);
        assert_eq!(m.accuracy, 0.5);
    }

    #[test]
    fn test_perfect_predictions() {
        let y = array![0.0, 1.0, 1.0];
        let m = classification_metric(y.view(), y.view());
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.accuracy, 1.0);
    }
}
