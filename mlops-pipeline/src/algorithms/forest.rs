//! Random forest classifier (bagged CART trees, soft voting).

use crate::algorithms::tree::{DecisionTree, MaxFeatures, SplitCriterion, TreeParams};
use crate::error::StageError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Forest hyperparameters. All explicit; nothing is tuned automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_depth: usize,
    pub criterion: SplitCriterion,
    pub max_features: MaxFeatures,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_depth: 10,
            criterion: SplitCriterion::Gini,
            max_features: MaxFeatures::Sqrt,
            random_state: 0,
        }
    }
}

/// A fitted random forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: ForestParams,
    /// Sorted distinct target labels; tree class index `c` is `classes[c]`.
    pub classes: Vec<f64>,
    pub n_features: usize,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    /// Fit on `x` (rows = samples) and integral labels `y`.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: &ForestParams,
    ) -> Result<Self, StageError> {
        let (n_rows, n_features) = x.dim();
        if n_rows == 0 || n_features == 0 {
            return Err(StageError::training(format!(
                "cannot fit a forest on a {n_rows}x{n_features} feature matrix"
            )));
        }
        if y.len() != n_rows {
            return Err(StageError::training(format!(
                "feature rows ({n_rows}) and target length ({}) differ",
                y.len()
            )));
        }
        if params.n_estimators == 0 {
            return Err(StageError::training("n_estimators must be at least 1"));
        }
        if x.iter().any(|v| !v.is_finite()) {
            return Err(StageError::training("feature matrix contains non-finite values"));
        }

        let classes = distinct_labels(y);
        let encoded: Vec<usize> = y
            .iter()
            .map(|label| class_index(&classes, *label))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| StageError::training("target contains non-finite labels"))?;

        let tree_params = TreeParams {
            min_samples_split: params.min_samples_split.max(2),
            min_samples_leaf: params.min_samples_leaf.max(1),
            max_depth: params.max_depth,
            criterion: params.criterion,
            max_features: params.max_features.resolve(n_features),
        };

        let mut rng = StdRng::seed_from_u64(params.random_state);
        let trees = (0..params.n_estimators)
            .map(|_| {
                let mut tree_rng = StdRng::seed_from_u64(rng.r#gen());
                let bootstrap: Vec<usize> =
                    (0..n_rows).map(|_| tree_rng.gen_range(0..n_rows)).collect();
                DecisionTree::fit(
                    x,
                    &encoded,
                    bootstrap,
                    classes.len(),
                    &tree_params,
                    &mut tree_rng,
                )
            })
            .collect();

        tracing::debug!(
            trees = params.n_estimators,
            rows = n_rows,
            features = n_features,
            classes = classes.len(),
            "Fitted random forest"
        );

        Ok(Self {
            params: params.clone(),
            classes,
            n_features,
            trees,
        })
    }

    /// Mean class distribution over all trees; columns follow `self.classes`.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, StageError> {
        self.check_width(x)?;
        let mut proba = Array2::<f64>::zeros((x.nrows(), self.classes.len()));
        for (row, mut out) in x.axis_iter(Axis(0)).zip(proba.axis_iter_mut(Axis(0))) {
            let row = row.to_vec();
            for tree in &self.trees {
                for (acc, p) in out.iter_mut().zip(tree.distribution(&row)) {
                    *acc += p;
                }
            }
            out.mapv_inplace(|v| v / self.trees.len() as f64);
        }
        Ok(proba)
    }

    /// Most probable label per row.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, StageError> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .axis_iter(Axis(0))
            .map(|row| {
                let best = row
                    .iter()
                    .enumerate()
                    .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(Ordering::Equal))
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                self.classes[best]
            })
            .collect())
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn check_width(&self, x: ArrayView2<'_, f64>) -> Result<(), StageError> {
        if x.ncols() != self.n_features {
            return Err(StageError::training(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(())
    }
}

fn distinct_labels(y: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut labels: Vec<f64> = y.iter().copied().filter(|v| v.is_finite()).collect();
    labels.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    labels.dedup();
    labels
}

fn class_index(classes: &[f64], label: f64) -> Option<usize> {
    classes.iter().position(|c| *c == label)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn two_blobs() -> (Array2<f64>, Array1<f64>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let jitter = (i % 7) as f64 * 0.1;
            rows.extend_from_slice(&[1.0 + jitter, 2.0 - jitter, 0.5]);
            labels.push(0.0);
            rows.extend_from_slice(&[5.0 + jitter, -2.0 + jitter, 0.5]);
            labels.push(1.0);
        }
        (
            Array2::from_shape_vec((80, 3), rows).unwrap(),
            Array1::from(labels),
        )
    }

    fn small_params() -> ForestParams {
        ForestParams {
            n_estimators: 15,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_depth: 4,
            criterion: SplitCriterion::Entropy,
            max_features: MaxFeatures::Sqrt,
            random_state: 101,
        }
    }

    #[test]
    fn test_forest_learns_separable_blobs() {
        let (x, y) = two_blobs();
        let forest = RandomForest::fit(x.view(), y.view(), &small_params()).unwrap();
        assert_eq!(forest.classes, vec![0.0, 1.0]);
        assert_eq!(forest.n_trees(), 15);

        let preds = forest.predict(x.view()).unwrap();
        assert_eq!(preds, y);

        let proba = forest.predict_proba(array![[1.0, 2.0, 0.5]].view()).unwrap();
        assert!((proba.row(0).sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = two_blobs();
        let a = RandomForest::fit(x.view(), y.view(), &small_params()).unwrap();
        let b = RandomForest::fit(x.view(), y.view(), &small_params()).unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn test_rejects_mismatched_target() {
        let x = array![[1.0], [2.0]];
        let y = array![0.0];
        let err = RandomForest::fit(x.view(), y.view(), &small_params()).unwrap_err();
        assert!(matches!(err, StageError::Training(_)));
    }

    #[test]
    fn test_rejects_nan_features() {
        let x = array![[1.0], [f64::NAN]];
        let y = array![0.0, 1.0];
        assert!(RandomForest::fit(x.view(), y.view(), &small_params()).is_err());
    }

    #[test]
    fn test_predict_checks_width() {
        let (x, y) = two_blobs();
        let forest = RandomForest::fit(x.view(), y.view(), &small_params()).unwrap();
        assert!(forest.predict(array![[1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn test_serde_roundtrip_predicts_identically() {
        let (x, y) = two_blobs();
        let forest = RandomForest::fit(x.view(), y.view(), &small_params()).unwrap();
        let json = serde_json::to_string(&forest).unwrap();
        let restored: RandomForest = serde_json::from_str(&json).unwrap();
        assert_eq!(
            restored.predict(x.view()).unwrap(),
            forest.predict(x.view()).unwrap()
        );
    }
}
