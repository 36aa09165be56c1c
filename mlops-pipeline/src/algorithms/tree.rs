//! CART decision tree used as the forest's base estimator.

use ndarray::ArrayView2;
use rand::Rng;
use rand::seq::index;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Impurity measure used to score candidate splits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitCriterion {
    Gini,
    Entropy,
}

impl SplitCriterion {
    /// Impurity of a node holding `counts[c]` samples of class `c`.
    pub fn impurity(&self, counts: &[usize], total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }
        let total = total as f64;
        match self {
            Self::Gini => {
                1.0 - counts
                    .iter()
                    .map(|&c| {
                        let p = c as f64 / total;
                        p * p
                    })
                    .sum::<f64>()
            }
            Self::Entropy => counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| {
                    let p = c as f64 / total;
                    -p * p.log2()
                })
                .sum(),
        }
    }
}

/// Number of features considered at each split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let k = match self {
            Self::Sqrt => (n_features as f64).sqrt().floor() as usize,
            Self::Log2 => (n_features as f64).log2().floor() as usize,
            Self::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_depth: usize,
    pub criterion: SplitCriterion,
    pub max_features: usize,
}

/// A node of a fitted tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum TreeNode {
    /// Class distribution of the training samples that reached the leaf.
    Leaf { distribution: Vec<f64> },
    /// Samples with `x[feature] <= threshold` go left.
    Split {
        feature: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// A fitted classification tree over class indices `0..n_classes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub root: TreeNode,
    pub n_classes: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grow a tree on the rows listed in `sample`.
    ///
    /// `y[i]` is the class index of row `i` of `x`.
    pub fn fit<R: Rng>(
        x: ArrayView2<'_, f64>,
        y: &[usize],
        sample: Vec<usize>,
        n_classes: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let root = grow(x, y, sample, n_classes, params, 0, rng);
        Self { root, n_classes }
    }

    /// Class distribution for one feature row.
    pub fn distribution(&self, row: &[f64]) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { distribution } => return distribution,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = row.get(*feature).copied().unwrap_or(f64::NAN);
                    node = if value <= *threshold { left.as_ref() } else { right.as_ref() };
                }
            }
        }
    }

    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        walk(&self.root)
    }
}

fn class_counts(y: &[usize], sample: &[usize], n_classes: usize) -> Vec<usize> {
    let mut counts = vec![0; n_classes];
    for &i in sample {
        counts[y[i]] += 1;
    }
    counts
}

fn leaf(counts: &[usize]) -> TreeNode {
    let total = counts.iter().sum::<usize>().max(1) as f64;
    TreeNode::Leaf {
        distribution: counts.iter().map(|&c| c as f64 / total).collect(),
    }
}

fn grow<R: Rng>(
    x: ArrayView2<'_, f64>,
    y: &[usize],
    sample: Vec<usize>,
    n_classes: usize,
    params: &TreeParams,
    depth: usize,
    rng: &mut R,
) -> TreeNode {
    let counts = class_counts(y, &sample, n_classes);
    let pure = counts.iter().filter(|&&c| c > 0).count() <= 1;
    if pure
        || depth >= params.max_depth
        || sample.len() < params.min_samples_split
        || sample.len() < 2 * params.min_samples_leaf
    {
        return leaf(&counts);
    }

    let Some(best) = best_split(x, y, &sample, &counts, n_classes, params, rng) else {
        return leaf(&counts);
    };

    let (left, right): (Vec<usize>, Vec<usize>) = sample
        .into_iter()
        .partition(|&i| x[[i, best.feature]] <= best.threshold);

    TreeNode::Split {
        feature: best.feature,
        threshold: best.threshold,
        left: Box::new(grow(x, y, left, n_classes, params, depth + 1, rng)),
        right: Box::new(grow(x, y, right, n_classes, params, depth + 1, rng)),
    }
}

fn best_split<R: Rng>(
    x: ArrayView2<'_, f64>,
    y: &[usize],
    sample: &[usize],
    counts: &[usize],
    n_classes: usize,
    params: &TreeParams,
    rng: &mut R,
) -> Option<BestSplit> {
    let n_features = x.ncols();
    let n = sample.len();
    let parent = params.criterion.impurity(counts, n);
    // Visit features in random order; keep going past `max_features` only
    // while no valid split has been found (constant features don't count).
    let candidates = index::sample(rng, n_features, n_features);

    let mut best: Option<BestSplit> = None;
    let mut order = sample.to_vec();

    for (visited, feature) in candidates.iter().enumerate() {
        if visited >= params.max_features && best.is_some() {
            break;
        }
        order.sort_by(|&a, &b| {
            x[[a, feature]]
                .partial_cmp(&x[[b, feature]])
                .unwrap_or(Ordering::Equal)
        });

        let mut left = vec![0usize; n_classes];
        let mut right = counts.to_vec();

        for pos in 0..n - 1 {
            let class = y[order[pos]];
            left[class] += 1;
            right[class] -= 1;

            let n_left = pos + 1;
            let n_right = n - n_left;
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }

            let here = x[[order[pos], feature]];
            let next = x[[order[pos + 1], feature]];
            if here >= next {
                continue;
            }

            let weighted = (n_left as f64 * params.criterion.impurity(&left, n_left)
                + n_right as f64 * params.criterion.impurity(&right, n_right))
                / n as f64;
            if weighted >= parent {
                continue;
            }
            if best.as_ref().is_none_or(|b| weighted < b.impurity) {
                best = Some(BestSplit {
                    feature,
                    threshold: midpoint(here, next),
                    impurity: weighted,
                });
            }
        }
    }

    best
}

/// Split point between two consecutive distinct values. Adjacent floats can
/// round the midpoint up to `next`; fall back to `here` so `next` still goes right.
fn midpoint(here: f64, next: f64) -> f64 {
    let mid = here + (next - here) / 2.0;
    if mid >= next { here } else { mid }
}
