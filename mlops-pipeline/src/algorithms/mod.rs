//! Classifier implementation: CART trees bagged into a random forest.

pub mod forest;
pub mod tree;

pub use forest::{ForestParams, RandomForest};
pub use tree::{DecisionTree, MaxFeatures, SplitCriterion, TreeNode};
