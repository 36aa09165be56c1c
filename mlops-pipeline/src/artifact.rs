//! Records handed from one stage to the next.
//!
//! Each artifact is built once, fully populated, by the stage that produces
//! it. Paths point into the run directory.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub feature_store_file_path: PathBuf,
    pub train_file_path: PathBuf,
    pub test_file_path: PathBuf,
    pub total_rows: usize,
    pub train_rows: usize,
    pub test_rows: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    pub passed: bool,
    /// Empty when `passed`; otherwise every mismatch found.
    pub message: String,
    pub report_file_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    pub transformed_object_file_path: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
}

/// Binary classification scores; positive class is label 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerArtifact {
    pub trained_model_file_path: PathBuf,
    pub metric: ClassificationMetric,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationArtifact {
    pub accepted: bool,
    /// `trained_model_f1 - deployed_model_f1`, or 0 with no deployed model.
    pub score_delta: f64,
    /// `<bucket>/<key>` of the deployed model.
    pub remote_model_path: String,
    pub trained_model_path: PathBuf,
    pub trained_model_f1: f64,
    pub deployed_model_f1: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherArtifact {
    pub bucket_name: String,
    pub remote_model_path: String,
}
