//! Error types for the mlops-pipeline crate.
//!
//! Every stage returns `Result<_, StageError>`. The orchestrator wraps a
//! stage failure into [`PipelineError`], which records the state the pipeline
//! was in when it failed.

use crate::pipeline::PipelineState;
use thiserror::Error;

/// Failure raised inside a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    #[error("Ingestion error: {0}")]
    Ingestion(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Transformation error: {0}")]
    Transformation(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Model score {score:.4} is below the expected score {expected:.4}")]
    Acceptance { score: f64, expected: f64 },

    #[error("Evaluation error: {0}")]
    Evaluation(String),

    #[error("Deployment error: {0}")]
    Deployment(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl StageError {
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    pub fn ingestion(msg: impl Into<String>) -> Self {
        Self::Ingestion(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn transformation(msg: impl Into<String>) -> Self {
        Self::Transformation(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }

    pub fn deployment(msg: impl Into<String>) -> Self {
        Self::Deployment(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Uniform error returned by [`crate::pipeline::TrainPipeline::run`].
#[derive(Debug, Error)]
#[error("Pipeline failed while {stage}: {source}")]
pub struct PipelineError {
    pub stage: PipelineState,
    #[source]
    pub source: StageError,
}

impl PipelineError {
    pub fn new(stage: PipelineState, source: StageError) -> Self {
        Self { stage, source }
    }
}
