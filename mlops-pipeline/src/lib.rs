//! # mlops-pipeline: batch training pipeline for a tabular classifier
//!
//! One run pulls raw records from a document store, validates them against a
//! declared schema, fits the preprocessing object and a random forest, compares
//! the new model with the deployed one and, if it is better by the configured
//! margin, pushes it to the artifact store.
//!
//! Stages are plain values built from per-run configs; [`TrainPipeline`]
//! chains them and stops at the first failure or rejection.

// Foundation
pub mod config;
pub mod error;
pub mod persistence;

// Stage records
pub mod artifact;

// Data and features
pub mod data;
pub mod features;

// Model
pub mod algorithms;
pub mod training;

// Deployment
pub mod deploy;
pub mod evaluation;

// Orchestration and inference
pub mod pipeline;
pub mod predict;

// Re-exports
pub use config::{PipelineConfig, TrainingPipelineConfig, load_config};
pub use data::{DocumentStore, MemoryDocumentStore, SqliteDocumentStore};
pub use deploy::{ArtifactStore, HttpArtifactStore, LocalArtifactStore, open_artifact_store};
pub use error::{PipelineError, StageError};
pub use pipeline::{PipelineOutcome, PipelineState, RunArtifacts, RunSummary, TrainPipeline};
pub use training::TrainedModel;
