//! Pipeline orchestrator.
//!
//! Runs ingestion → validation → transformation → training → evaluation and,
//! when the new model is accepted, the pusher. Each stage is awaited before
//! the next starts. The first failure ends the run.

use crate::artifact::{
    EvaluationArtifact, IngestionArtifact, PusherArtifact, TrainerArtifact,
    TransformationArtifact, ValidationArtifact,
};
use crate::config::TrainingPipelineConfig;
use crate::data::{DataIngestion, DataTransformation, DataValidation, DocumentStore};
use crate::deploy::{ArtifactStore, ModelPusher};
use crate::error::{PipelineError, StageError};
use crate::evaluation::ModelEvaluation;
use crate::persistence::atomic_write_json;
use crate::training::ModelTrainer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Where the pipeline is. Strictly forward; `Pushing` and `Stopped` are the
/// two ways a run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Ingesting,
    Validating,
    Transforming,
    Training,
    Evaluating,
    Pushing,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ingesting => "ingesting",
            Self::Validating => "validating",
            Self::Transforming => "transforming",
            Self::Training => "training",
            Self::Evaluating => "evaluating",
            Self::Pushing => "pushing",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Artifacts every completed run produces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunArtifacts {
    pub ingestion: IngestionArtifact,
    pub validation: ValidationArtifact,
    pub transformation: TransformationArtifact,
    pub trainer: TrainerArtifact,
    pub evaluation: EvaluationArtifact,
}

/// How a successful run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    /// The new model was accepted and uploaded.
    Deployed {
        artifacts: RunArtifacts,
        pusher: PusherArtifact,
    },
    /// The new model did not beat the deployed one; nothing was uploaded.
    Rejected { artifacts: RunArtifacts },
}

impl PipelineOutcome {
    pub fn artifacts(&self) -> &RunArtifacts {
        match self {
            Self::Deployed { artifacts, .. } | Self::Rejected { artifacts } => artifacts,
        }
    }

    pub fn is_deployed(&self) -> bool {
        matches!(self, Self::Deployed { .. })
    }
}

/// Written to `<run dir>/run.json` when a run ends, successfully or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub pipeline_name: String,
    pub timestamp: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub final_state: PipelineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<PipelineOutcome>,
}

/// One training run over injected stores.
pub struct TrainPipeline {
    run: TrainingPipelineConfig,
    documents: Arc<dyn DocumentStore>,
    artifacts: Arc<dyn ArtifactStore>,
}

impl TrainPipeline {
    pub fn new(
        run: TrainingPipelineConfig,
        documents: Arc<dyn DocumentStore>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            run,
            documents,
            artifacts,
        }
    }

    /// Execute every stage and record a run summary.
    pub async fn run(&self) -> Result<PipelineOutcome, PipelineError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            run_id = %run_id,
            dir = %self.run.artifact_dir.display(),
            "Starting training pipeline"
        );

        let result = self.execute().await;

        let (final_state, error, outcome) = match &result {
            Ok(outcome) if outcome.is_deployed() => (PipelineState::Pushing, None, Some(outcome.clone())),
            Ok(outcome) => (PipelineState::Stopped, None, Some(outcome.clone())),
            Err(e) => (e.stage, Some(e.to_string()), None),
        };
        let summary = RunSummary {
            run_id,
            pipeline_name: self.run.pipeline_name.clone(),
            timestamp: self.run.timestamp.clone(),
            started_at,
            finished_at: Utc::now(),
            final_state,
            error,
            outcome,
        };
        if let Err(e) = atomic_write_json(&self.run.run_summary_path(), &summary) {
            warn!(error = %e, "Could not write run summary");
        }

        result
    }

    async fn execute(&self) -> Result<PipelineOutcome, PipelineError> {
        let ingestion = self
            .stage(PipelineState::Ingesting, async {
                DataIngestion::new(self.run.data_ingestion(), Arc::clone(&self.documents))
                    .run()
                    .await
            })
            .await?;

        let validation = self
            .stage(PipelineState::Validating, async {
                DataValidation::new(self.run.data_validation()).run(&ingestion)
            })
            .await?;

        let transformation = self
            .stage(PipelineState::Transforming, async {
                DataTransformation::new(self.run.data_transformation())
                    .run(&ingestion, &validation)
            })
            .await?;

        let trainer = self
            .stage(PipelineState::Training, async {
                let stage = ModelTrainer::new(self.run.model_trainer());
                let input = transformation.clone();
                tokio::task::spawn_blocking(move || stage.run(&input))
                    .await
                    .map_err(|e| StageError::training(format!("training task join error: {e}")))?
            })
            .await?;

        let evaluation = self
            .stage(PipelineState::Evaluating, async {
                ModelEvaluation::new(self.run.model_evaluation(), Arc::clone(&self.artifacts))
                    .run(&ingestion, &trainer)
                    .await
            })
            .await?;

        let artifacts = RunArtifacts {
            ingestion,
            validation,
            transformation,
            trainer,
            evaluation,
        };

        if !artifacts.evaluation.accepted {
            info!(
                state = %PipelineState::Stopped,
                score_delta = artifacts.evaluation.score_delta,
                "Model not accepted; skipping deployment"
            );
            return Ok(PipelineOutcome::Rejected { artifacts });
        }

        let pusher = self
            .stage(PipelineState::Pushing, async {
                ModelPusher::new(self.run.model_pusher(), Arc::clone(&self.artifacts))
                    .run(&artifacts.evaluation)
                    .await
            })
            .await?;

        info!(path = %pusher.remote_model_path, "Pipeline finished; model deployed");
        Ok(PipelineOutcome::Deployed { artifacts, pusher })
    }

    /// Enter `state`, await the stage, and tag any failure with the state.
    async fn stage<T, F>(&self, state: PipelineState, work: F) -> Result<T, PipelineError>
    where
        F: std::future::Future<Output = Result<T, StageError>>,
    {
        info!(state = %state, "Entering stage");
        match work.await {
            Ok(artifact) => Ok(artifact),
            Err(source) => {
                error!(state = %state, error = %source, "Stage failed");
                Err(PipelineError::new(state, source))
            }
        }
    }
}
