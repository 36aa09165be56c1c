//! Model evaluation: the new model against whatever is currently deployed.

use crate::artifact::{EvaluationArtifact, IngestionArtifact, TrainerArtifact};
use crate::config::ModelEvaluationConfig;
use crate::data::frame::DataFrame;
use crate::data::transform::target_values;
use crate::deploy::ArtifactStore;
use crate::error::StageError;
use crate::training::{TrainedModel, classification_metric};
use std::sync::Arc;
use tracing::{info, warn};

/// Acceptance rule. Returns `(accepted, score_delta)`.
///
/// With nothing deployed the new model is accepted with a delta of zero.
/// Otherwise it must beat the deployed F1 by strictly more than `threshold`.
pub fn decide(new_f1: f64, deployed_f1: Option<f64>, threshold: f64) -> (bool, f64) {
    match deployed_f1 {
        None => (true, 0.0),
        Some(old) => {
            let delta = new_f1 - old;
            (delta > threshold, delta)
        }
    }
}

pub struct ModelEvaluation {
    config: ModelEvaluationConfig,
    store: Arc<dyn ArtifactStore>,
}

impl ModelEvaluation {
    pub fn new(config: ModelEvaluationConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self { config, store }
    }

    /// Fetch the deployed model, if any.
    pub async fn deployed_model(&self) -> Result<Option<TrainedModel>, StageError> {
        let key = &self.config.model_key;
        let present = self.store.exists(key).await.map_err(|e| {
            StageError::evaluation(format!("cannot reach artifact store: {e}"))
        })?;
        if !present {
            return Ok(None);
        }
        let bytes = self.store.get(key).await.map_err(|e| {
            StageError::evaluation(format!("cannot download deployed model: {e}"))
        })?;
        TrainedModel::from_bytes(&bytes)
            .map(Some)
            .map_err(|e| StageError::evaluation(format!("deployed model is unreadable: {e}")))
    }

    /// F1 of `model` on the raw test split.
    fn score(model: &TrainedModel, test: &DataFrame) -> Result<f64, StageError> {
        let y_true = target_values(test, &model.target_column)?;
        let y_pred = model.predict(test)?;
        Ok(classification_metric(y_true.view(), y_pred.view()).f1_score)
    }

    pub async fn run(
        &self,
        ingestion: &IngestionArtifact,
        trainer: &TrainerArtifact,
    ) -> Result<EvaluationArtifact, StageError> {
        let remote_model_path = self.store.remote_path(&self.config.model_key);
        let trained_f1 = trainer.metric.f1_score;

        let deployed_f1 = match self.deployed_model().await? {
            Some(deployed) => {
                let test = DataFrame::read_csv_with_text(
                    &ingestion.test_file_path,
                    &deployed.preprocessor.text_columns(),
                )?;
                let f1 = Self::score(&deployed, &test).map_err(|e| {
                    StageError::evaluation(format!("cannot score deployed model: {e}"))
                })?;
                info!(id = %deployed.id, f1, "Scored deployed model on the test split");
                Some(f1)
            }
            None => {
                info!(path = %remote_model_path, "No deployed model; accepting the new one");
                None
            }
        };

        let (accepted, score_delta) =
            decide(trained_f1, deployed_f1, self.config.changed_threshold_score);
        if accepted {
            info!(trained_f1, ?deployed_f1, score_delta, "Model accepted");
        } else {
            warn!(
                trained_f1,
                ?deployed_f1,
                score_delta,
                threshold = self.config.changed_threshold_score,
                "Model rejected"
            );
        }

        Ok(EvaluationArtifact {
            accepted,
            score_delta,
            remote_model_path,
            trained_model_path: trainer.trained_model_file_path.clone(),
            trained_model_f1: trained_f1,
            deployed_model_f1: deployed_f1,
        })
    }
}
