//! Model pusher: upload an accepted model to the artifact store.

use crate::artifact::{EvaluationArtifact, PusherArtifact};
use crate::config::ModelPusherConfig;
use crate::deploy::store::ArtifactStore;
use crate::error::StageError;
use std::sync::Arc;
use tracing::info;

pub struct ModelPusher {
    config: ModelPusherConfig,
    store: Arc<dyn ArtifactStore>,
}

impl ModelPusher {
    pub fn new(config: ModelPusherConfig, store: Arc<dyn ArtifactStore>) -> Self {
        Self { config, store }
    }

    pub async fn run(&self, evaluation: &EvaluationArtifact) -> Result<PusherArtifact, StageError> {
        if !evaluation.accepted {
            return Err(StageError::deployment(
                "refusing to push a model that evaluation rejected",
            ));
        }
        if self.store.bucket() != self.config.bucket_name {
            return Err(StageError::deployment(format!(
                "store bucket '{}' does not match configured bucket '{}'",
                self.store.bucket(),
                self.config.bucket_name
            )));
        }

        let bytes = tokio::fs::read(&evaluation.trained_model_path)
            .await
            .map_err(|e| {
                StageError::deployment(format!(
                    "cannot read trained model {}: {e}",
                    evaluation.trained_model_path.display()
                ))
            })?;
        let size = bytes.len();
        let key = &self.config.model_key;
        self.store.put(key, bytes).await.map_err(|e| {
            StageError::deployment(format!("upload to {} failed: {e}", self.store.remote_path(key)))
        })?;

        let remote_model_path = self.store.remote_path(key);
        info!(path = %remote_model_path, bytes = size, "Pushed model");
        Ok(PusherArtifact {
            bucket_name: self.config.bucket_name.clone(),
            remote_model_path,
        })
    }
}
