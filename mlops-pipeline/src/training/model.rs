//! The persisted model unit: preprocessing object plus fitted forest.

use crate::algorithms::RandomForest;
use crate::artifact::ClassificationMetric;
use crate::data::frame::DataFrame;
use crate::error::StageError;
use crate::features::Preprocessor;
use crate::persistence::atomic_write;
use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Everything needed to score raw rows, in one serializable value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainedModel {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub target_column: String,
    /// Held-out metrics recorded at training time.
    pub metric: ClassificationMetric,
    /// SHA-256 of the training matrix the forest was fitted on.
    pub training_data_hash: String,
    pub preprocessor: Preprocessor,
    pub forest: RandomForest,
}

impl TrainedModel {
    pub fn new(
        preprocessor: Preprocessor,
        forest: RandomForest,
        target_column: &str,
        metric: ClassificationMetric,
        training_data_hash: String,
    ) -> Result<Self, StageError> {
        if preprocessor.n_features() != forest.n_features {
            return Err(StageError::training(format!(
                "preprocessor yields {} features but the forest was fitted on {}",
                preprocessor.n_features(),
                forest.n_features
            )));
        }
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            target_column: target_column.to_string(),
            metric,
            training_data_hash,
            preprocessor,
            forest,
        })
    }

    /// Predict labels for raw rows (same columns as the ingested data; the
    /// target column may be absent).
    pub fn predict(&self, frame: &DataFrame) -> Result<Array1<f64>, StageError> {
        let x = self.preprocessor.transform(frame)?;
        self.forest.predict(x.view())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, StageError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StageError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StageError> {
        atomic_write(path, &self.to_bytes()?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, StageError> {
        Self::from_bytes(&std::fs::read(path)?)
    }
}

/// Content hash of a matrix: shape followed by every value, little-endian.
pub fn data_hash(data: ArrayView2<'_, f64>) -> String {
    let mut hasher = Sha256::new();
    hasher.update((data.nrows() as u64).to_le_bytes());
    hasher.update((data.ncols() as u64).to_le_bytes());
    for v in data.iter() {
        hasher.update(v.to_le_bytes());
    }
    format!("{:x}", hasher.finalize())
}
