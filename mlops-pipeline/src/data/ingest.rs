//! Data ingestion: collection → feature store snapshot → train/test files.

use crate::artifact::IngestionArtifact;
use crate::config::DataIngestionConfig;
use crate::data::frame::DataFrame;
use crate::data::source::DocumentStore;
use crate::error::StageError;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of test rows for `n` rows at `ratio`: `ceil(n * ratio)`.
///
/// A small tolerance keeps products like `30 * 0.1` from rounding up an
/// extra row.
pub fn test_size(n: usize, ratio: f64) -> usize {
    (((n as f64) * ratio - 1e-9).ceil().max(0.0) as usize).min(n)
}

/// Shuffle `0..n` and split it into `(train, test)` index lists.
pub fn split_indices(n: usize, ratio: f64, seed: Option<u64>) -> (Vec<usize>, Vec<usize>) {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut rng);
    let train = indices.split_off(test_size(n, ratio));
    (train, indices)
}

pub struct DataIngestion {
    config: DataIngestionConfig,
    store: Arc<dyn DocumentStore>,
}

impl DataIngestion {
    pub fn new(config: DataIngestionConfig, store: Arc<dyn DocumentStore>) -> Self {
        Self { config, store }
    }

    /// Pull the collection, clean it, and persist the full snapshot.
    pub async fn export_data_into_feature_store(&self) -> Result<DataFrame, StageError> {
        let collection = &self.config.collection_name;
        info!(collection = %collection, store = %self.store.describe(), "Exporting collection");

        let docs = self
            .store
            .fetch_all(collection)
            .await
            .map_err(|e| match e {
                StageError::SourceUnavailable(_) | StageError::Ingestion(_) => e,
                other => StageError::source_unavailable(other.to_string()),
            })?;
        if docs.is_empty() {
            return Err(StageError::source_unavailable(format!(
                "collection '{collection}' is empty or does not exist"
            )));
        }

        let mut frame = DataFrame::from_documents(&docs);
        let dropped = frame.drop_columns(&self.config.id_columns);
        let replaced = frame.normalize_missing(&self.config.na_tokens);
        if replaced > 0 {
            warn!(cells = replaced, "Replaced missing-value tokens");
        }
        debug!(?dropped, "Dropped identifier columns");
        info!(
            rows = frame.n_rows(),
            columns = frame.n_cols(),
            "Built feature store snapshot"
        );

        frame.write_csv(&self.config.feature_store_file_path)?;
        Ok(frame)
    }

    /// Shuffle-split the snapshot and write both halves.
    pub fn split_data_as_train_test(
        &self,
        frame: &DataFrame,
    ) -> Result<(DataFrame, DataFrame), StageError> {
        let (train_idx, test_idx) =
            split_indices(frame.n_rows(), self.config.split_ratio, self.config.seed);
        if train_idx.is_empty() || test_idx.is_empty() {
            return Err(StageError::ingestion(format!(
                "{} rows cannot be split at ratio {} into non-empty train and test sets",
                frame.n_rows(),
                self.config.split_ratio
            )));
        }

        let train = frame.select_rows(&train_idx);
        let test = frame.select_rows(&test_idx);
        train.write_csv(&self.config.training_file_path)?;
        test.write_csv(&self.config.testing_file_path)?;
        info!(
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            "Split into train and test sets"
        );
        Ok((train, test))
    }

    pub async fn run(&self) -> Result<IngestionArtifact, StageError> {
        let ratio = self.config.split_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(StageError::ingestion(format!(
                "split ratio {ratio} must lie strictly between 0 and 1"
            )));
        }

        let frame = self.export_data_into_feature_store().await?;
        let (train, test) = self.split_data_as_train_test(&frame)?;

        Ok(IngestionArtifact {
            feature_store_file_path: self.config.feature_store_file_path.clone(),
            train_file_path: self.config.training_file_path.clone(),
            test_file_path: self.config.testing_file_path.clone(),
            total_rows: frame.n_rows(),
            train_rows: train.n_rows(),
            test_rows: test.n_rows(),
        })
    }
}
