//! Model trainer: transformed arrays → fitted, scored, persisted model.

use crate::algorithms::RandomForest;
use crate::artifact::{TrainerArtifact, TransformationArtifact};
use crate::config::ModelTrainerConfig;
use crate::data::transform::TransformedArray;
use crate::error::StageError;
use crate::features::Preprocessor;
use crate::persistence::read_json;
use crate::training::metrics::classification_metric;
use crate::training::model::{TrainedModel, data_hash};
use ndarray::ArrayView1;
use tracing::{debug, info};

pub struct ModelTrainer {
    config: ModelTrainerConfig,
}

fn check_labels(y: ArrayView1<'_, f64>, split: &str) -> Result<(), StageError> {
    match y.iter().find(|v| !v.is_finite() || v.fract() != 0.0) {
        Some(v) => Err(StageError::training(format!(
            "{split} target value {v} is not a class label"
        ))),
        None => Ok(()),
    }
}

impl ModelTrainer {
    pub fn new(config: ModelTrainerConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, transformation: &TransformationArtifact) -> Result<TrainerArtifact, StageError> {
        let train = TransformedArray::load(&transformation.transformed_train_file_path)?;
        let test = TransformedArray::load(&transformation.transformed_test_file_path)?;
        if train.data.ncols() != test.data.ncols() {
            return Err(StageError::training(format!(
                "train has {} columns but test has {}",
                train.data.ncols(),
                test.data.ncols()
            )));
        }
        if train.data.nrows() == 0 || test.data.nrows() == 0 {
            return Err(StageError::training("train and test arrays must both have rows"));
        }

        let (x_train, y_train) = train.split()?;
        let (x_test, y_test) = test.split()?;
        check_labels(y_train, "train")?;
        check_labels(y_test, "test")?;

        info!(
            rows = x_train.nrows(),
            features = x_train.ncols(),
            trees = self.config.forest.n_estimators,
            "Training random forest"
        );
        let forest = RandomForest::fit(x_train, y_train, &self.config.forest)?;

        let y_pred = forest.predict(x_test)?;
        let metric = classification_metric(y_test, y_pred.view());
        info!(
            f1 = metric.f1_score,
            precision = metric.precision_score,
            recall = metric.recall_score,
            accuracy = metric.accuracy,
            "Scored model on the test split"
        );

        if metric.accuracy < self.config.expected_score {
            return Err(StageError::Acceptance {
                score: metric.accuracy,
                expected: self.config.expected_score,
            });
        }

        let preprocessor: Preprocessor = read_json(&transformation.transformed_object_file_path)?;
        let model = TrainedModel::new(
            preprocessor,
            forest,
            &train.target_column,
            metric,
            data_hash(train.data.view()),
        )?;
        model.save(&self.config.trained_model_file_path)?;
        debug!(
            id = %model.id,
            path = %self.config.trained_model_file_path.display(),
            "Saved trained model"
        );

        Ok(TrainerArtifact {
            trained_model_file_path: self.config.trained_model_file_path.clone(),
            metric,
        })
    }
}
