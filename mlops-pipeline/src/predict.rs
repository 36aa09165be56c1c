//! Offline batch prediction with a persisted model.

use crate::data::document::FieldValue;
use crate::data::frame::DataFrame;
use crate::deploy::ArtifactStore;
use crate::error::StageError;
use crate::training::TrainedModel;
use std::path::Path;
use tracing::{debug, info};

/// Column appended to scored rows.
pub const PREDICTION_COLUMN: &str = "prediction";

/// Predicted class label for every row of `frame`.
///
/// Rows need the same columns the model was trained on; the target column
/// may be absent.
pub fn predict(model: &TrainedModel, frame: &DataFrame) -> Result<Vec<f64>, StageError> {
    if frame.is_empty() {
        return Ok(Vec::new());
    }
    let labels = model.predict(frame)?;
    debug!(rows = labels.len(), model = %model.id, "Scored batch");
    Ok(labels.to_vec())
}

/// Copy of `frame` with [`PREDICTION_COLUMN`] appended (replacing any
/// existing one).
pub fn with_predictions(frame: &DataFrame, labels: &[f64]) -> Result<DataFrame, StageError> {
    if frame.n_rows() != labels.len() {
        return Err(StageError::transformation(format!(
            "{} predictions for {} rows",
            labels.len(),
            frame.n_rows()
        )));
    }
    let mut base = frame.clone();
    base.drop_columns(&[PREDICTION_COLUMN.to_string()]);

    let mut columns = base.columns().to_vec();
    columns.push(PREDICTION_COLUMN.to_string());
    let mut out = DataFrame::new(columns);
    for (row, label) in base.rows().iter().zip(labels) {
        let mut row = row.clone();
        row.push(FieldValue::Number(*label));
        out.push_row(row)?;
    }
    Ok(out)
}

/// Score `input` (CSV) and write it to `output` with predictions appended.
/// Returns the number of rows scored.
pub fn predict_csv(model: &TrainedModel, input: &Path, output: &Path) -> Result<usize, StageError> {
    let frame = DataFrame::read_csv_with_text(input, &model.preprocessor.text_columns())?;
    let labels = predict(model, &frame)?;
    with_predictions(&frame, &labels)?.write_csv(output)?;
    info!(
        input = %input.display(),
        output = %output.display(),
        rows = labels.len(),
        "Wrote predictions"
    );
    Ok(labels.len())
}

/// Download the deployed model from `store`.
pub async fn fetch_model(store: &dyn ArtifactStore, key: &str) -> Result<TrainedModel, StageError> {
    if !store.exists(key).await? {
        return Err(StageError::deployment(format!(
            "no model at {}",
            store.remote_path(key)
        )));
    }
    TrainedModel::from_bytes(&store.get(key).await?)
}
