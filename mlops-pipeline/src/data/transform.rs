//! Data transformation: raw train/test CSVs → model-ready arrays.

use crate::artifact::{IngestionArtifact, TransformationArtifact, ValidationArtifact};
use crate::config::DataTransformationConfig;
use crate::data::document::FieldValue;
use crate::data::frame::DataFrame;
use crate::data::schema::SchemaDefinition;
use crate::error::StageError;
use crate::features::{Preprocessor, random_oversample};
use crate::persistence::{atomic_write_json, read_json};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis, concatenate, s};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// A persisted feature matrix with the target as its last column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformedArray {
    pub feature_names: Vec<String>,
    pub target_column: String,
    pub data: Array2<f64>,
}

impl TransformedArray {
    pub fn new(
        feature_names: Vec<String>,
        target_column: &str,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
    ) -> Result<Self, StageError> {
        let target = y.insert_axis(Axis(1));
        let data = concatenate(Axis(1), &[x.view(), target.view()]).map_err(|e| {
            StageError::transformation(format!("cannot append target column: {e}"))
        })?;
        Ok(Self {
            feature_names,
            target_column: target_column.to_string(),
            data,
        })
    }

    /// Split into `(features, target)` by the last column.
    pub fn split(&self) -> Result<(ArrayView2<'_, f64>, ArrayView1<'_, f64>), StageError> {
        let cols = self.data.ncols();
        if cols < 2 {
            return Err(StageError::training(format!(
                "array has {cols} columns; need at least one feature and the target"
            )));
        }
        Ok((
            self.data.slice(s![.., ..cols - 1]),
            self.data.column(cols - 1),
        ))
    }

    pub fn save(&self, path: &Path) -> Result<(), StageError> {
        atomic_write_json(path, self)
    }

    pub fn load(path: &Path) -> Result<Self, StageError> {
        read_json(path)
    }
}

/// Numeric target values; missing or non-numeric targets are an error.
pub fn target_values(frame: &DataFrame, target: &str) -> Result<Array1<f64>, StageError> {
    let values = frame.column(target).ok_or_else(|| {
        StageError::transformation(format!("target column '{target}' is missing"))
    })?;
    values
        .enumerate()
        .map(|(row, value)| match value {
            FieldValue::Missing => Err(StageError::transformation(format!(
                "target '{target}' is missing in row {row}"
            ))),
            other => other.as_f64().ok_or_else(|| {
                StageError::transformation(format!(
                    "target '{target}' is non-numeric in row {row}: '{other}'"
                ))
            }),
        })
        .collect()
}

pub struct DataTransformation {
    config: DataTransformationConfig,
}

impl DataTransformation {
    pub fn new(config: DataTransformationConfig) -> Self {
        Self { config }
    }

    pub fn run(
        &self,
        ingestion: &IngestionArtifact,
        validation: &ValidationArtifact,
    ) -> Result<TransformationArtifact, StageError> {
        if !validation.passed {
            return Err(StageError::transformation(format!(
                "data validation did not pass: {}",
                validation.message
            )));
        }

        let schema = SchemaDefinition::load(&self.config.schema_path)?;
        schema.check()?;
        let target = schema.target_column.as_str();

        let text_columns = schema.text_columns();
        let train = DataFrame::read_csv_with_text(&ingestion.train_file_path, &text_columns)?;
        let test = DataFrame::read_csv_with_text(&ingestion.test_file_path, &text_columns)?;
        let y_train = target_values(&train, target)?;
        let y_test = target_values(&test, target)?;

        let preprocessor = Preprocessor::fit(&schema.features, &train)?;
        let x_train = preprocessor.transform(&train)?;
        let x_test = preprocessor.transform(&test)?;
        debug!(
            train = ?x_train.dim(),
            test = ?x_test.dim(),
            "Transformed feature matrices"
        );

        let (x_train, y_train) = if self.config.oversample {
            let (x, y, counts) = random_oversample(x_train.view(), y_train.view(), self.config.seed);
            for c in &counts {
                debug!(label = c.label, before = c.before, after = c.after, "Class balance");
            }
            (x, y)
        } else {
            (x_train, y_train)
        };

        let names = preprocessor.schema.feature_names.clone();
        TransformedArray::new(names.clone(), target, x_train.view(), y_train.view())?
            .save(&self.config.transformed_train_file_path)?;
        TransformedArray::new(names, target, x_test.view(), y_test.view())?
            .save(&self.config.transformed_test_file_path)?;
        atomic_write_json(&self.config.transformed_object_file_path, &preprocessor)?;

        info!(
            features = preprocessor.n_features(),
            train_rows = x_train.nrows(),
            test_rows = x_test.nrows(),
            feature_version = preprocessor.schema.version,
            "Saved transformed arrays and preprocessing object"
        );

        Ok(TransformationArtifact {
            transformed_object_file_path: self.config.transformed_object_file_path.clone(),
            transformed_train_file_path: self.config.transformed_train_file_path.clone(),
            transformed_test_file_path: self.config.transformed_test_file_path.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SCHEMA: &str = r#"
columns:
  - { name: Gender, dtype: category }
  - { name: Age, dtype: int }
  - { name: Response, dtype: int }
numerical_columns: [Age]
categorical_columns: [Gender]
features:
  binary_maps:
    - column: Gender
      mapping: { Female: 0, Male: 1 }
  passthrough: [Age]
  standard_scale: [Age]
"#;

    struct Fixture {
        _tmp: TempDir,
        stage: DataTransformation,
        ingestion: IngestionArtifact,
        passed: ValidationArtifact,
    }

    fn fixture(train_csv: &str, test_csv: &str, oversample: bool) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        std::fs::write(root.join("schema.yaml"), SCHEMA).unwrap();
        std::fs::write(root.join("train.csv"), train_csv).unwrap();
        std::fs::write(root.join("test.csv"), test_csv).unwrap();
        let dir = root.join("data_transformation");
        let stage = DataTransformation::new(DataTransformationConfig {
            transformed_train_file_path: dir.join("transformed").join("train.json"),
            transformed_test_file_path: dir.join("transformed").join("test.json"),
            transformed_object_file_path: dir.join("transformed_object").join("preprocessing.json"),
            data_transformation_dir: dir,
            schema_path: root.join("schema.yaml"),
            oversample,
            seed: Some(5),
        });
        let ingestion = IngestionArtifact {
            feature_store_file_path: root.join("data.csv"),
            train_file_path: root.join("train.csv"),
            test_file_path: root.join("test.csv"),
            total_rows: 0,
            train_rows: 0,
            test_rows: 0,
        };
        let passed = ValidationArtifact {
            passed: true,
            message: String::new(),
            report_file_path: PathBuf::from("report.yaml"),
        };
        Fixture {
            _tmp: tmp,
            stage,
            ingestion,
            passed,
        }
    }

    const TRAIN: &str = "Gender,Age,Response\nMale,20,1\nFemale,40,0\nFemale,,0\nMale,30,0\n";
    const TEST: &str = "Gender,Age,Response\nFemale,30,1\n";

    #[test]
    fn test_run_writes_arrays_with_target_last() {
        let f = fixture(TRAIN, TEST, false);
        let artifact = f.stage.run(&f.ingestion, &f.passed).unwrap();

        let train = TransformedArray::load(&artifact.transformed_train_file_path).unwrap();
        assert_eq!(train.feature_names, vec!["Gender", "Age"]);
        assert_eq!(train.data.dim(), (4, 3));
        assert_eq!(train.data.column(2), array![1.0, 0.0, 0.0, 0.0]);
        // Missing age imputed with the train mean (30) then z-scored to 0.
        assert_eq!(train.data[[2, 1]], 0.0);

        let test = TransformedArray::load(&artifact.transformed_test_file_path).unwrap();
        assert_eq!(test.data.row(0).to_vec(), vec![0.0, 0.0, 1.0]);

        let pre: Preprocessor = read_json(&artifact.transformed_object_file_path).unwrap();
        assert_eq!(pre.n_features(), 2);
    }

    #[test]
    fn test_oversampling_only_grows_train() {
        let f = fixture(TRAIN, TEST, true);
        let artifact = f.stage.run(&f.ingestion, &f.passed).unwrap();
        let train = TransformedArray::load(&artifact.transformed_train_file_path).unwrap();
        let (_, y) = train.split().unwrap();
        assert_eq!(y.len(), 6);
        assert_eq!(y.iter().filter(|&&v| v == 1.0).count(), 3);
        let test = TransformedArray::load(&artifact.transformed_test_file_path).unwrap();
        assert_eq!(test.data.nrows(), 1);
    }

    #[test]
    fn test_failed_validation_gates_the_stage() {
        let f = fixture(TRAIN, TEST, false);
        let failed = ValidationArtifact {
            passed: false,
            message: "train: missing columns: Age".into(),
            ..f.passed.clone()
        };
        let err = f.stage.run(&f.ingestion, &failed).unwrap_err();
        assert!(matches!(err, StageError::Transformation(_)));
        assert!(err.to_string().contains("missing columns: Age"));
    }

    #[test]
    fn test_missing_target_value_is_an_error() {
        let f = fixture("Gender,Age,Response\nMale,20,\nFemale,40,0\n", TEST, false);
        let err = f.stage.run(&f.ingestion, &f.passed).unwrap_err();
        assert!(err.to_string().contains("row 0"));
    }

    #[test]
    fn test_missing_feature_column_is_an_error() {
        let f = fixture("Gender,Response\nMale,1\nFemale,0\n", TEST, false);
        let err = f.stage.run(&f.ingestion, &f.passed).unwrap_err();
        assert!(matches!(err, StageError::Transformation(_)));
        assert!(err.to_string().contains("Age"));
    }

    #[test]
    fn test_split_needs_two_columns() {
        let arr = TransformedArray {
            feature_names: vec![],
            target_column: "Response".into(),
            data: Array2::zeros((3, 1)),
        };
        assert!(matches!(arr.split(), Err(StageError::Training(_))));
    }
}
