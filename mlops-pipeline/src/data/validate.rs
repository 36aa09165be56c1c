//! Data validation: train/test files against the declared schema.
//!
//! A mismatch is a result, not an error. The stage only fails when it
//! cannot read its inputs or write its report.

use crate::artifact::{IngestionArtifact, ValidationArtifact};
use crate::config::DataValidationConfig;
use crate::data::frame::DataFrame;
use crate::data::schema::SchemaDefinition;
use crate::error::StageError;
use crate::persistence::atomic_write_yaml;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Outcome of one rule on one file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub check: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl CheckResult {
    fn new(check: &str, details: Vec<String>) -> Self {
        Self {
            check: check.to_string(),
            passed: details.is_empty(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReport {
    pub file: PathBuf,
    pub rows: usize,
    pub checks: Vec<CheckResult>,
}

impl FileReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

/// The YAML report written to `data_validation/report.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub validation_status: bool,
    pub message: String,
    pub files: Vec<FileReport>,
}

/// Run every rule against one frame.
pub fn validate_frame(schema: &SchemaDefinition, frame: &DataFrame) -> Vec<CheckResult> {
    let declared = schema.column_names();
    let observed: Vec<&str> = frame.columns().iter().map(String::as_str).collect();

    let mut count = Vec::new();
    if observed.len() != declared.len() {
        count.push(format!(
            "expected {} columns, found {}",
            declared.len(),
            observed.len()
        ));
    }

    let missing: Vec<&str> = declared
        .iter()
        .copied()
        .filter(|c| !observed.contains(c))
        .collect();
    let extra: Vec<&str> = observed
        .iter()
        .copied()
        .filter(|c| !declared.contains(c))
        .collect();
    let mut set = Vec::new();
    if !missing.is_empty() {
        set.push(format!("missing columns: {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        set.push(format!("unexpected columns: {}", extra.join(", ")));
    }

    let absent = |cols: &[String], role: &str| -> Vec<String> {
        let gone: Vec<&str> = cols
            .iter()
            .map(String::as_str)
            .filter(|c| !observed.contains(c))
            .collect();
        if gone.is_empty() {
            Vec::new()
        } else {
            vec![format!("missing {role} columns: {}", gone.join(", "))]
        }
    };

    let mut types = Vec::new();
    let mut ranges = Vec::new();
    for spec in &schema.columns {
        let Some(values) = frame.column(&spec.name) else {
            continue;
        };
        let mut bad_type = 0usize;
        let mut first_bad = None;
        let mut out_of_range = 0usize;
        for value in values {
            if !spec.dtype.accepts(value) {
                bad_type += 1;
                first_bad.get_or_insert_with(|| value.to_string());
                continue;
            }
            if let Some(v) = value.as_f64().filter(|_| spec.dtype.is_numeric()) {
                let below = spec.min.is_some_and(|min| v < min);
                let above = spec.max.is_some_and(|max| v > max);
                if below || above {
                    out_of_range += 1;
                }
            }
        }
        if bad_type > 0 {
            types.push(format!(
                "column {}: {bad_type} values are not {:?} (first: '{}')",
                spec.name,
                spec.dtype,
                first_bad.unwrap_or_default()
            ));
        }
        if out_of_range > 0 {
            ranges.push(format!(
                "column {}: {out_of_range} values outside [{}, {}]",
                spec.name,
                spec.min.map_or("-inf".to_string(), |v| v.to_string()),
                spec.max.map_or("inf".to_string(), |v| v.to_string()),
            ));
        }
    }

    vec![
        CheckResult::new("column_count", count),
        CheckResult::new("column_set", set),
        CheckResult::new(
            "numerical_columns",
            absent(&schema.numerical_columns, "numerical"),
        ),
        CheckResult::new(
            "categorical_columns",
            absent(&schema.categorical_columns, "categorical"),
        ),
        CheckResult::new("column_types", types),
        CheckResult::new("value_ranges", ranges),
    ]
}

pub struct DataValidation {
    config: DataValidationConfig,
}

impl DataValidation {
    pub fn new(config: DataValidationConfig) -> Self {
        Self { config }
    }

    fn validate_file(
        &self,
        schema: &SchemaDefinition,
        label: &str,
        path: &Path,
    ) -> Result<(FileReport, Vec<String>), StageError> {
        let frame = DataFrame::read_csv_with_text(path, &schema.text_columns())?;
        let checks = validate_frame(schema, &frame);
        let problems = checks
            .iter()
            .flat_map(|c| c.details.iter().map(move |d| format!("{label}: {d}")))
            .collect();
        Ok((
            FileReport {
                file: path.to_path_buf(),
                rows: frame.n_rows(),
                checks,
            },
            problems,
        ))
    }

    pub fn run(&self, ingestion: &IngestionArtifact) -> Result<ValidationArtifact, StageError> {
        let schema = SchemaDefinition::load(&self.config.schema_path)?;
        info!(
            schema = %self.config.schema_path.display(),
            columns = schema.columns.len(),
            "Validating ingested data"
        );

        let (train, mut problems) =
            self.validate_file(&schema, "train", &ingestion.train_file_path)?;
        let (test, test_problems) =
            self.validate_file(&schema, "test", &ingestion.test_file_path)?;
        problems.extend(test_problems);

        let passed = problems.is_empty();
        let message = problems.join("; ");
        let report = ValidationReport {
            validation_status: passed,
            message: message.clone(),
            files: vec![train, test],
        };
        atomic_write_yaml(&self.config.report_file_path, &report)?;

        if passed {
            info!("Validation passed");
        } else {
            warn!(%message, "Validation failed");
        }

        Ok(ValidationArtifact {
            passed,
            message,
            report_file_path: self.config.report_file_path.clone(),
        })
    }
}
