//! Declared dataset schema, loaded from YAML.

use crate::data::document::FieldValue;
use crate::error::StageError;
use crate::features::FeatureSpec;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Declared column data type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[serde(alias = "integer", alias = "int64")]
    Int,
    #[serde(alias = "float64", alias = "double")]
    Float,
    #[serde(alias = "string", alias = "object", alias = "text")]
    Category,
    #[serde(alias = "boolean")]
    Bool,
}

impl ColumnType {
    /// Whether a present value fits the type. Missing values always fit.
    pub fn accepts(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (_, FieldValue::Missing) => true,
            (Self::Int, FieldValue::Number(n)) => n.fract() == 0.0,
            (Self::Float, FieldValue::Number(_)) => true,
            (Self::Bool, FieldValue::Bool(_)) => true,
            (Self::Bool, FieldValue::Number(n)) => *n == 0.0 || *n == 1.0,
            // Categories are labels; numeric codes (Region_Code) are fine too.
            (Self::Category, _) => true,
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Float)
    }
}

/// One declared column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: ColumnType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// The schema file: declared columns, column roles and the feature spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub columns: Vec<ColumnSchema>,
    #[serde(default)]
    pub numerical_columns: Vec<String>,
    #[serde(default)]
    pub categorical_columns: Vec<String>,
    #[serde(default = "default_target_column")]
    pub target_column: String,
    #[serde(default)]
    pub features: FeatureSpec,
}

fn default_target_column() -> String {
    "Response".to_string()
}

impl SchemaDefinition {
    pub fn load(path: &Path) -> Result<Self, StageError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            StageError::schema(format!("cannot read schema {}: {e}", path.display()))
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, StageError> {
        let schema: Self = serde_yaml::from_str(text)?;
        if schema.columns.is_empty() {
            return Err(StageError::schema("schema declares no columns"));
        }
        Ok(schema)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Columns read verbatim as text: those the feature spec treats as
    /// categories, plus declared categorical columns it does not read as numbers.
    pub fn text_columns(&self) -> Vec<String> {
        let numeric = self.features.numeric_columns();
        let mut out = self.features.categorical_columns();
        let declared = self
            .columns
            .iter()
            .filter(|c| c.dtype == ColumnType::Category)
            .map(|c| &c.name)
            .chain(&self.categorical_columns);
        for name in declared {
            if !out.contains(name) && !numeric.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }

    /// Internal consistency: roles and features refer to declared columns.
    pub fn check(&self) -> Result<(), StageError> {
        let declared = self.column_names();
        let undeclared: Vec<&str> = self
            .numerical_columns
            .iter()
            .chain(&self.categorical_columns)
            .map(String::as_str)
            .chain(std::iter::once(self.target_column.as_str()))
            .filter(|c| !declared.contains(c))
            .collect();
        if !undeclared.is_empty() {
            return Err(StageError::schema(format!(
                "columns referenced but not declared: {}",
                undeclared.join(", ")
            )));
        }
        self.features.check()?;
        if let Some(col) = self
            .features
            .source_columns()
            .into_iter()
            .find(|c| !declared.contains(&c.as_str()))
        {
            return Err(StageError::schema(format!(
                "feature source column '{col}' is not declared"
            )));
        }
        if self.features.source_columns().contains(&self.target_column) {
            return Err(StageError::schema(format!(
                "target column '{}' cannot be used as a feature",
                self.target_column
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &str = r#"
columns:
  - name: Gender
    dtype: category
  - name: Age
    dtype: int
    min: 0
    max: 120
  - name: Annual_Premium
    dtype: float64
  - name: Response
    dtype: int
numerical_columns: [Age, Annual_Premium]
categorical_columns: [Gender]
features:
  version: 3
  binary_maps:
    - column: Gender
      mapping: { Female: 0, Male: 1 }
  passthrough: [Age, Annual_Premium]
  standard_scale: [Age]
"#;

    #[test]
    fn test_parse_schema() {
        let schema = SchemaDefinition::from_yaml_str(SCHEMA).unwrap();
        assert_eq!(schema.column_names(), vec!["Gender", "Age", "Annual_Premium", "Response"]);
        assert_eq!(schema.target_column, "Response");
        assert_eq!(schema.column("Annual_Premium").unwrap().dtype, ColumnType::Float);
        assert_eq!(schema.column("Age").unwrap().max, Some(120.0));
        assert_eq!(schema.features.version, 3);
        schema.check().unwrap();
    }

    #[test]
    fn test_check_flags_undeclared_roles() {
        let mut schema = SchemaDefinition::from_yaml_str(SCHEMA).unwrap();
        schema.numerical_columns.push("Vintage".into());
        let err = schema.check().unwrap_err();
        assert!(err.to_string().contains("Vintage"));
    }

    #[test]
    fn test_check_rejects_target_as_feature() {
        let mut schema = SchemaDefinition::from_yaml_str(SCHEMA).unwrap();
        schema.features.passthrough.push("Response".into());
        assert!(schema.check().is_err());
    }

    #[test]
    fn test_column_type_accepts() {
        assert!(ColumnType::Int.accepts(&FieldValue::Number(3.0)));
        assert!(!ColumnType::Int.accepts(&FieldValue::Number(3.5)));
        assert!(ColumnType::Float.accepts(&FieldValue::Missing));
        assert!(!ColumnType::Float.accepts(&FieldValue::from("abc")));
        assert!(ColumnType::Bool.accepts(&FieldValue::Number(1.0)));
        assert!(!ColumnType::Bool.accepts(&FieldValue::Number(2.0)));
        assert!(ColumnType::Category.accepts(&FieldValue::Number(28.0)));
    }

    #[test]
    fn test_text_columns() {
        let mut schema = SchemaDefinition::from_yaml_str(SCHEMA).unwrap();
        assert_eq!(schema.text_columns(), vec!["Gender"]);

        schema.columns.push(ColumnSchema {
            name: "Region_Code".into(),
            dtype: ColumnType::Category,
            min: None,
            max: None,
        });
        schema.categorical_columns.push("Policy".into());
        schema.features.passthrough.push("Region_Code".into());
        assert_eq!(schema.text_columns(), vec!["Gender", "Policy"]);
    }

    #[test]
    fn test_empty_schema_is_rejected() {
        assert!(SchemaDefinition::from_yaml_str("columns: []").is_err());
    }
}
