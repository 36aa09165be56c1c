//! Declarative feature engineering.
//!
//! A [`FeatureSpec`] lives in the `features` block of the schema file and
//! turns raw frame columns into a dense `f64` matrix. Missing inputs become
//! `NaN` and are left for the imputer.

use crate::data::document::FieldValue;
use crate::data::frame::DataFrame;
use crate::error::StageError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Versioned list of column derivations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub binary_maps: Vec<BinaryMap>,
    #[serde(default)]
    pub buckets: Vec<Bucket>,
    #[serde(default)]
    pub one_hot: Vec<OneHot>,
    /// Numeric columns copied as-is.
    #[serde(default)]
    pub passthrough: Vec<String>,
    /// Features z-scored after imputation.
    #[serde(default)]
    pub standard_scale: Vec<String>,
    /// Features scaled to [0, 1] after imputation.
    #[serde(default)]
    pub min_max_scale: Vec<String>,
}

impl Default for FeatureSpec {
    fn default() -> Self {
        Self {
            version: default_version(),
            binary_maps: Vec::new(),
            buckets: Vec::new(),
            one_hot: Vec::new(),
            passthrough: Vec::new(),
            standard_scale: Vec::new(),
            min_max_scale: Vec::new(),
        }
    }
}

fn default_version() -> u32 {
    1
}

/// Map text categories to numbers; unknown categories become missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryMap {
    pub column: String,
    pub mapping: BTreeMap<String, f64>,
}

/// Indicator columns for the intervals cut by `edges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub column: String,
    pub edges: Vec<f64>,
    #[serde(default)]
    pub drop_source: bool,
}

/// One indicator per declared category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHot {
    pub column: String,
    pub categories: Vec<String>,
    #[serde(default)]
    pub drop_first: bool,
}

/// One output column of the engineered matrix.
#[derive(Debug, Clone)]
enum Derived {
    Mapped { source: String, mapping: BTreeMap<String, f64> },
    Raw { source: String },
    Interval { source: String, lo: Option<f64>, hi: Option<f64> },
    Indicator { source: String, category: String },
}

impl Derived {
    fn source(&self) -> &str {
        match self {
            Self::Mapped { source, .. }
            | Self::Raw { source }
            | Self::Interval { source, .. }
            | Self::Indicator { source, .. } => source,
        }
    }
}

impl FeatureSpec {
    /// Output feature names, in matrix column order.
    pub fn feature_names(&self) -> Vec<String> {
        self.derivations().into_iter().map(|(name, _)| name).collect()
    }

    /// Raw columns this feature spec reads, deduplicated, in first-use order.
    pub fn source_columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.derivations()
            .into_iter()
            .map(|(_, d)| d.source().to_string())
            .filter(|c| seen.insert(c.clone()))
            .collect()
    }

    /// Columns read as category labels: binary-mapped or one-hot encoded.
    pub fn categorical_columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.binary_maps
            .iter()
            .map(|m| &m.column)
            .chain(self.one_hot.iter().map(|o| &o.column))
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect()
    }

    /// Columns read as numbers: passthrough and bucketed.
    pub fn numeric_columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.passthrough
            .iter()
            .chain(self.buckets.iter().map(|b| &b.column))
            .filter(|c| seen.insert(c.as_str()))
            .cloned()
            .collect()
    }

    /// Reject specs that cannot produce a well-formed matrix.
    pub fn check(&self) -> Result<(), StageError> {
        for bucket in &self.buckets {
            if bucket.edges.is_empty() {
                return Err(StageError::schema(format!(
                    "bucket on '{}' declares no edges",
                    bucket.column
                )));
            }
            let ascending = bucket.edges.windows(2).all(|w| w[0] < w[1]);
            if !ascending || bucket.edges.iter().any(|e| !e.is_finite()) {
                return Err(StageError::schema(format!(
                    "bucket edges on '{}' must be finite and strictly ascending",
                    bucket.column
                )));
            }
            if bucket.drop_source && self.passthrough.contains(&bucket.column) {
                return Err(StageError::schema(format!(
                    "'{}' is bucketed with drop_source but also listed as passthrough",
                    bucket.column
                )));
            }
        }
        for encoding in &self.one_hot {
            if encoding.categories.is_empty() {
                return Err(StageError::schema(format!(
                    "one-hot on '{}' declares no categories",
                    encoding.column
                )));
            }
        }

        let names = self.feature_names();
        if names.is_empty() {
            return Err(StageError::schema("feature spec produces no features"));
        }
        let mut unique = HashSet::new();
        if let Some(dup) = names.iter().find(|n| !unique.insert(n.as_str())) {
            return Err(StageError::schema(format!("duplicate feature name '{dup}'")));
        }
        for scaled in self.standard_scale.iter().chain(&self.min_max_scale) {
            if !unique.contains(scaled.as_str()) {
                return Err(StageError::schema(format!(
                    "scaled column '{scaled}' is not a produced feature"
                )));
            }
        }
        Ok(())
    }

    /// Build the feature matrix for every row of `frame`.
    pub fn engineer(&self, frame: &DataFrame) -> Result<Array2<f64>, StageError> {
        let derivations = self.derivations();
        let mut sources = Vec::with_capacity(derivations.len());
        for (_, derived) in &derivations {
            let idx = frame.column_index(derived.source()).ok_or_else(|| {
                StageError::transformation(format!(
                    "required column '{}' is missing",
                    derived.source()
                ))
            })?;
            sources.push(idx);
        }

        let mut out = Array2::<f64>::zeros((frame.n_rows(), derivations.len()));
        for (r, row) in frame.rows().iter().enumerate() {
            for (c, ((_, derived), &idx)) in derivations.iter().zip(&sources).enumerate() {
                out[[r, c]] = derive(derived, &row[idx])?;
            }
        }
        Ok(out)
    }

    fn derivations(&self) -> Vec<(String, Derived)> {
        let mut out = Vec::new();

        for map in &self.binary_maps {
            out.push((
                map.column.clone(),
                Derived::Mapped {
                    source: map.column.clone(),
                    mapping: map.mapping.clone(),
                },
            ));
        }

        for bucket in &self.buckets {
            let col = &bucket.column;
            if !bucket.drop_source && !self.passthrough.contains(col) {
                out.push((col.clone(), Derived::Raw { source: col.clone() }));
            }
            let edges = &bucket.edges;
            let mut bounds = Vec::with_capacity(edges.len() + 1);
            if let Some(first) = edges.first() {
                bounds.push((format!("{col}_lt_{first}"), None, Some(*first)));
            }
            for pair in edges.windows(2) {
                bounds.push((
                    format!("{col}_{}_{}", pair[0], pair[1]),
                    Some(pair[0]),
                    Some(pair[1]),
                ));
            }
            if let Some(last) = edges.last() {
                bounds.push((format!("{col}_ge_{last}"), Some(*last), None));
            }
            for (name, lo, hi) in bounds {
                out.push((
                    name,
                    Derived::Interval {
                        source: col.clone(),
                        lo,
                        hi,
                    },
                ));
            }
        }

        for encoding in &self.one_hot {
            let skip = usize::from(encoding.drop_first);
            for category in encoding.categories.iter().skip(skip) {
                out.push((
                    format!("{}_{}", encoding.column, sanitize_category(category)),
                    Derived::Indicator {
                        source: encoding.column.clone(),
                        category: category.clone(),
                    },
                ));
            }
        }

        for col in &self.passthrough {
            out.push((col.clone(), Derived::Raw { source: col.clone() }));
        }

        out
    }
}

fn derive(derived: &Derived, value: &FieldValue) -> Result<f64, StageError> {
    Ok(match derived {
        Derived::Mapped { mapping, .. } => match value {
            FieldValue::Missing => f64::NAN,
            other => mapping.get(&other.to_string()).copied().unwrap_or(f64::NAN),
        },
        Derived::Raw { source } => numeric(source, value)?,
        Derived::Interval { source, lo, hi } => {
            let v = numeric(source, value)?;
            if v.is_nan() {
                f64::NAN
            } else if lo.is_none_or(|lo| v >= lo) && hi.is_none_or(|hi| v < hi) {
                1.0
            } else {
                0.0
            }
        }
        Derived::Indicator { category, .. } => {
            if !value.is_missing() && value.to_string() == *category {
                1.0
            } else {
                0.0
            }
        }
    })
}

fn numeric(column: &str, value: &FieldValue) -> Result<f64, StageError> {
    match value {
        FieldValue::Missing => Ok(f64::NAN),
        other => other.as_f64().ok_or_else(|| {
            StageError::transformation(format!(
                "column '{column}' holds non-numeric value '{other}'"
            ))
        }),
    }
}

/// Make a category usable inside a feature name: `<`/`>` become `lt`/`gt`
/// and whitespace runs become a single underscore.
pub fn sanitize_category(category: &str) -> String {
    let replaced = category.replace('<', " lt ").replace('>', " gt ");
    replaced.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vehicle_spec() -> FeatureSpec {
        FeatureSpec {
            version: 2,
            binary_maps: vec![BinaryMap {
                column: "Gender".into(),
                mapping: BTreeMap::from([("Female".into(), 0.0), ("Male".into(), 1.0)]),
            }],
            buckets: vec![Bucket {
                column: "Age".into(),
                edges: vec![30.0, 50.0],
                drop_source: false,
            }],
            one_hot: vec![OneHot {
                column: "Vehicle_Age".into(),
                categories: vec!["< 1 Year".into(), "1-2 Year".into(), "> 2 Years".into()],
                drop_first: false,
            }],
            passthrough: vec!["Age".into(), "Annual_Premium".into()],
            standard_scale: vec!["Age".into()],
            min_max_scale: vec!["Annual_Premium".into()],
        }
    }

    fn frame() -> DataFrame {
        let mut frame = DataFrame::new(vec![
            "Gender".into(),
            "Age".into(),
            "Vehicle_Age".into(),
            "Annual_Premium".into(),
        ]);
        frame
            .push_row(vec![
                "Male".into(),
                FieldValue::Number(25.0),
                "> 2 Years".into(),
                FieldValue::Number(2630.0),
            ])
            .unwrap();
        frame
            .push_row(vec![
                "Other".into(),
                FieldValue::Missing,
                "3+ Years".into(),
                FieldValue::Number(40000.0),
            ])
            .unwrap();
        frame
    }

    #[test]
    fn test_sanitize_category() {
        assert_eq!(sanitize_category("< 1 Year"), "lt_1_Year");
        assert_eq!(sanitize_category("> 2 Years"), "gt_2_Years");
        assert_eq!(sanitize_category("1-2 Year"), "1-2_Year");
    }

    #[test]
    fn test_feature_names() {
        assert_eq!(
            vehicle_spec().feature_names(),
            vec![
                "Gender",
                "Age_lt_30",
                "Age_30_50",
                "Age_ge_50",
                "Vehicle_Age_lt_1_Year",
                "Vehicle_Age_1-2_Year",
                "Vehicle_Age_gt_2_Years",
                "Age",
                "Annual_Premium",
            ]
        );
        assert_eq!(
            vehicle_spec().source_columns(),
            vec!["Gender", "Age", "Vehicle_Age", "Annual_Premium"]
        );
    }

    #[test]
    fn test_drop_first_skips_first_category() {
        let mut spec = vehicle_spec();
        spec.one_hot[0].drop_first = true;
        let names = spec.feature_names();
        assert!(!names.contains(&"Vehicle_Age_lt_1_Year".to_string()));
        assert!(names.contains(&"Vehicle_Age_1-2_Year".to_string()));
    }

    #[test]
    fn test_engineer_rows() {
        let x = vehicle_spec().engineer(&frame()).unwrap();
        assert_eq!(x.dim(), (2, 9));
        assert_eq!(x.row(0).to_vec(), vec![1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 25.0, 2630.0]);

        let second = x.row(1);
        assert!(second[0].is_nan(), "unknown category maps to missing");
        assert!(second[1].is_nan() && second[7].is_nan(), "missing age stays missing");
        assert_eq!(&second.to_vec()[4..7], &[0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_engineer_requires_columns() {
        let mut frame = frame();
        frame.drop_columns(&["Annual_Premium".to_string()]);
        let err = vehicle_spec().engineer(&frame).unwrap_err();
        assert!(err.to_string().contains("Annual_Premium"));
    }

    #[test]
    fn test_engineer_rejects_text_in_numeric_column() {
        let mut frame = DataFrame::new(vec!["Annual_Premium".into()]);
        frame.push_row(vec!["lots".into()]).unwrap();
        let spec = FeatureSpec {
            passthrough: vec!["Annual_Premium".into()],
            ..FeatureSpec::default()
        };
        assert!(matches!(
            spec.engineer(&frame),
            Err(StageError::Transformation(_))
        ));
    }

    #[test]
    fn test_check_rejects_bad_specs() {
        assert!(vehicle_spec().check().is_ok());

        let mut unsorted = vehicle_spec();
        unsorted.buckets[0].edges = vec![50.0, 30.0];
        assert!(unsorted.check().is_err());

        let mut unknown_scale = vehicle_spec();
        unknown_scale.standard_scale.push("Vintage".into());
        assert!(unknown_scale.check().is_err());

        let mut conflicting = vehicle_spec();
        conflicting.buckets[0].drop_source = true;
        assert!(conflicting.check().is_err());

        assert!(FeatureSpec::default().check().is_err());
    }
}
