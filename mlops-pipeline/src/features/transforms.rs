//! Fitted numeric transforms and the preprocessing object.
//!
//! Transformers come in two states: an unfitted [`Transformer`] carrying
//! hyperparameters, and the [`FittedTransformer`] it produces once it has
//! seen training data. Only fitted transformers are serialized.

use crate::data::frame::DataFrame;
use crate::error::StageError;
use crate::features::definition::FeatureSpec;
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Unfitted transformer.
pub trait Transformer {
    type Fitted: FittedTransformer;

    /// Learn parameters from training rows.
    fn fit(&self, data: ArrayView2<'_, f64>) -> Result<Self::Fitted, StageError>;

    fn fit_transform(
        &self,
        data: ArrayView2<'_, f64>,
    ) -> Result<(Self::Fitted, Array2<f64>), StageError> {
        let fitted = self.fit(data)?;
        let out = fitted.transform(data)?;
        Ok((fitted, out))
    }
}

/// Transformer with learned parameters.
pub trait FittedTransformer {
    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, StageError>;

    /// Width of the matrix seen during fit.
    fn n_features_in(&self) -> usize;

    fn check_width(&self, data: ArrayView2<'_, f64>) -> Result<(), StageError> {
        if data.ncols() != self.n_features_in() {
            return Err(StageError::transformation(format!(
                "expected {} features, got {}",
                self.n_features_in(),
                data.ncols()
            )));
        }
        Ok(())
    }
}

fn check_fit_input(data: ArrayView2<'_, f64>) -> Result<(), StageError> {
    if data.nrows() == 0 {
        return Err(StageError::transformation(
            "cannot fit a transform on zero rows",
        ));
    }
    Ok(())
}

fn check_columns(columns: &[usize], n_features: usize) -> Result<(), StageError> {
    match columns.iter().find(|&&c| c >= n_features) {
        Some(c) => Err(StageError::transformation(format!(
            "column index {c} out of range for {n_features} features"
        ))),
        None => Ok(()),
    }
}

/// Values of column `c`, skipping `NaN`.
fn present(data: ArrayView2<'_, f64>, c: usize) -> impl Iterator<Item = f64> + '_ {
    data.index_axis_move(Axis(1), c)
        .into_iter()
        .copied()
        .filter(|v| !v.is_nan())
}

// ---------------------------------------------------------------------------
// Mean imputation
// ---------------------------------------------------------------------------

/// Replace `NaN` with the column mean of the training data.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanImputer;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedMeanImputer {
    /// Fill value per column; 0.0 where the training column was all missing.
    pub means: Vec<f64>,
}

impl Transformer for MeanImputer {
    type Fitted = FittedMeanImputer;

    fn fit(&self, data: ArrayView2<'_, f64>) -> Result<FittedMeanImputer, StageError> {
        check_fit_input(data)?;
        let means = (0..data.ncols())
            .map(|c| {
                let (sum, n) = present(data, c).fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
                if n == 0 { 0.0 } else { sum / n as f64 }
            })
            .collect();
        Ok(FittedMeanImputer { means })
    }
}

impl FittedTransformer for FittedMeanImputer {
    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, StageError> {
        self.check_width(data)?;
        let mut out = data.to_owned();
        for (mut col, fill) in out.axis_iter_mut(Axis(1)).zip(&self.means) {
            col.mapv_inplace(|v| if v.is_nan() { *fill } else { v });
        }
        Ok(out)
    }

    fn n_features_in(&self) -> usize {
        self.means.len()
    }
}

// ---------------------------------------------------------------------------
// Standard scaling
// ---------------------------------------------------------------------------

/// Z-score the listed columns: `(x - mean) / std`.
#[derive(Debug, Clone, Default)]
pub struct StandardScaler {
    pub columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedStandardScaler {
    pub n_features: usize,
    pub columns: Vec<usize>,
    pub mean: Vec<f64>,
    /// Population standard deviation; 1.0 for constant columns.
    pub scale: Vec<f64>,
}

impl Transformer for StandardScaler {
    type Fitted = FittedStandardScaler;

    fn fit(&self, data: ArrayView2<'_, f64>) -> Result<FittedStandardScaler, StageError> {
        check_fit_input(data)?;
        check_columns(&self.columns, data.ncols())?;
        let mut mean = Vec::with_capacity(self.columns.len());
        let mut scale = Vec::with_capacity(self.columns.len());
        for &c in &self.columns {
            let values: Vec<f64> = present(data, c).collect();
            let n = values.len().max(1) as f64;
            let m = values.iter().sum::<f64>() / n;
            let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n;
            let std = var.sqrt();
            mean.push(m);
            scale.push(if std > f64::EPSILON { std } else { 1.0 });
        }
        Ok(FittedStandardScaler {
            n_features: data.ncols(),
            columns: self.columns.clone(),
            mean,
            scale,
        })
    }
}

impl FittedTransformer for FittedStandardScaler {
    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, StageError> {
        self.check_width(data)?;
        let mut out = data.to_owned();
        for ((&c, m), s) in self.columns.iter().zip(&self.mean).zip(&self.scale) {
            out.column_mut(c).mapv_inplace(|v| (v - m) / s);
        }
        Ok(out)
    }

    fn n_features_in(&self) -> usize {
        self.n_features
    }
}

// ---------------------------------------------------------------------------
// Min-max scaling
// ---------------------------------------------------------------------------

/// Rescale the listed columns to [0, 1] over the training range.
#[derive(Debug, Clone, Default)]
pub struct MinMaxScaler {
    pub columns: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedMinMaxScaler {
    pub n_features: usize,
    pub columns: Vec<usize>,
    pub min: Vec<f64>,
    /// `max - min`; 1.0 for constant columns.
    pub range: Vec<f64>,
}

impl Transformer for MinMaxScaler {
    type Fitted = FittedMinMaxScaler;

    fn fit(&self, data: ArrayView2<'_, f64>) -> Result<FittedMinMaxScaler, StageError> {
        check_fit_input(data)?;
        check_columns(&self.columns, data.ncols())?;
        let mut min = Vec::with_capacity(self.columns.len());
        let mut range = Vec::with_capacity(self.columns.len());
        for &c in &self.columns {
            let (lo, hi) = present(data, c).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if lo.is_finite() && hi.is_finite() {
                min.push(lo);
                range.push(if hi - lo > f64::EPSILON { hi - lo } else { 1.0 });
            } else {
                min.push(0.0);
                range.push(1.0);
            }
        }
        Ok(FittedMinMaxScaler {
            n_features: data.ncols(),
            columns: self.columns.clone(),
            min,
            range,
        })
    }
}

impl FittedTransformer for FittedMinMaxScaler {
    fn transform(&self, data: ArrayView2<'_, f64>) -> Result<Array2<f64>, StageError> {
        self.check_width(data)?;
        let mut out = data.to_owned();
        for ((&c, lo), r) in self.columns.iter().zip(&self.min).zip(&self.range) {
            out.column_mut(c).mapv_inplace(|v| (v - lo) / r);
        }
        Ok(out)
    }

    fn n_features_in(&self) -> usize {
        self.n_features
    }
}

// ---------------------------------------------------------------------------
// Preprocessor
// ---------------------------------------------------------------------------

/// Versioned description of the model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub feature_names: Vec<String>,
    /// Raw columns a frame must carry to be transformed.
    pub source_columns: Vec<String>,
}

/// Feature engineering followed by imputation and scaling, fitted once on
/// the training split and applied unchanged to every other frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub schema: FeatureSchema,
    spec: FeatureSpec,
    imputer: FittedMeanImputer,
    standard: FittedStandardScaler,
    min_max: FittedMinMaxScaler,
}

impl Preprocessor {
    pub fn fit(spec: &FeatureSpec, train: &DataFrame) -> Result<Self, StageError> {
        spec.check()?;
        if train.is_empty() {
            return Err(StageError::transformation(
                "cannot fit preprocessing on an empty training split",
            ));
        }
        let names = spec.feature_names();
        let resolve = |cols: &[String]| -> Vec<usize> {
            cols.iter()
                .filter_map(|c| names.iter().position(|n| n == c))
                .collect()
        };

        let raw = spec.engineer(train)?;
        let (imputer, imputed) = MeanImputer.fit_transform(raw.view())?;
        let (standard, scaled) = StandardScaler {
            columns: resolve(&spec.standard_scale),
        }
        .fit_transform(imputed.view())?;
        let min_max = MinMaxScaler {
            columns: resolve(&spec.min_max_scale),
        }
        .fit(scaled.view())?;

        tracing::debug!(
            features = names.len(),
            version = spec.version,
            rows = train.n_rows(),
            "Fitted preprocessor"
        );

        Ok(Self {
            schema: FeatureSchema {
                version: spec.version,
                feature_names: names,
                source_columns: spec.source_columns(),
            },
            spec: spec.clone(),
            imputer,
            standard,
            min_max,
        })
    }

    /// Engineer, impute and scale `frame` into a model-ready matrix.
    pub fn transform(&self, frame: &DataFrame) -> Result<Array2<f64>, StageError> {
        let raw = self.spec.engineer(frame)?;
        let imputed = self.imputer.transform(raw.view())?;
        let scaled = self.standard.transform(imputed.view())?;
        self.min_max.transform(scaled.view())
    }

    pub fn n_features(&self) -> usize {
        self.schema.feature_names.len()
    }

    /// Raw columns that must be read as text before [`transform`](Self::transform).
    pub fn text_columns(&self) -> Vec<String> {
        self.spec.categorical_columns()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::document::FieldValue;
    use ndarray::array;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mean_imputer_skips_nan() {
        let x = array![[1.0, f64::NAN], [3.0, f64::NAN], [f64::NAN, f64::NAN]];
        let (fitted, out) = MeanImputer.fit_transform(x.view()).unwrap();
        assert_eq!(fitted.means, vec![2.0, 0.0]);
        assert_eq!(out, array![[1.0, 0.0], [3.0, 0.0], [2.0, 0.0]]);
    }

    #[test]
    fn test_standard_scaler_only_touches_listed_columns() {
        let x = array![[1.0, 10.0], [3.0, 20.0]];
        let (fitted, out) = StandardScaler { columns: vec![0] }
            .fit_transform(x.view())
            .unwrap();
        assert_eq!(fitted.mean, vec![2.0]);
        assert_eq!(fitted.scale, vec![1.0]);
        assert_eq!(out, array![[-1.0, 10.0], [1.0, 20.0]]);
    }

    #[test]
    fn test_constant_columns_do_not_divide_by_zero() {
        let x = array![[5.0], [5.0]];
        let std = StandardScaler { columns: vec![0] }.fit(x.view()).unwrap();
        let mm = MinMaxScaler { columns: vec![0] }.fit(x.view()).unwrap();
        assert_eq!(std.transform(x.view()).unwrap(), array![[0.0], [0.0]]);
        assert_eq!(mm.transform(x.view()).unwrap(), array![[0.0], [0.0]]);
    }

    #[test]
    fn test_min_max_scaler_uses_training_range() {
        let train = array![[0.0], [10.0]];
        let fitted = MinMaxScaler { columns: vec![0] }.fit(train.view()).unwrap();
        let out = fitted.transform(array![[5.0], [20.0]].view()).unwrap();
        assert_eq!(out, array![[0.5], [2.0]]);
    }

    #[test]
    fn test_width_mismatch_is_an_error() {
        let fitted = MeanImputer.fit(array![[1.0, 2.0]].view()).unwrap();
        assert!(fitted.transform(array![[1.0]].view()).is_err());
        assert!(StandardScaler { columns: vec![3] }
            .fit(array![[1.0]].view())
            .is_err());
    }

    fn spec() -> FeatureSpec {
        FeatureSpec {
            passthrough: vec!["Age".into(), "Annual_Premium".into()],
            standard_scale: vec!["Age".into()],
            min_max_scale: vec!["Annual_Premium".into()],
            ..FeatureSpec::default()
        }
    }

    fn frame(rows: &[(f64, f64)]) -> DataFrame {
        let mut frame = DataFrame::new(vec!["Age".into(), "Annual_Premium".into()]);
        for &(age, premium) in rows {
            frame
                .push_row(vec![FieldValue::Number(age), FieldValue::Number(premium)])
                .unwrap();
        }
        frame
    }

    #[test]
    fn test_preprocessor_fit_and_transform() {
        let train = frame(&[(20.0, 100.0), (40.0, 300.0)]);
        let pre = Preprocessor::fit(&spec(), &train).unwrap();
        assert_eq!(pre.schema.feature_names, vec!["Age", "Annual_Premium"]);
        assert_eq!(pre.n_features(), 2);

        let out = pre.transform(&train).unwrap();
        assert_eq!(out, array![[-1.0, 0.0], [1.0, 1.0]]);
    }

    #[test]
    fn test_held_out_rows_use_training_statistics() {
        let pre = Preprocessor::fit(&spec(), &frame(&[(20.0, 100.0), (40.0, 300.0)])).unwrap();
        let held_out = frame(&[(90.0, 9000.0)]);
        assert_eq!(pre.transform(&held_out).unwrap(), array![[6.0, 44.5]]);
    }

    #[test]
    fn test_text_columns_follow_the_spec() {
        let spec = FeatureSpec {
            binary_maps: vec![crate::features::definition::BinaryMap {
                column: "Gender".into(),
                mapping: [("Female".to_string(), 0.0), ("Male".to_string(), 1.0)].into(),
            }],
            ..spec()
        };
        let mut train = DataFrame::new(vec!["Gender".into(), "Age".into(), "Annual_Premium".into()]);
        train
            .push_row(vec!["Male".into(), FieldValue::Number(20.0), FieldValue::Number(1.0)])
            .unwrap();
        let pre = Preprocessor::fit(&spec, &train).unwrap();
        assert_eq!(pre.text_columns(), vec!["Gender"]);
    }

    #[test]
    fn test_preprocessor_serde_roundtrip() {
        let train = frame(&[(20.0, 100.0), (40.0, 300.0), (35.0, 150.0)]);
        let pre = Preprocessor::fit(&spec(), &train).unwrap();
        let json = serde_json::to_string(&pre).unwrap();
        let back: Preprocessor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pre);
    }

    #[test]
    fn test_preprocessor_rejects_empty_train() {
        let err = Preprocessor::fit(&spec(), &frame(&[])).unwrap_err();
        assert!(matches!(err, StageError::Transformation(_)));
    }
}
