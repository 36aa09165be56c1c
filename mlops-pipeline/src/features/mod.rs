//! Feature engineering, preprocessing and class balancing.

pub mod definition;
pub mod resample;
pub mod transforms;

pub use definition::{BinaryMap, Bucket, FeatureSpec, OneHot, sanitize_category};
pub use resample::{ClassCounts, random_oversample};
pub use transforms::{
    FeatureSchema, FittedMeanImputer, FittedMinMaxScaler, FittedStandardScaler,
    FittedTransformer, MeanImputer, MinMaxScaler, Preprocessor, StandardScaler, Transformer,
};
