//! Model training: metrics, the persisted model unit, and the trainer stage.

pub mod metrics;
pub mod model;
pub mod trainer;

pub use metrics::{ConfusionCounts, POSITIVE_LABEL, classification_metric};
pub use model::{TrainedModel, data_hash};
pub use trainer::ModelTrainer;
