//! Configuration for the training pipeline.
//!
//! [`PipelineConfig`] is the user-facing configuration, layered by
//! [`load_config`] from defaults, TOML files and `MLOPS_*` environment
//! variables. [`TrainingPipelineConfig`] pins a run directory to a timestamp
//! and hands out the immutable per-stage configs.

use crate::algorithms::{ForestParams, MaxFeatures, SplitCriterion};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Optional name used to tag runs.
    #[serde(default)]
    pub pipeline_name: String,
    /// Root directory under which every run gets a timestamped directory.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Document store holding the raw records.
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub ingestion: IngestionSettings,
    #[serde(default)]
    pub validation: ValidationSettings,
    #[serde(default)]
    pub transformation: TransformationSettings,
    #[serde(default)]
    pub trainer: TrainerSettings,
    #[serde(default)]
    pub evaluation: EvaluationSettings,
    /// Remote artifact store the accepted model is pushed to.
    #[serde(default)]
    pub store: StoreConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: String::new(),
            artifact_dir: default_artifact_dir(),
            source: SourceConfig::default(),
            ingestion: IngestionSettings::default(),
            validation: ValidationSettings::default(),
            transformation: TransformationSettings::default(),
            trainer: TrainerSettings::default(),
            evaluation: EvaluationSettings::default(),
            store: StoreConfig::default(),
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifact")
}

/// Document store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// `sqlite://<path>`, a plain path, or `memory`.
    #[serde(default = "default_connection_url")]
    pub connection_url: String,
    #[serde(default = "default_database_name")]
    pub database_name: String,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            connection_url: default_connection_url(),
            database_name: default_database_name(),
            collection_name: default_collection_name(),
        }
    }
}

fn default_connection_url() -> String {
    "sqlite://data/proj1.db".to_string()
}

fn default_database_name() -> String {
    "Proj1".to_string()
}

fn default_collection_name() -> String {
    "Proj1-Data".to_string()
}

/// Ingestion settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSettings {
    /// Fraction of rows held out for the test split, in (0, 1).
    #[serde(default = "default_split_ratio")]
    pub split_ratio: f64,
    /// Seed for the split shuffle. Unset means a fresh entropy seed per run.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Identifier fields dropped from the snapshot.
    #[serde(default = "default_id_columns")]
    pub id_columns: Vec<String>,
    /// Text tokens treated as missing values (case-insensitive).
    #[serde(default = "default_na_tokens")]
    pub na_tokens: Vec<String>,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            split_ratio: default_split_ratio(),
            seed: None,
            id_columns: default_id_columns(),
            na_tokens: default_na_tokens(),
        }
    }
}

fn default_split_ratio() -> f64 {
    0.25
}

fn default_id_columns() -> Vec<String> {
    vec!["_id".to_string(), "id".to_string()]
}

fn default_na_tokens() -> Vec<String> {
    vec!["na".to_string()]
}

/// Validation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationSettings {
    /// Declared schema (YAML).
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            schema_path: default_schema_path(),
        }
    }
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("config").join("schema.yaml")
}

/// Transformation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationSettings {
    /// Oversample minority classes of the training split to parity.
    #[serde(default = "default_true")]
    pub oversample: bool,
    /// Seed for oversampling.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for TransformationSettings {
    fn default() -> Self {
        Self {
            oversample: true,
            seed: None,
        }
    }
}

/// Classifier hyperparameters and the acceptance floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerSettings {
    /// Minimum test accuracy for the trained model to be kept.
    #[serde(default = "default_expected_score")]
    pub expected_score: f64,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_criterion")]
    pub criterion: SplitCriterion,
    #[serde(default)]
    pub max_features: MaxFeatures,
    #[serde(default = "default_random_state")]
    pub random_state: u64,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            expected_score: default_expected_score(),
            n_estimators: default_n_estimators(),
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            max_depth: default_max_depth(),
            criterion: default_criterion(),
            max_features: MaxFeatures::default(),
            random_state: default_random_state(),
        }
    }
}

impl TrainerSettings {
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_depth: self.max_depth,
            criterion: self.criterion,
            max_features: self.max_features,
            random_state: self.random_state,
        }
    }
}

fn default_expected_score() -> f64 {
    0.6
}

fn default_n_estimators() -> usize {
    200
}

fn default_min_samples_split() -> usize {
    7
}

fn default_min_samples_leaf() -> usize {
    6
}

fn default_max_depth() -> usize {
    10
}

fn default_criterion() -> SplitCriterion {
    SplitCriterion::Entropy
}

fn default_random_state() -> u64 {
    101
}

/// Evaluation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationSettings {
    /// Minimum F1 improvement over the deployed model required for acceptance.
    #[serde(default = "default_changed_threshold")]
    pub changed_threshold_score: f64,
}

impl Default for EvaluationSettings {
    fn default() -> Self {
        Self {
            changed_threshold_score: default_changed_threshold(),
        }
    }
}

fn default_changed_threshold() -> f64 {
    0.02
}

/// Remote artifact store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_bucket_name")]
    pub bucket_name: String,
    /// Key of the deployed model inside the bucket.
    #[serde(default = "default_model_key")]
    pub model_key: String,
    #[serde(default)]
    pub backend: StoreBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            bucket_name: default_bucket_name(),
            model_key: default_model_key(),
            backend: StoreBackend::default(),
        }
    }
}

fn default_bucket_name() -> String {
    "my-model-mlopsproj".to_string()
}

fn default_model_key() -> String {
    "model-registry/model.json".to_string()
}

/// Where buckets live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreBackend {
    /// Buckets are directories under `root`.
    Local {
        #[serde(default = "default_local_root")]
        root: PathBuf,
    },
    /// S3-compatible path-style HTTP endpoint.
    Http {
        endpoint: String,
        #[serde(default)]
        token: Option<String>,
    },
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::Local {
            root: default_local_root(),
        }
    }
}

fn default_local_root() -> PathBuf {
    PathBuf::from(".mlops").join("buckets")
}

fn default_true() -> bool {
    true
}

/// Load configuration from defaults, config files and the environment.
///
/// Layers, lowest precedence first:
/// 1. built-in defaults
/// 2. `~/.config/mlops/config.toml` (user-level)
/// 3. `<workspace>/mlops.toml`
/// 4. `explicit` file, when given
/// 5. `MONGODB_URL` (mapped to `source.connection_url`)
/// 6. `MLOPS_*` variables, `__` separating nested keys
///    (`MLOPS_TRAINER__N_ESTIMATORS=50`)
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(dirs) = directories::ProjectDirs::from("dev", "mlops", "mlops") {
        let user_config = dirs.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join("mlops.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    figment = figment
        .merge(
            Env::raw()
                .only(&["MONGODB_URL"])
                .map(|_| "source.connection_url".into()),
        )
        .merge(Env::prefixed("MLOPS_").split("__"));

    figment.extract().map_err(Box::new)
}

// ---------------------------------------------------------------------------
// Per-run stage configs
// ---------------------------------------------------------------------------

/// Run-scoped configuration: the timestamped directory every stage writes into.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPipelineConfig {
    pub pipeline_name: String,
    pub artifact_dir: PathBuf,
    pub timestamp: String,
    config: PipelineConfig,
}

impl TrainingPipelineConfig {
    /// Pin a run directory to the current local time.
    pub fn new(config: PipelineConfig) -> Self {
        let timestamp = chrono::Local::now().format("%m_%d_%Y_%H_%M_%S").to_string();
        Self::at(config, &timestamp)
    }

    /// Pin a run directory to an explicit timestamp.
    pub fn at(config: PipelineConfig, timestamp: &str) -> Self {
        Self {
            pipeline_name: config.pipeline_name.clone(),
            artifact_dir: config.artifact_dir.join(timestamp),
            timestamp: timestamp.to_string(),
            config,
        }
    }

    pub fn data_ingestion(&self) -> DataIngestionConfig {
        let dir = self.artifact_dir.join(DATA_INGESTION_DIR);
        let ingestion = &self.config.ingestion;
        DataIngestionConfig {
            feature_store_file_path: dir.join("feature_store").join(FEATURE_STORE_FILE),
            training_file_path: dir.join("ingested").join(TRAIN_FILE),
            testing_file_path: dir.join("ingested").join(TEST_FILE),
            data_ingestion_dir: dir,
            collection_name: self.config.source.collection_name.clone(),
            split_ratio: ingestion.split_ratio,
            seed: ingestion.seed,
            id_columns: ingestion.id_columns.clone(),
            na_tokens: ingestion.na_tokens.clone(),
        }
    }

    pub fn data_validation(&self) -> DataValidationConfig {
        let dir = self.artifact_dir.join(DATA_VALIDATION_DIR);
        DataValidationConfig {
            report_file_path: dir.join(VALIDATION_REPORT_FILE),
            data_validation_dir: dir,
            schema_path: self.config.validation.schema_path.clone(),
        }
    }

    pub fn data_transformation(&self) -> DataTransformationConfig {
        let dir = self.artifact_dir.join(DATA_TRANSFORMATION_DIR);
        DataTransformationConfig {
            transformed_train_file_path: dir.join("transformed").join(TRANSFORMED_TRAIN_FILE),
            transformed_test_file_path: dir.join("transformed").join(TRANSFORMED_TEST_FILE),
            transformed_object_file_path: dir
                .join("transformed_object")
                .join(PREPROCESSING_OBJECT_FILE),
            data_transformation_dir: dir,
            schema_path: self.config.validation.schema_path.clone(),
            oversample: self.config.transformation.oversample,
            seed: self.config.transformation.seed,
        }
    }

    pub fn model_trainer(&self) -> ModelTrainerConfig {
        let dir = self.artifact_dir.join(MODEL_TRAINER_DIR);
        ModelTrainerConfig {
            trained_model_file_path: dir.join("trained_model").join(MODEL_FILE),
            model_trainer_dir: dir,
            expected_score: self.config.trainer.expected_score,
            forest: self.config.trainer.forest_params(),
        }
    }

    pub fn model_evaluation(&self) -> ModelEvaluationConfig {
        ModelEvaluationConfig {
            changed_threshold_score: self.config.evaluation.changed_threshold_score,
            bucket_name: self.config.store.bucket_name.clone(),
            model_key: self.config.store.model_key.clone(),
        }
    }

    pub fn model_pusher(&self) -> ModelPusherConfig {
        ModelPusherConfig {
            bucket_name: self.config.store.bucket_name.clone(),
            model_key: self.config.store.model_key.clone(),
        }
    }

    /// Summary file written by the orchestrator at the end of a run.
    pub fn run_summary_path(&self) -> PathBuf {
        self.artifact_dir.join(RUN_SUMMARY_FILE)
    }
}

pub const DATA_INGESTION_DIR: &str = "data_ingestion";
pub const DATA_VALIDATION_DIR: &str = "data_validation";
pub const DATA_TRANSFORMATION_DIR: &str = "data_transformation";
pub const MODEL_TRAINER_DIR: &str = "model_trainer";
pub const FEATURE_STORE_FILE: &str = "data.csv";
pub const TRAIN_FILE: &str = "train.csv";
pub const TEST_FILE: &str = "test.csv";
pub const TRANSFORMED_TRAIN_FILE: &str = "train.json";
pub const TRANSFORMED_TEST_FILE: &str = "test.json";
pub const PREPROCESSING_OBJECT_FILE: &str = "preprocessing.json";
pub const VALIDATION_REPORT_FILE: &str = "report.yaml";
pub const MODEL_FILE: &str = "model.json";
pub const RUN_SUMMARY_FILE: &str = "run.json";

/// Ingestion stage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataIngestionConfig {
    pub data_ingestion_dir: PathBuf,
    pub feature_store_file_path: PathBuf,
    pub training_file_path: PathBuf,
    pub testing_file_path: PathBuf,
    pub collection_name: String,
    pub split_ratio: f64,
    pub seed: Option<u64>,
    pub id_columns: Vec<String>,
    pub na_tokens: Vec<String>,
}

/// Validation stage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataValidationConfig {
    pub data_validation_dir: PathBuf,
    pub report_file_path: PathBuf,
    pub schema_path: PathBuf,
}

/// Transformation stage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransformationConfig {
    pub data_transformation_dir: PathBuf,
    pub transformed_train_file_path: PathBuf,
    pub transformed_test_file_path: PathBuf,
    pub transformed_object_file_path: PathBuf,
    pub schema_path: PathBuf,
    pub oversample: bool,
    pub seed: Option<u64>,
}

/// Trainer stage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelTrainerConfig {
    pub model_trainer_dir: PathBuf,
    pub trained_model_file_path: PathBuf,
    pub expected_score: f64,
    pub forest: ForestParams,
}

/// Evaluation stage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEvaluationConfig {
    pub changed_threshold_score: f64,
    pub bucket_name: String,
    pub model_key: String,
}

/// Pusher stage config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPusherConfig {
    pub bucket_name: String,
    pub model_key: String,
}
