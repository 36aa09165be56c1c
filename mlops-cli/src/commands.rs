//! CLI subcommand handlers.

use crate::Commands;
use crate::ConfigAction;
use crate::SchemaAction;
use anyhow::Context;
use mlops_pipeline::config::{PipelineConfig, StoreBackend, TrainingPipelineConfig};
use mlops_pipeline::data::{
    DocumentStore, SchemaDefinition, SqliteDocumentStore, SqliteTarget, documents_from_csv,
};
use mlops_pipeline::predict::{fetch_model, predict_csv};
use mlops_pipeline::{PipelineOutcome, TrainPipeline, TrainedModel, open_artifact_store};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

/// Written by `config init` when the workspace has no schema yet.
const DEFAULT_SCHEMA: &str = include_str!("../../config/schema.yaml");

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Run { timestamp } => {
            let config = load(workspace, config_path)?;
            handle_run(config, timestamp).await
        }
        Commands::Predict {
            input,
            output,
            model,
            remote,
        } => {
            let config = load(workspace, config_path)?;
            handle_predict(
                &config,
                &anchor_path(workspace, &input),
                &anchor_path(workspace, &output),
                model.map(|m| anchor_path(workspace, &m)),
                remote,
            )
            .await
        }
        Commands::LoadData { csv, collection } => {
            let config = load(workspace, config_path)?;
            handle_load_data(&config, &anchor_path(workspace, &csv), collection).await
        }
        Commands::Config { action } => handle_config(action, workspace, config_path),
        Commands::Schema { action } => handle_schema(action, workspace, config_path),
    }
}

/// Load configuration and resolve its relative paths against `workspace`.
fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    let mut config = mlops_pipeline::load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    anchor(&mut config, workspace);
    Ok(config)
}

fn anchor_path(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

fn anchor(config: &mut PipelineConfig, workspace: &Path) {
    config.artifact_dir = anchor_path(workspace, &config.artifact_dir);
    config.validation.schema_path = anchor_path(workspace, &config.validation.schema_path);
    if let StoreBackend::Local { root } = &mut config.store.backend {
        *root = anchor_path(workspace, root);
    }
    if let Ok(SqliteTarget::File(path)) = SqliteTarget::parse(&config.source.connection_url) {
        config.source.connection_url =
            format!("sqlite://{}", anchor_path(workspace, &path).display());
    }
}

async fn handle_run(config: PipelineConfig, timestamp: Option<String>) -> anyhow::Result<()> {
    let source = &config.source;
    let documents = SqliteDocumentStore::connect(&source.connection_url, &source.database_name)
        .inspect_err(|e| error!(stage = "ingesting", error = %e, "Cannot open document store"))
        .context("opening the document store")?;
    let artifacts = open_artifact_store(&config.store).context("opening the artifact store")?;

    let run = match timestamp {
        Some(ts) => TrainingPipelineConfig::at(config, &ts),
        None => TrainingPipelineConfig::new(config),
    };
    let run_dir = run.artifact_dir.clone();
    let pipeline = TrainPipeline::new(run, Arc::new(documents), artifacts);

    match pipeline.run().await {
        Ok(PipelineOutcome::Deployed { artifacts, pusher }) => {
            println!(
                "Model deployed to {} (f1 {:.4})",
                pusher.remote_model_path, artifacts.trainer.metric.f1_score
            );
            println!("Run directory: {}", run_dir.display());
            Ok(())
        }
        Ok(PipelineOutcome::Rejected { artifacts }) => {
            info!(
                score_delta = artifacts.evaluation.score_delta,
                "Deployment skipped: the trained model did not beat the deployed one"
            );
            println!(
                "Deployment skipped (f1 {:.4}, delta {:+.4})",
                artifacts.evaluation.trained_model_f1, artifacts.evaluation.score_delta
            );
            println!("Run directory: {}", run_dir.display());
            Ok(())
        }
        Err(e) => {
            error!(stage = %e.stage, error = %e.source, "Training pipeline failed");
            Err(e.into())
        }
    }
}

async fn handle_predict(
    config: &PipelineConfig,
    input: &Path,
    output: &Path,
    model: Option<PathBuf>,
    remote: bool,
) -> anyhow::Result<()> {
    let model = match (model, remote) {
        (Some(path), _) => TrainedModel::load(&path)
            .with_context(|| format!("loading model from {}", path.display()))?,
        (None, true) => {
            let store = open_artifact_store(&config.store)?;
            fetch_model(store.as_ref(), &config.store.model_key)
                .await
                .context("fetching the deployed model")?
        }
        (None, false) => anyhow::bail!("pass --model <path> or --remote"),
    };
    info!(model = %model.id, created_at = %model.created_at, "Loaded model");

    let rows = predict_csv(&model, input, output)
        .with_context(|| format!("scoring {}", input.display()))?;
    println!("Scored {} rows into {}", rows, output.display());
    Ok(())
}

async fn handle_load_data(
    config: &PipelineConfig,
    csv: &Path,
    collection: Option<String>,
) -> anyhow::Result<()> {
    let collection = collection.unwrap_or_else(|| config.source.collection_name.clone());
    let schema_path = &config.validation.schema_path;
    let text_columns = if schema_path.exists() {
        SchemaDefinition::load(schema_path)?.text_columns()
    } else {
        info!(schema = %schema_path.display(), "No schema; inferring every column's type");
        Vec::new()
    };
    let docs = documents_from_csv(csv, &text_columns)
        .with_context(|| format!("reading {}", csv.display()))?;
    let store =
        SqliteDocumentStore::create(&config.source.connection_url, &config.source.database_name)
            .context("opening the document store")?;
    let inserted = store.insert_many(&collection, docs).await?;
    println!(
        "Inserted {} documents into '{}' ({})",
        inserted,
        collection,
        store.describe()
    );
    Ok(())
}

fn handle_config(
    action: ConfigAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace.join("mlops.toml");
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
            } else {
                let default_config = PipelineConfig::default();
                let toml_str = toml::to_string_pretty(&default_config)?;
                std::fs::write(&config_path, &toml_str)?;
                println!(
                    "Created default configuration at: {}",
                    config_path.display()
                );
            }

            let schema_path = workspace.join(&PipelineConfig::default().validation.schema_path);
            if !schema_path.exists() {
                if let Some(parent) = schema_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&schema_path, DEFAULT_SCHEMA)?;
                println!("Created sample schema at: {}", schema_path.display());
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = mlops_pipeline::load_config(Some(workspace), config_path)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

fn handle_schema(
    action: SchemaAction,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    match action {
        SchemaAction::Check { path } => {
            let path = match path {
                Some(p) => anchor_path(workspace, &p),
                None => load(workspace, config_path)?.validation.schema_path,
            };
            let schema = SchemaDefinition::load(&path)?;
            schema
                .check()
                .with_context(|| format!("schema {} is inconsistent", path.display()))?;

            let features = schema.features.feature_names();
            println!("Schema OK: {}", path.display());
            println!("  columns:  {}", schema.columns.len());
            println!("  target:   {}", schema.target_column);
            println!("  features: {} ({})", features.len(), features.join(", "));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlops_pipeline::data::DataFrame;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const TEST_CONFIG: &str = r#"
[ingestion]
seed = 11

[transformation]
seed = 3

[trainer]
n_estimators = 10
min_samples_split = 2
min_samples_leaf = 1
"#;

    fn write_dataset(path: &Path, n: usize) {
        let mut csv = String::from(
            "id,Gender,Age,Driving_License,Region_Code,Previously_Insured,Vehicle_Age,\
             Vehicle_Damage,Annual_Premium,Policy_Sales_Channel,Vintage,Response\n",
        );
        let vehicle_ages = ["< 1 Year", "1-2 Year", "> 2 Years"];
        for i in 0..n {
            let damaged = i % 2 == 0;
            let insured = (i / 2) % 2 == 1;
            csv.push_str(&format!(
                "{},{},{},1,{}.0,{},{},{},{}.0,{}.0,{},{}\n",
                i + 1,
                if i % 3 == 0 { "Female" } else { "Male" },
                21 + (i * 5) % 60,
                i % 50,
                u8::from(insured),
                vehicle_ages[i % 3],
                if damaged { "Yes" } else { "No" },
                25_000 + i * 97,
                [26, 124, 152][i % 3],
                10 + (i * 13) % 280,
                u8::from(damaged && !insured),
            ));
        }
        std::fs::write(path, csv).unwrap();
    }

    #[tokio::test]
    async fn test_config_init_creates_files() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, None).await.unwrap();

        let content = std::fs::read_to_string(workspace.join("mlops.toml")).unwrap();
        let parsed: PipelineConfig = toml::from_str(&content).unwrap();
        assert_eq!(parsed.trainer.n_estimators, 200);
        assert_eq!(parsed.store.bucket_name, "my-model-mlopsproj");

        let schema = SchemaDefinition::load(&workspace.join("config").join("schema.yaml")).unwrap();
        schema.check().unwrap();
    }

    #[tokio::test]
    async fn test_config_init_idempotent() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        std::fs::write(workspace.join("mlops.toml"), TEST_CONFIG).unwrap();

        let command = Commands::Config {
            action: ConfigAction::Init,
        };
        handle_command(command, workspace, None).await.unwrap();

        let content = std::fs::read_to_string(workspace.join("mlops.toml")).unwrap();
        assert_eq!(content, TEST_CONFIG);
    }

    #[test]
    fn test_anchor_resolves_relative_paths() {
        let mut config = PipelineConfig::default();
        anchor(&mut config, Path::new("/ws"));
        assert_eq!(config.artifact_dir, PathBuf::from("/ws/artifact"));
        assert_eq!(
            config.validation.schema_path,
            PathBuf::from("/ws/config/schema.yaml")
        );
        assert_eq!(config.source.connection_url, "sqlite:///ws/data/proj1.db");

        let mut memory = PipelineConfig::default();
        memory.source.connection_url = "memory".into();
        anchor(&mut memory, Path::new("/ws"));
        assert_eq!(memory.source.connection_url, "memory");
    }

    #[tokio::test]
    async fn test_schema_check_rejects_inconsistent_schema() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            "columns:\n  - { name: Age, dtype: int }\nnumerical_columns: [Vintage]\n",
        )
        .unwrap();

        let command = Commands::Schema {
            action: SchemaAction::Check {
                path: Some(path.clone()),
            },
        };
        assert!(handle_command(command, dir.path(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_run_without_database_fails() {
        let dir = TempDir::new().unwrap();
        let command = Commands::Run { timestamp: None };
        assert!(handle_command(command, dir.path(), None).await.is_err());
    }

    #[tokio::test]
    async fn test_load_data_run_and_predict() {
        let dir = TempDir::new().unwrap();
        let workspace = dir.path();
        std::fs::write(workspace.join("mlops.toml"), TEST_CONFIG).unwrap();
        handle_command(
            Commands::Config {
                action: ConfigAction::Init,
            },
            workspace,
            None,
        )
        .await
        .unwrap();
        write_dataset(&workspace.join("data.csv"), 80);

        handle_command(
            Commands::LoadData {
                csv: PathBuf::from("data.csv"),
                collection: None,
            },
            workspace,
            None,
        )
        .await
        .unwrap();
        assert!(workspace.join("data").join("proj1.db").exists());

        handle_command(
            Commands::Run {
                timestamp: Some("cli_run".into()),
            },
            workspace,
            None,
        )
        .await
        .unwrap();
        let run_dir = workspace.join("artifact").join("cli_run");
        assert!(run_dir.join("run.json").exists());
        assert!(
            workspace
                .join(".mlops/buckets/my-model-mlopsproj/model-registry/model.json")
                .exists()
        );

        handle_command(
            Commands::Predict {
                input: PathBuf::from("data.csv"),
                output: PathBuf::from("scored.csv"),
                model: None,
                remote: true,
            },
            workspace,
            None,
        )
        .await
        .unwrap();
        let scored = DataFrame::read_csv(&workspace.join("scored.csv")).unwrap();
        assert_eq!(scored.n_rows(), 80);
        assert_eq!(scored.columns().last().map(String::as_str), Some("prediction"));

        // A local model file works the same way.
        handle_command(
            Commands::Predict {
                input: PathBuf::from("data.csv"),
                output: PathBuf::from("scored_local.csv"),
                model: Some(run_dir.join("model_trainer/trained_model/model.json")),
                remote: false,
            },
            workspace,
            None,
        )
        .await
        .unwrap();
        assert!(workspace.join("scored_local.csv").exists());
    }
}
