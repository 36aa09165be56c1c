//! mlops CLI: runs the training pipeline and its supporting chores.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Train, evaluate and deploy the insurance-response classifier
#[derive(Parser, Debug)]
#[command(name = "mlops", version, about, long_about = None)]
struct Cli {
    /// Workspace directory (relative paths in the configuration resolve here)
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path (merged over `<workspace>/mlops.toml`)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the full training pipeline once
    Run {
        /// Run directory name (defaults to the current local time)
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Score a CSV file with a trained model
    Predict {
        /// Input CSV with the same columns as the training data
        input: PathBuf,
        /// Where to write the scored CSV
        #[arg(short, long, default_value = "predictions.csv")]
        output: PathBuf,
        /// Local model file (model.json)
        #[arg(short, long, conflicts_with = "remote")]
        model: Option<PathBuf>,
        /// Use the model deployed in the artifact store
        #[arg(long)]
        remote: bool,
    },
    /// Seed the document store from a CSV file
    LoadData {
        /// CSV file, one document per row
        csv: PathBuf,
        /// Target collection (defaults to `source.collection_name`)
        #[arg(long)]
        collection: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Inspect the dataset schema
    Schema {
        #[command(subcommand)]
        action: SchemaAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Write a default mlops.toml into the workspace
    Init,
    /// Print the effective configuration
    Show,
}

#[derive(clap::Subcommand, Debug)]
enum SchemaAction {
    /// Load the schema and check it for internal consistency
    Check {
        /// Schema file (defaults to `validation.schema_path`)
        path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "mlops", "mlops")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "mlops.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
