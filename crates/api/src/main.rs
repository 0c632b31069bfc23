//! Customer Scoring - Main Entry Point

use std::path::PathBuf;

use anyhow::{Context, Result};
use api::config::AppConfig;
use api::training::train_model;
use api::{init_logging, run_server};
use clap::{Parser, Subcommand};
use inference_engine::Predictor;
use tracing::info;

#[derive(Parser)]
#[command(name = "customer-scoring")]
#[command(about = "Transaction scoring: training, batch prediction and HTTP serving", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to config/scoring.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve predictions over HTTP
    Serve,

    /// Select an algorithm, fit it and save the artifacts
    Train,

    /// Score a CSV file
    Predict {
        /// Input CSV (defaults to the configured test data)
        #[arg(long)]
        input: Option<PathBuf>,

        /// Where to write predictions
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    init_logging(&config.logging)?;

    info!("=== Customer Scoring v{} ===", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Serve => run_server(config).await?,
        Commands::Train => {
            let report = tokio::task::spawn_blocking(move || train_model(&config)).await??;
            for result in &report.results {
                info!(
                    "{}: {:.4} (±{:.4})",
                    result.name, result.mean_auc, result.std_auc
                );
            }
            info!(
                "Best algorithm {} saved to {}",
                report.best_algorithm,
                report.model_path.display()
            );
        }
        Commands::Predict { input, output } => {
            let input = input.unwrap_or_else(|| config.paths.test_data.clone());
            let predictor: Predictor = Predictor::new(config.predictor_config())?;
            predictor.load().context("Failed to load artifacts")?;

            let predictions = predictor.predict_from_source(&input, output.as_deref())?;
            let positive = predictions.results.iter().filter(|r| r.prediction).count();
            info!(
                "Scored {} rows from {}, {} predicted positive",
                predictions.len(),
                input.display(),
                positive
            );
        }
    }

    Ok(())
}
