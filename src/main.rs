mod api;
mod cli;
mod config;
mod error;
mod learners;
mod models;
mod services;
mod store;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::{IntegrityConfig, DEFAULT_MODEL_PREFIX};

#[derive(Parser)]
#[command(name = "integrity")]
#[command(about = "Match integrity scoring for football results and betting odds")]
struct Cli {
    /// JSON configuration file (defaults, then this file, then environment overrides)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a match table and add form and anomaly-flag columns
    Process {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Fit the ensemble on a match history and save it under a prefix
    Train {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = DEFAULT_MODEL_PREFIX)]
        prefix: String,
        /// Also write integrity scores for the training matches
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Score a match table with a saved model
    Score {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long, default_value = DEFAULT_MODEL_PREFIX)]
        prefix: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Report matches scoring at or above this value
        #[arg(short, long, default_value = "60")]
        threshold: f64,
    },
    /// Show a team's record and recent form over a match history
    Team {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        name: String,
    },
    /// Start the online scoring API
    Serve {
        #[arg(short, long, default_value = "3000")]
        port: u16,
        #[arg(long, default_value = DEFAULT_MODEL_PREFIX)]
        prefix: String,
        /// Match history the online form state is built from
        #[arg(long)]
        history: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = IntegrityConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Process { input, output } => {
            tracing::info!("Processing {}", input.display());
            cli::process_matches(&config, &input, &output)?;
        }
        Commands::Train { input, prefix, output } => {
            tracing::info!("Training model '{}' on {}", prefix, input.display());
            cli::train_model(&config, &input, &prefix, output.as_deref())?;
        }
        Commands::Score {
            input,
            prefix,
            output,
            threshold,
        } => {
            tracing::info!("Scoring {} with model '{}'", input.display(), prefix);
            cli::score_matches(&config, &input, &prefix, output.as_deref(), threshold)?;
        }
        Commands::Team { input, name } => {
            tracing::info!("Querying team: {}", name);
            cli::query_team(&config, &input, &name)?;
        }
        Commands::Serve { port, prefix, history } => {
            tracing::info!("Starting integrity API server on port {}", port);
            api::serve(config, port, &prefix, &history).await?;
        }
    }

    Ok(())
}
