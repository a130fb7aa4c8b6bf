//! PostgreSQL and Blob Storage Migration Tool
//!
//! Provides CLI interface for sync, storage migration, database migration, backup and restore

// pgmigrate/src/main.rs
mod backup;
mod config;
mod database;
mod errors;
mod process;
mod restore;
mod storage;
mod sync;
mod utils;
mod workflow;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::{AppConfig, SecretSources};
use errors::{AppError, Result};
use process::ProcessRunner;
use sync::PostgresProbe;
use utils::prompt::{Prompt, StdinPrompt};
use workflow::{Operation, Workflows};

#[derive(Parser)]
#[command(name = "pgmigrate")]
#[command(about = "PostgreSQL and blob storage migration pipelines")]
#[command(version)]
struct Cli {
    /// Operation to run: 1-7 or its name (sync, storage-migration, database-migration,
    /// all, backup-only, restore-only, exit). Shows a menu when omitted.
    operation: Option<String>,

    /// Path to the JSON configuration file.
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Archive to restore for `restore-only`; prompted for when omitted.
    #[arg(long)]
    dump_file: Option<PathBuf>,

    /// Keep downloaded and intermediate files after the run.
    #[arg(long)]
    keep_local_files: bool,
}

/// Main entry point for the migration tool
#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgmigrate=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!(error = %e, "Aborted");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run_app(cli: Cli) -> Result<u8> {
    let app_config = AppConfig::load_from_json(&cli.config)
        .map_err(|e| AppError::config(format!("{:#}", e)))?;

    let prompt = StdinPrompt;
    let operation: Operation = match &cli.operation {
        Some(choice) => choice.parse()?,
        None => prompt_choice(&prompt)?.parse()?,
    };
    if operation == Operation::Exit {
        info!("Exiting...");
        return Ok(0);
    }
    info!(%operation, config = %cli.config.display(), "Starting");

    let runner = ProcessRunner::new(app_config.process_timeout());
    let workflows = Workflows {
        config: &app_config,
        runner: &runner,
        probe: &PostgresProbe,
        sources: SecretSources::from_process_env(&prompt),
        prompt: &prompt,
        keep_local_files: cli.keep_local_files,
        dump_file: cli.dump_file,
    };
    let reports = workflows.run(operation).await;

    println!("\n{}", workflow::summary(&reports));
    Ok(workflow::exit_code(&reports))
}

/// Shows the operation menu and returns the raw answer
fn prompt_choice(prompt: &dyn Prompt) -> Result<String> {
    println!("=== pgmigrate ===");
    prompt.ask(&format!("{}\nEnter your choice (1-7): ", Operation::menu()))
}
