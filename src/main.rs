//! SQL Server Backup Tool
//!
//! Backs up the databases listed in config.json and prints one outcome per database

// sqlbackuptool/src/main.rs
mod backup;
mod config;
mod errors;
mod server;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use log::{error, info, warn};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run_app().await {
        Ok(true) => {
            info!("✅ All databases backed up successfully.");
            ExitCode::SUCCESS
        }
        Ok(false) => {
            warn!("⚠️ One or more databases were not backed up.");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app() -> Result<bool> {
    // First argument is the config path, defaulting to config.json in the working directory.
    let config_path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.json"));
    let app_config = AppConfig::load_from_json(&config_path)
        .context(format!("Failed to load application configuration from {}", config_path.display()))?;

    info!("Loaded configuration from {}", config_path.display());
    let outcomes = backup::run_backup_flow(&app_config)
        .await
        .context("Backup process failed")?;

    for outcome in outcomes.iter().filter(|o| o.has_issues()) {
        warn!(
            "{} on {}: {}",
            outcome.database_name,
            outcome.sql_instance,
            outcome.failure_reasons.join("; ")
        );
    }

    println!(
        "{}",
        serde_json::to_string_pretty(&outcomes).context("Failed to serialize backup outcomes")?
    );
    Ok(outcomes.iter().all(|o| o.completed))
}
