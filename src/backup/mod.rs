mod logic;
pub(crate) mod eligibility;
pub(crate) mod executor;
pub(crate) mod intake;
pub(crate) mod outcome;
pub(crate) mod paths;

#[cfg(test)]
pub(crate) mod test_support;

use anyhow::{Context, Result};
use log::info;

use crate::config::AppConfig;
use crate::server::sqlcmd::SqlCmdProvider;
pub use outcome::BackupOutcome;

fn log_progress(database: &str, percent: u8) {
    info!("{}: {} percent processed", database, percent);
}

/// Public entry point for the backup process.
/// Connects through sqlcmd and backs up every configured database.
pub async fn run_backup_flow(app_config: &AppConfig) -> Result<Vec<BackupOutcome>> {
    let provider = SqlCmdProvider::locate(app_config.sqlcmd_path.as_deref())
        .context("Cannot run backups without sqlcmd")?;

    let outcomes = logic::backup_databases(
        &provider,
        &app_config.databases,
        &app_config.sql_instance,
        app_config.credential.as_ref(),
        &app_config.request,
        &log_progress,
    )
    .await?;
    Ok(outcomes)
}
