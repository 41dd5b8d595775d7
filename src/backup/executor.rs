// sqlbackuptool/src/backup/executor.rs
use log::{error, info};

use crate::config::{BackupRequestConfig, BackupType};
use crate::server::{BackupAction, BackupSpec, SqlServer};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub completed: bool,
    pub command_trace: String,
    pub failure: Option<String>,
}

/// Maps the requested backup type onto an engine operation for `devices`.
pub fn backup_spec_for(
    database: &str,
    config: &BackupRequestConfig,
    devices: Vec<String>,
) -> BackupSpec {
    let (action, incremental) = match config.backup_type {
        BackupType::Full => (BackupAction::Database, false),
        BackupType::Differential => (BackupAction::Database, true),
        BackupType::Log => (BackupAction::Log, false),
    };
    BackupSpec {
        database_name: database.to_string(),
        action,
        incremental,
        copy_only: config.copy_only,
        devices,
    }
}

/// Runs the backup. Engine errors never escape; they come back as a
/// not-completed result carrying the error text.
pub async fn execute_backup<S: SqlServer + ?Sized>(
    server: &S,
    spec: &BackupSpec,
    progress: &(dyn Fn(&str, u8) + Send + Sync),
) -> ExecutionResult {
    info!(
        "💾 Backing up {} to {} device(s)",
        spec.database_name,
        spec.devices.len()
    );

    let report = server
        .execute_backup(spec, &|percent| progress(&spec.database_name, percent))
        .await;

    match report {
        Ok(report) if report.completed => ExecutionResult {
            completed: true,
            command_trace: report.command_trace,
            failure: None,
        },
        Ok(_) => ExecutionResult {
            completed: false,
            command_trace: String::new(),
            failure: Some("backup engine reported the operation as incomplete".to_string()),
        },
        Err(e) => {
            error!("❌ Backup of {} failed: {}", spec.database_name, e);
            ExecutionResult {
                completed: false,
                command_trace: String::new(),
                failure: Some(e.to_string()),
            }
        }
    }
}
