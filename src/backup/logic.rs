// sqlbackuptool/src/backup/logic.rs
use chrono::Local;
use log::{info, warn};

use super::eligibility::{evaluate_eligibility, resolve_recovery_model};
use super::executor::{backup_spec_for, execute_backup};
use super::intake::{DatabaseDescriptor, DatabaseInput, normalize_inputs};
use super::outcome::{BackupOutcome, TerminalState, build_outcome};
use super::paths::{plan_backup_paths, has_directory_part, timestamp_token};
use crate::config::BackupRequestConfig;
use crate::errors::{AppError, Result};
use crate::server::{BackupHistoryFact, ConnectionProvider, Credential, SqlServer};

/// Backs up every database in `inputs`, in order, and returns one outcome per
/// valid entry.
///
/// Only run-level problems (bad file-name usage, connection, history lookup,
/// default directory lookup) are returned as errors; everything that goes
/// wrong for a single database ends up in that database's outcome.
pub async fn backup_databases<P: ConnectionProvider>(
    provider: &P,
    inputs: &[DatabaseInput],
    sql_instance: &str,
    credential: Option<&Credential>,
    config: &BackupRequestConfig,
    progress: &(dyn Fn(&str, u8) + Send + Sync),
) -> Result<Vec<BackupOutcome>> {
    config.validate()?;

    let databases = normalize_inputs(inputs);
    if config.explicit_file_name.is_some() && databases.len() > 1 {
        return Err(AppError::FileNameWithMultipleDatabases(databases.len()));
    }
    if databases.is_empty() {
        info!("No databases to back up.");
        return Ok(Vec::new());
    }

    let server = provider
        .connect(sql_instance, credential)
        .await
        .map_err(|source| AppError::Connection {
            instance: sql_instance.to_string(),
            source,
        })?;

    let names: Vec<String> = databases.iter().map(|d| d.name.clone()).collect();
    let history = server
        .last_full_backups(&names)
        .await
        .map_err(AppError::History)?;

    let directories = target_directories(&server, config).await?;
    let timestamp = timestamp_token(Local::now().naive_local());

    info!(
        "🚀 Starting {} backup of {} database(s) on {}",
        config.backup_type,
        databases.len(),
        sql_instance
    );

    let mut outcomes = Vec::with_capacity(databases.len());
    for database in &databases {
        let outcome = backup_one_database(
            &server,
            sql_instance,
            database,
            config,
            &history,
            &directories,
            &timestamp,
            progress,
        )
        .await;
        outcomes.push(outcome);
    }

    Ok(outcomes)
}

/// Directories files are generated in: the configured paths, or the instance
/// default when none are configured and one is actually needed.
async fn target_directories<S: SqlServer + ?Sized>(
    server: &S,
    config: &BackupRequestConfig,
) -> Result<Vec<String>> {
    let needs_default = config.backup_paths.is_empty()
        && !config
            .explicit_file_name
            .as_deref()
            .is_some_and(has_directory_part);
    if !needs_default {
        return Ok(config.backup_paths.clone());
    }

    let directory = server
        .default_backup_directory()
        .await
        .map_err(AppError::DefaultDirectory)?;
    info!("No backup path configured, using instance default {}", directory);
    Ok(vec![directory])
}

#[allow(clippy::too_many_arguments)]
async fn backup_one_database<S: SqlServer + ?Sized>(
    server: &S,
    sql_instance: &str,
    database: &DatabaseDescriptor,
    config: &BackupRequestConfig,
    history: &[BackupHistoryFact],
    directories: &[String],
    timestamp: &str,
    progress: &(dyn Fn(&str, u8) + Send + Sync),
) -> BackupOutcome {
    let file_count = config.effective_file_count();
    let mut failures = Vec::new();

    let database = match resolve_recovery_model(server, database).await {
        Ok(resolved) => resolved,
        Err(reason) => {
            failures.push(reason);
            database.clone()
        }
    };
    failures.extend(evaluate_eligibility(&database, config, history));

    let (state, completed, command_trace) = if !failures.is_empty() {
        (TerminalState::Ineligible, false, String::new())
    } else {
        let plan = plan_backup_paths(server, &database, config, directories, timestamp).await;
        if !plan.failures.is_empty() {
            failures.extend(plan.failures);
            (TerminalState::PlanFailed, false, String::new())
        } else {
            let spec = backup_spec_for(&database.name, config, plan.devices);
            let result = execute_backup(server, &spec, progress).await;
            if result.completed {
                (TerminalState::Completed, true, result.command_trace)
            } else {
                failures.extend(result.failure);
                (TerminalState::ExecutionFailed, false, String::new())
            }
        }
    };

    if completed {
        info!("✅ {}: {}", database.name, state);
    } else {
        warn!("⚠️ {}: {} ({})", database.name, state, failures.join("; "));
    }

    build_outcome(
        sql_instance,
        &database.name,
        completed,
        file_count,
        command_trace,
        failures,
    )
}
