// sqlbackuptool/src/backup/eligibility.rs
use log::debug;

use super::intake::DatabaseDescriptor;
use crate::config::{BackupRequestConfig, BackupType};
use crate::server::{BackupHistoryFact, RecoveryModel, SqlServer};

pub const SIMPLE_RECOVERY_LOG_BACKUP: &str =
    "database is in simple recovery mode, cannot take a log backup";
pub const NO_FULL_BACKUP: &str =
    "no existing full backup; cannot take a log or differential backup";
pub const TEMPDB_NOT_SUPPORTED: &str = "tempdb cannot be backed up";

/// Resolves the recovery model of a descriptor that does not have one yet.
///
/// Returns a new descriptor, or the reason the lookup failed for the caller to
/// record.
pub async fn resolve_recovery_model<S: SqlServer + ?Sized>(
    server: &S,
    descriptor: &DatabaseDescriptor,
) -> Result<DatabaseDescriptor, String> {
    if descriptor.recovery_model != RecoveryModel::Unknown {
        return Ok(descriptor.clone());
    }

    match server.recovery_model(&descriptor.name).await {
        Ok(model) => {
            debug!("{} recovery model: {:?}", descriptor.name, model);
            Ok(descriptor.with_recovery_model(model))
        }
        Err(e) => Err(format!("unable to determine recovery model: {}", e)),
    }
}

fn has_prior_full_backup(database: &str, history: &[BackupHistoryFact]) -> bool {
    history
        .iter()
        .any(|fact| fact.has_prior_full_backup && fact.database_name.eq_ignore_ascii_case(database))
}

/// Runs every eligibility rule and collects all reasons that apply.
/// An empty list means the database may be backed up.
pub fn evaluate_eligibility(
    database: &DatabaseDescriptor,
    config: &BackupRequestConfig,
    history: &[BackupHistoryFact],
) -> Vec<String> {
    let mut failures = Vec::new();

    if database.name.trim().eq_ignore_ascii_case("tempdb") {
        failures.push(TEMPDB_NOT_SUPPORTED.to_string());
    }

    if config.backup_type == BackupType::Log && database.recovery_model == RecoveryModel::Simple {
        failures.push(SIMPLE_RECOVERY_LOG_BACKUP.to_string());
    }

    if config.backup_type != BackupType::Full && !has_prior_full_backup(&database.name, history) {
        failures.push(NO_FULL_BACKUP.to_string());
    }

    failures
}
