// sqlbackuptool/src/backup/paths.rs
//! Destination file layout for one database.
//!
//! Paths are server-side (the instance writes the files), so they are built as
//! strings with `\` separators rather than through `std::path`.
use chrono::NaiveDateTime;
use log::{debug, warn};
use std::iter;

use super::intake::DatabaseDescriptor;
use crate::config::{BackupRequestConfig, BackupType};
use crate::server::SqlServer;

const SEPARATORS: [char; 2] = ['\\', '/'];

/// Ordered stripe devices, or the reasons planning failed. When `failures` is
/// non-empty `devices` is always empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathPlan {
    pub devices: Vec<String>,
    pub failures: Vec<String>,
}

/// `yyyyMMddHHmm`, shared by every file of a run.
pub fn timestamp_token(now: NaiveDateTime) -> String {
    now.format("%Y%m%d%H%M").to_string()
}

pub fn join_server_path(directory: &str, leaf: &str) -> String {
    format!("{}\\{}", directory.trim_end_matches(SEPARATORS), leaf)
}

/// Splits at the last separator into `(directory, file name)`.
fn split_directory(path: &str) -> Option<(&str, &str)> {
    path.rfind(SEPARATORS)
        .map(|idx| (&path[..idx], &path[idx + 1..]))
        .filter(|(directory, _)| !directory.is_empty())
}

/// Whether `path` names a directory as well as a file.
pub fn has_directory_part(path: &str) -> bool {
    split_directory(path).is_some()
}

pub fn backup_file_name(database: &str, timestamp: &str, backup_type: BackupType) -> String {
    format!("{}_{}.{}", database.trim(), timestamp, backup_type.extension())
}

/// `HR_202401011200.bak` → `HR_202401011200-2-of-4.bak`
pub fn stripe_path(path: &str, index: usize, total: usize) -> String {
    let file_start = path.rfind(SEPARATORS).map_or(0, |idx| idx + 1);
    match path[file_start..].rfind('.') {
        Some(dot) => {
            let dot = file_start + dot;
            format!("{}-{}-of-{}{}", &path[..dot], index, total, &path[dot..])
        }
        None => format!("{}-{}-of-{}", path, index, total),
    }
}

/// Builds the device list for `database`.
///
/// `directories` are the configured backup paths, or the instance default
/// directory when none were configured.
pub async fn plan_backup_paths<S: SqlServer + ?Sized>(
    server: &S,
    database: &DatabaseDescriptor,
    config: &BackupRequestConfig,
    directories: &[String],
    timestamp: &str,
) -> PathPlan {
    let total = config.effective_file_count();
    let mut plan = PathPlan::default();

    match &config.explicit_file_name {
        Some(file_name) => plan_explicit_file(server, file_name, directories, total, &mut plan).await,
        None => {
            plan_generated_files(server, database, config, directories, timestamp, total, &mut plan)
                .await
        }
    }

    if !plan.failures.is_empty() {
        warn!("Path planning for {} failed: {:?}", database.name, plan.failures);
        plan.devices.clear();
        return plan;
    }

    if total >= 2 {
        plan.devices = plan
            .devices
            .iter()
            .enumerate()
            .map(|(idx, path)| stripe_path(path, idx + 1, total))
            .collect();
    }
    debug!("Planned devices for {}: {:?}", database.name, plan.devices);
    plan
}

async fn plan_explicit_file<S: SqlServer + ?Sized>(
    server: &S,
    file_name: &str,
    directories: &[String],
    total: usize,
    plan: &mut PathPlan,
) {
    let full_path = if has_directory_part(file_name) {
        file_name.to_string()
    } else if let Some(directory) = directories.first() {
        join_server_path(directory, file_name)
    } else {
        plan.failures
            .push(format!("no backup directory available for {}", file_name));
        return;
    };

    let Some((directory, _)) = split_directory(&full_path) else {
        plan.failures
            .push(format!("no backup directory available for {}", file_name));
        return;
    };

    match server.can_write_to_directory(directory).await {
        Ok(true) => plan.devices.extend(iter::repeat(full_path.clone()).take(total)),
        Ok(false) => plan
            .failures
            .push(format!("cannot write to directory {}", directory)),
        Err(e) => plan
            .failures
            .push(format!("cannot write to directory {}: {}", directory, e)),
    }
}

async fn plan_generated_files<S: SqlServer + ?Sized>(
    server: &S,
    database: &DatabaseDescriptor,
    config: &BackupRequestConfig,
    directories: &[String],
    timestamp: &str,
    total: usize,
    plan: &mut PathPlan,
) {
    if directories.is_empty() {
        plan.failures.push("no backup directory configured".to_string());
        return;
    }

    // A single directory holds every stripe; several directories get one each.
    let copies = if directories.len() == 1 { total } else { 1 };
    let file_name = backup_file_name(&database.name, timestamp, config.backup_type);

    for directory in directories {
        let target = if config.create_per_database_folder {
            join_server_path(directory, database.name.trim())
        } else {
            directory.trim_end_matches(SEPARATORS).to_string()
        };

        match server.ensure_directory(&target).await {
            Ok(true) => {
                let path = join_server_path(&target, &file_name);
                plan.devices.extend(iter::repeat(path).take(copies));
            }
            Ok(false) => plan
                .failures
                .push(format!("failure creating or accessing directory {}", target)),
            Err(e) => plan
                .failures
                .push(format!("failure creating or accessing directory {}: {}", target, e)),
        }
    }
}
