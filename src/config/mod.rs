// sqlbackuptool/src/config/mod.rs
use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::backup::intake::DatabaseInput;
use crate::errors::AppError;
use crate::server::Credential;
use crate::utils::parse_instance;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonCredential {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JsonBackupOptions {
    #[serde(rename = "type")]
    pub backup_type: Option<String>,
    pub copy_only: Option<bool>,
    pub file_count: Option<usize>,
    pub backup_paths: Option<Vec<String>>,
    pub backup_file_name: Option<String>,
    pub create_folder: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub sql_instance: Option<String>,
    pub sql_credential: Option<JsonCredential>,
    pub database_list: Option<serde_json::Value>,
    pub backup: Option<JsonBackupOptions>,
    pub sqlcmd_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupType {
    Full,
    Differential,
    Log,
}

impl BackupType {
    /// File extension used for generated backup files.
    pub fn extension(self) -> &'static str {
        match self {
            BackupType::Log => "trn",
            BackupType::Full | BackupType::Differential => "bak",
        }
    }
}

impl FromStr for BackupType {
    type Err = AppError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" | "database" => Ok(BackupType::Full),
            "differential" | "diff" => Ok(BackupType::Differential),
            "log" => Ok(BackupType::Log),
            other => Err(AppError::Config(format!(
                "unknown backup type '{}', expected full, differential or log",
                other
            ))),
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackupType::Full => "full",
            BackupType::Differential => "differential",
            BackupType::Log => "log",
        };
        f.write_str(name)
    }
}

/// Immutable settings shared by every database in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequestConfig {
    pub backup_type: BackupType,
    pub copy_only: bool,
    pub file_count: usize,
    pub backup_paths: Vec<String>,
    pub explicit_file_name: Option<String>,
    pub create_per_database_folder: bool,
}

impl BackupRequestConfig {
    pub fn new(backup_type: BackupType) -> Self {
        Self {
            backup_type,
            copy_only: false,
            file_count: 1,
            backup_paths: Vec::new(),
            explicit_file_name: None,
            create_per_database_folder: false,
        }
    }

    /// More than one backup path overrides `file_count`.
    pub fn effective_file_count(&self) -> usize {
        if self.backup_paths.len() > 1 {
            self.backup_paths.len()
        } else {
            self.file_count.max(1)
        }
    }

    pub fn validate(&self) -> crate::errors::Result<()> {
        if self.file_count == 0 {
            return Err(AppError::Config("file_count must be at least 1".to_string()));
        }
        if self.backup_paths.iter().any(|p| p.trim().is_empty()) {
            return Err(AppError::Config("backup_paths cannot contain empty entries".to_string()));
        }
        if let Some(name) = &self.explicit_file_name {
            if name.trim().is_empty() {
                return Err(AppError::Config("backup_file_name cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

// Application's internal configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sql_instance: String,
    pub credential: Option<Credential>,
    pub databases: Vec<DatabaseInput>,
    pub request: BackupRequestConfig,
    pub sqlcmd_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        Self::from_raw(&raw_json_config)
    }

    pub fn from_raw(raw_config: &RawJsonConfig) -> Result<Self> {
        let raw_instance = raw_config
            .sql_instance
            .as_ref()
            .filter(|s| !s.trim().is_empty())
            .context("sql_instance must be set in config.json")?;
        let (sql_instance, url_credential) = parse_instance(raw_instance)?;

        // An explicit credential block wins over one embedded in the URL.
        let credential = match &raw_config.sql_credential {
            Some(json) => Some(Credential {
                username: json.username.clone(),
                password: json.password.clone(),
            }),
            None => url_credential,
        };

        let databases = parse_database_list(&raw_config.database_list)?;
        if databases.is_empty() {
            warn!("'database_list' in config.json is empty or not provided. No databases will be backed up.");
        }

        Ok(AppConfig {
            sql_instance,
            credential,
            databases,
            request: load_backup_config_from_json(raw_config)?,
            sqlcmd_path: raw_config.sqlcmd_path.clone(),
        })
    }
}

pub fn load_backup_config_from_json(raw_config: &RawJsonConfig) -> Result<BackupRequestConfig> {
    let options = raw_config.backup.clone().unwrap_or_default();

    let backup_type = match options.backup_type.as_deref() {
        Some(value) => value.parse::<BackupType>()?,
        None => BackupType::Full,
    };

    let defaults = BackupRequestConfig::new(backup_type);
    let request = BackupRequestConfig {
        copy_only: options.copy_only.unwrap_or(defaults.copy_only),
        file_count: options.file_count.unwrap_or(defaults.file_count),
        backup_paths: options.backup_paths.unwrap_or_default(),
        explicit_file_name: options.backup_file_name.filter(|s| !s.is_empty()),
        create_per_database_folder: options
            .create_folder
            .unwrap_or(defaults.create_per_database_folder),
        ..defaults
    };
    request.validate().context("Invalid backup section in config.json")?;
    Ok(request)
}

/// Parses `database_list`.
///
/// An array holds names or descriptor objects (`{"name": "HR"}`); a mapping
/// object contributes its keys as database names.
fn parse_database_list(database_list: &Option<serde_json::Value>) -> Result<Vec<DatabaseInput>> {
    match database_list {
        Some(value) if value.is_array() => serde_json::from_value(value.clone())
            .context("Failed to parse database_list as array of names or objects"),
        Some(value) if value.is_object() => Ok(value
            .as_object()
            .map(|mapping| mapping.keys().cloned().map(DatabaseInput::Name).collect())
            .unwrap_or_default()),
        Some(serde_json::Value::Null) | None => Ok(Vec::new()),
        Some(_) => Err(anyhow::anyhow!(
            "database_list must be either an array of database names or a mapping object"
        )),
    }
}
