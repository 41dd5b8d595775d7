//! Narrow interfaces to the SQL Server instance.
//!
//! The backup flow never talks to the server directly; it goes through
//! [`ConnectionProvider`] and the [`SqlServer`] handle it returns. The shipped
//! implementation lives in [`sqlcmd`], tests use an in-memory fake.

pub(crate) mod script;
pub(crate) mod sqlcmd;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Per-database recovery model as reported by `sys.databases`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecoveryModel {
    #[default]
    Unknown,
    Simple,
    Full,
    BulkLogged,
}

impl RecoveryModel {
    /// Maps `recovery_model_desc` values (`SIMPLE`, `FULL`, `BULK_LOGGED`).
    pub fn from_server_desc(desc: &str) -> Self {
        match desc.trim().to_ascii_uppercase().as_str() {
            "SIMPLE" => RecoveryModel::Simple,
            "FULL" => RecoveryModel::Full,
            "BULK_LOGGED" => RecoveryModel::BulkLogged,
            _ => RecoveryModel::Unknown,
        }
    }
}

/// SQL authentication login. Without one, integrated authentication is used.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupHistoryFact {
    pub database_name: String,
    pub has_prior_full_backup: bool,
}

/// What the engine backs up. Differential backups are `Database` with the
/// incremental flag set on the [`BackupSpec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupAction {
    Database,
    Log,
}

/// A single backup operation handed to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSpec {
    pub database_name: String,
    pub action: BackupAction,
    pub incremental: bool,
    pub copy_only: bool,
    /// Ordered stripe devices, one file per entry.
    pub devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineReport {
    pub completed: bool,
    /// The statement that was run against the server, kept for auditing.
    pub command_trace: String,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to connect to {instance}: {reason}")]
    Connection { instance: String, reason: String },

    #[error("sqlcmd executable not found: {0}")]
    ToolNotFound(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Database {0} not found on the instance")]
    DatabaseNotFound(String),

    #[error("Backup of database {database} failed: {reason}")]
    Engine { database: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An open connection to one instance. Not shared across tasks.
#[async_trait]
pub trait SqlServer: Send + Sync {
    async fn recovery_model(&self, database: &str) -> Result<RecoveryModel, ServerError>;

    /// One fact per requested database that exists on the instance.
    async fn last_full_backups(
        &self,
        databases: &[String],
    ) -> Result<Vec<BackupHistoryFact>, ServerError>;

    /// Whether the service account can write into `directory`.
    async fn can_write_to_directory(&self, directory: &str) -> Result<bool, ServerError>;

    /// Creates `directory` if needed; true when it exists and is writable afterwards.
    async fn ensure_directory(&self, directory: &str) -> Result<bool, ServerError>;

    /// Instance-level default backup directory.
    async fn default_backup_directory(&self) -> Result<String, ServerError>;

    /// Runs the backup synchronously. `progress` receives percentages in 0..=100,
    /// never decreasing, ending at 100 when the backup completes.
    async fn execute_backup(
        &self,
        spec: &BackupSpec,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<EngineReport, ServerError>;
}

#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    type Connection: SqlServer;

    async fn connect(
        &self,
        instance: &str,
        credential: Option<&Credential>,
    ) -> Result<Self::Connection, ServerError>;
}
