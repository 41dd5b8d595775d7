use thiserror::Error;

use crate::server::ServerError;

/// Run-level failures. Any of these aborts the run before a single outcome is
/// produced; per-database problems are recorded on the outcome instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Cannot connect to {instance}: {source}")]
    Connection {
        instance: String,
        #[source]
        source: ServerError,
    },

    #[error("A backup file name can only be used with a single database, but {0} databases were supplied")]
    FileNameWithMultipleDatabases(usize),

    #[error("Backup history lookup failed: {0}")]
    History(#[source] ServerError),

    #[error("Could not determine the default backup directory: {0}")]
    DefaultDirectory(#[source] ServerError),
}

pub type Result<T> = std::result::Result<T, AppError>;
