//! In-memory server used by the backup flow tests.
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::server::script::build_backup_statement;
use crate::server::{
    BackupHistoryFact, BackupSpec, ConnectionProvider, Credential, EngineReport, RecoveryModel,
    ServerError, SqlServer,
};

#[derive(Clone, Default)]
pub struct FakeServer {
    recovery_models: HashMap<String, RecoveryModel>,
    history: Vec<BackupHistoryFact>,
    unwritable: HashSet<String>,
    failing_backups: HashSet<String>,
    default_directory: Option<String>,
    pub executed: Arc<Mutex<Vec<BackupSpec>>>,
    pub ensured: Arc<Mutex<Vec<String>>>,
    pub progress: Arc<Mutex<Vec<u8>>>,
}

impl FakeServer {
    pub fn with_recovery_model(mut self, database: &str, model: RecoveryModel) -> Self {
        self.recovery_models.insert(database.to_string(), model);
        self
    }

    pub fn with_full_backup(mut self, database: &str) -> Self {
        self.history.push(BackupHistoryFact {
            database_name: database.to_string(),
            has_prior_full_backup: true,
        });
        self
    }

    pub fn with_unwritable(mut self, directory: &str) -> Self {
        self.unwritable.insert(directory.to_string());
        self
    }

    pub fn with_failing_backup(mut self, database: &str) -> Self {
        self.failing_backups.insert(database.to_string());
        self
    }

    pub fn with_default_directory(mut self, directory: &str) -> Self {
        self.default_directory = Some(directory.to_string());
        self
    }

    pub fn executed_specs(&self) -> Vec<BackupSpec> {
        self.executed.lock().unwrap().clone()
    }

    pub fn ensured_directories(&self) -> Vec<String> {
        self.ensured.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlServer for FakeServer {
    async fn recovery_model(&self, database: &str) -> Result<RecoveryModel, ServerError> {
        self.recovery_models
            .get(database)
            .copied()
            .ok_or_else(|| ServerError::DatabaseNotFound(database.to_string()))
    }

    async fn last_full_backups(
        &self,
        databases: &[String],
    ) -> Result<Vec<BackupHistoryFact>, ServerError> {
        Ok(self
            .history
            .iter()
            .filter(|fact| databases.contains(&fact.database_name))
            .cloned()
            .collect())
    }

    async fn can_write_to_directory(&self, directory: &str) -> Result<bool, ServerError> {
        Ok(!self.unwritable.contains(directory))
    }

    async fn ensure_directory(&self, directory: &str) -> Result<bool, ServerError> {
        self.ensured.lock().unwrap().push(directory.to_string());
        Ok(!self.unwritable.contains(directory))
    }

    async fn default_backup_directory(&self) -> Result<String, ServerError> {
        self.default_directory
            .clone()
            .ok_or_else(|| ServerError::Query("no default backup directory".to_string()))
    }

    async fn execute_backup(
        &self,
        spec: &BackupSpec,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<EngineReport, ServerError> {
        self.executed.lock().unwrap().push(spec.clone());
        if self.failing_backups.contains(&spec.database_name) {
            return Err(ServerError::Engine {
                database: spec.database_name.clone(),
                reason: "Operating system error 112(There is not enough space on the disk.)"
                    .to_string(),
            });
        }
        for percent in [25u8, 50, 100] {
            self.progress.lock().unwrap().push(percent);
            progress(percent);
        }
        Ok(EngineReport {
            completed: true,
            command_trace: build_backup_statement(spec),
        })
    }
}

#[derive(Clone, Default)]
pub struct FakeProvider {
    pub server: FakeServer,
    pub refuse_connections: bool,
}

impl FakeProvider {
    pub fn new(server: FakeServer) -> Self {
        Self {
            server,
            refuse_connections: false,
        }
    }
}

#[async_trait]
impl ConnectionProvider for FakeProvider {
    type Connection = FakeServer;

    async fn connect(
        &self,
        instance: &str,
        _credential: Option<&Credential>,
    ) -> Result<FakeServer, ServerError> {
        if self.refuse_connections {
            return Err(ServerError::Connection {
                instance: instance.to_string(),
                reason: "Login timeout expired".to_string(),
            });
        }
        Ok(self.server.clone())
    }
}
