// sqlbackuptool/src/server/sqlcmd.rs
//! [`ConnectionProvider`] backed by the `sqlcmd` command-line client.
//!
//! Every call runs one batch through `sqlcmd` with headers suppressed and `|`
//! as the column separator, so result rows come back as plain lines.
use async_trait::async_trait;
use log::{debug, info, warn};
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;

use super::script::{build_backup_statement, quote_literal};
use super::{
    BackupHistoryFact, BackupSpec, ConnectionProvider, Credential, EngineReport, RecoveryModel,
    ServerError, SqlServer,
};
use crate::utils::find_sqlcmd_executable;

static PERCENT_PROCESSED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,3}) percent processed\.").expect("percent regex is valid")
});

pub struct SqlCmdProvider {
    executable: PathBuf,
}

impl SqlCmdProvider {
    /// Uses `explicit` when given, otherwise searches `PATH`.
    pub fn locate(explicit: Option<&Path>) -> Result<Self, ServerError> {
        let executable = match explicit {
            Some(path) if path.is_file() => path.to_path_buf(),
            Some(path) => {
                return Err(ServerError::ToolNotFound(format!(
                    "configured sqlcmd_path {} does not exist",
                    path.display()
                )));
            }
            None => find_sqlcmd_executable()
                .map_err(|e| ServerError::ToolNotFound(e.to_string()))?,
        };
        info!("Using sqlcmd executable at: {}", executable.display());
        Ok(Self { executable })
    }
}

#[async_trait]
impl ConnectionProvider for SqlCmdProvider {
    type Connection = SqlCmdConnection;

    async fn connect(
        &self,
        instance: &str,
        credential: Option<&Credential>,
    ) -> Result<SqlCmdConnection, ServerError> {
        let connection = SqlCmdConnection {
            executable: self.executable.clone(),
            instance: instance.to_string(),
            credential: credential.cloned(),
        };

        match connection.query_lines("SELECT 1").await {
            Ok(lines) if lines.first().map(String::as_str) == Some("1") => {
                info!("✅ Connected to {}", instance);
                Ok(connection)
            }
            Ok(lines) => Err(ServerError::Connection {
                instance: instance.to_string(),
                reason: format!("unexpected response to SELECT 1: {:?}", lines),
            }),
            Err(e) => Err(ServerError::Connection {
                instance: instance.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}

pub struct SqlCmdConnection {
    executable: PathBuf,
    instance: String,
    credential: Option<Credential>,
}

impl SqlCmdConnection {
    fn base_command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("-S")
            .arg(&self.instance)
            .arg("-b") // non-zero exit status on SQL errors
            .arg("-t")
            .arg("0") // no query timeout, backups can run for hours
            .arg("-h")
            .arg("-1")
            .arg("-W")
            .arg("-s")
            .arg("|");
        match &self.credential {
            Some(credential) => {
                cmd.arg("-U")
                    .arg(&credential.username)
                    .env("SQLCMDPASSWORD", &credential.password);
            }
            None => {
                cmd.arg("-E");
            }
        }
        cmd.kill_on_drop(true);
        cmd
    }

    async fn query_lines(&self, query: &str) -> Result<Vec<String>, ServerError> {
        debug!("sqlcmd -S {} -Q {}", self.instance, query);
        let output = self
            .base_command()
            .arg("-Q")
            .arg(format!("SET NOCOUNT ON; {}", query))
            .output()
            .await?;

        if !output.status.success() {
            return Err(ServerError::Query(format!(
                "sqlcmd exited with status: {}\nStdout: {}\nStderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stdout).trim(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(non_empty_lines(&String::from_utf8_lossy(&output.stdout)))
    }
}

#[async_trait]
impl SqlServer for SqlCmdConnection {
    async fn recovery_model(&self, database: &str) -> Result<RecoveryModel, ServerError> {
        let query = format!(
            "SELECT recovery_model_desc FROM sys.databases WHERE name = {}",
            quote_literal(database)
        );
        let lines = self.query_lines(&query).await?;
        lines
            .first()
            .map(|desc| RecoveryModel::from_server_desc(desc))
            .ok_or_else(|| ServerError::DatabaseNotFound(database.to_string()))
    }

    async fn last_full_backups(
        &self,
        databases: &[String],
    ) -> Result<Vec<BackupHistoryFact>, ServerError> {
        if databases.is_empty() {
            return Ok(Vec::new());
        }
        let names = databases
            .iter()
            .map(|name| quote_literal(name))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT d.name, CASE WHEN MAX(b.backup_finish_date) IS NULL THEN 0 ELSE 1 END \
             FROM sys.databases d \
             LEFT JOIN msdb.dbo.backupset b ON b.database_name = d.name AND b.type = 'D' \
             WHERE d.name IN ({}) GROUP BY d.name",
            names
        );
        let lines = self.query_lines(&query).await?;
        Ok(lines.iter().filter_map(|line| parse_history_row(line)).collect())
    }

    async fn can_write_to_directory(&self, directory: &str) -> Result<bool, ServerError> {
        let query = format!("EXEC master.dbo.xp_fileexist {}", quote_literal(directory));
        let lines = self.query_lines(&query).await?;
        Ok(lines.iter().any(|line| parse_fileexist_row(line) == Some(true)))
    }

    async fn ensure_directory(&self, directory: &str) -> Result<bool, ServerError> {
        if self.can_write_to_directory(directory).await? {
            return Ok(true);
        }
        info!("Creating directory {} on {}", directory, self.instance);
        let query = format!("EXEC master.sys.xp_create_subdir {}", quote_literal(directory));
        self.query_lines(&query).await?;
        self.can_write_to_directory(directory).await
    }

    async fn default_backup_directory(&self) -> Result<String, ServerError> {
        let lines = self
            .query_lines(
                "SELECT CAST(SERVERPROPERTY('InstanceDefaultBackupPath') AS nvarchar(4000))",
            )
            .await?;
        match lines.first() {
            Some(path) if path != "NULL" => Ok(path.clone()),
            _ => Err(ServerError::Query(
                "instance reports no default backup directory".to_string(),
            )),
        }
    }

    async fn execute_backup(
        &self,
        spec: &BackupSpec,
        progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<EngineReport, ServerError> {
        let statement = build_backup_statement(spec);
        debug!("sqlcmd -S {} -Q {}", self.instance, statement);

        let mut child = self
            .base_command()
            .arg("-Q")
            .arg(&statement)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Both pipes are drained together so a chatty stderr cannot stall the backup.
        let (streamed, stderr) = tokio::join!(
            stream_progress(child.stdout.take(), progress),
            drain(child.stderr.take()),
        );
        let status = child.wait().await?;
        let (mut messages, last_percent) = streamed?;

        if !status.success() {
            messages.extend(non_empty_lines(&String::from_utf8_lossy(&stderr?)));
            warn!("Backup of {} exited with status {}", spec.database_name, status);
            return Err(ServerError::Engine {
                database: spec.database_name.clone(),
                reason: messages.join(" "),
            });
        }

        if last_percent < 100 {
            progress(100);
        }
        for message in &messages {
            debug!("{}: {}", spec.database_name, message);
        }

        Ok(EngineReport {
            completed: true,
            command_trace: statement,
        })
    }
}

/// Reads sqlcmd output line by line, forwarding non-decreasing percentages to
/// `progress`. Returns the other lines and the last percentage reported.
///
/// Lines are decoded lossily: sqlcmd writes in the console code page, which is
/// not necessarily UTF-8.
async fn stream_progress<R: AsyncRead + Unpin>(
    reader: Option<R>,
    progress: &(dyn Fn(u8) + Send + Sync),
) -> io::Result<(Vec<String>, u8)> {
    let mut messages = Vec::new();
    let mut last_percent = 0u8;
    let Some(reader) = reader else {
        return Ok((messages, last_percent));
    };

    let mut lines = BufReader::new(reader).split(b'\n');
    while let Some(raw) = lines.next_segment().await? {
        let line = String::from_utf8_lossy(&raw);
        match parse_percent(&line) {
            Some(percent) if percent >= last_percent => {
                last_percent = percent;
                progress(percent);
            }
            Some(_) => {}
            None if !line.trim().is_empty() => messages.push(line.trim().to_string()),
            None => {}
        }
    }
    Ok((messages, last_percent))
}

async fn drain<R: AsyncRead + Unpin>(reader: Option<R>) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}

/// `10 percent processed.` → `Some(10)`
fn parse_percent(line: &str) -> Option<u8> {
    PERCENT_PROCESSED
        .captures(line)
        .and_then(|caps| caps[1].parse::<u8>().ok())
        .filter(|percent| *percent <= 100)
}

/// `HR|1` → fact for HR with a prior full backup.
fn parse_history_row(line: &str) -> Option<BackupHistoryFact> {
    let (name, flag) = line.rsplit_once('|')?;
    let has_prior_full_backup = match flag.trim() {
        "1" => true,
        "0" => false,
        _ => return None,
    };
    Some(BackupHistoryFact {
        database_name: name.trim().to_string(),
        has_prior_full_backup,
    })
}

/// xp_fileexist returns `File Exists|File is a Directory|Parent Directory Exists`.
fn parse_fileexist_row(line: &str) -> Option<bool> {
    let columns: Vec<&str> = line.split('|').map(str::trim).collect();
    match columns.as_slice() {
        [_, is_directory, _] => match *is_directory {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_percent() {
        assert_eq!(parse_percent("10 percent processed."), Some(10));
        assert_eq!(parse_percent("  100 percent processed."), Some(100));
        assert_eq!(parse_percent("Processed 344 pages for database 'HR'"), None);
        assert_eq!(parse_percent("250 percent processed."), None);
    }

    #[test]
    fn test_parse_history_row() {
        assert_eq!(
            parse_history_row("HR|1"),
            Some(BackupHistoryFact {
                database_name: "HR".to_string(),
                has_prior_full_backup: true,
            })
        );
        assert_eq!(
            parse_history_row("odd|name|0").map(|f| (f.database_name, f.has_prior_full_backup)),
            Some(("odd|name".to_string(), false))
        );
        assert_eq!(parse_history_row("Changed database context to 'master'."), None);
    }

    #[test]
    fn test_parse_fileexist_row() {
        assert_eq!(parse_fileexist_row("0|1|1"), Some(true));
        assert_eq!(parse_fileexist_row("0|0|1"), Some(false));
        assert_eq!(parse_fileexist_row("garbage"), None);
    }

    #[test]
    fn test_non_empty_lines_trims() {
        assert_eq!(non_empty_lines("  a \n\n b\n"), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_locate_rejects_missing_explicit_path() {
        let result = SqlCmdProvider::locate(Some(Path::new("/definitely/not/here/sqlcmd")));
        assert!(matches!(result, Err(ServerError::ToolNotFound(_))));
    }

    /// Stand-in `sqlcmd` that ignores its arguments and runs `body`.
    #[cfg(unix)]
    fn fake_sqlcmd(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("sqlcmd");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    fn connection(executable: PathBuf) -> SqlCmdConnection {
        SqlCmdConnection {
            executable,
            instance: "sql01".to_string(),
            credential: None,
        }
    }

    #[cfg(unix)]
    fn spec() -> BackupSpec {
        BackupSpec {
            database_name: "HR".to_string(),
            action: crate::server::BackupAction::Database,
            incremental: false,
            copy_only: false,
            devices: vec![r"C:\Backups\HR_202401311405.bak".to_string()],
        }
    }

    #[cfg(unix)]
    async fn run_backup(body: &str) -> (Result<EngineReport, ServerError>, Vec<u8>) {
        let dir = tempfile::tempdir().unwrap();
        let conn = connection(fake_sqlcmd(&dir, body));
        let seen = std::sync::Mutex::new(Vec::new());
        let record = |percent: u8| seen.lock().unwrap().push(percent);

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            conn.execute_backup(&spec(), &record),
        )
        .await
        .expect("backup did not finish");
        (result, seen.into_inner().unwrap())
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backup_progress_is_monotonic_and_ends_at_100() {
        let (result, progress) = run_backup(
            "printf '30 percent processed.\\n20 percent processed.\\n60 percent processed.\\n'",
        )
        .await;

        let report = result.unwrap();
        assert!(report.completed);
        assert!(report.command_trace.starts_with("BACKUP DATABASE [HR] TO DISK"));
        assert_eq!(progress, vec![30, 60, 100]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backup_output_in_console_code_page() {
        // 0xFC is `ü` in Windows-1252, invalid as UTF-8.
        let (result, progress) = run_backup(
            "printf '10 percent processed.\\n'\n\
             printf \"Processed 8 pages for database 'B\\374cher'\\n\"\n\
             printf '100 percent processed.\\n'",
        )
        .await;

        assert!(result.unwrap().completed);
        assert_eq!(progress, vec![10, 100]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backup_failure_collects_output() {
        let (result, progress) = run_backup(
            "echo '10 percent processed.'\n\
             echo 'Msg 3201, Level 16, State 1'\n\
             echo 'BACKUP DATABASE is terminating abnormally.' >&2\n\
             exit 1",
        )
        .await;

        match result {
            Err(ServerError::Engine { database, reason }) => {
                assert_eq!(database, "HR");
                assert!(reason.contains("Msg 3201"));
                assert!(reason.contains("terminating abnormally"));
            }
            other => panic!("expected engine error, got {:?}", other.map(|r| r.command_trace)),
        }
        assert_eq!(progress, vec![10]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backup_survives_large_stderr() {
        let (result, progress) = run_backup(
            "i=0\n\
             while [ $i -lt 3000 ]; do\n\
               echo 'Msg 4035, Level 0, State 1, processed pages for database HR, file HR_log' >&2\n\
               i=$((i+1))\n\
             done\n\
             echo '50 percent processed.'",
        )
        .await;

        assert!(result.unwrap().completed);
        assert_eq!(progress, vec![50, 100]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_runs_select_one() {
        let dir = tempfile::tempdir().unwrap();
        let provider = SqlCmdProvider {
            executable: fake_sqlcmd(&dir, "echo 1"),
        };
        assert!(provider.connect("sql01", None).await.is_ok());

        let refused = tempfile::tempdir().unwrap();
        let provider = SqlCmdProvider {
            executable: fake_sqlcmd(&refused, "echo 'Login timeout expired' >&2\nexit 1"),
        };
        match provider.connect("sql01", None).await {
            Err(ServerError::Connection { instance, reason }) => {
                assert_eq!(instance, "sql01");
                assert!(reason.contains("Login timeout expired"));
            }
            Err(other) => panic!("expected connection error, got {}", other),
            Ok(_) => panic!("connection should have been refused"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_query_lines_feed_recovery_model() {
        let dir = tempfile::tempdir().unwrap();
        let conn = connection(fake_sqlcmd(&dir, "echo 'BULK_LOGGED'"));
        assert_eq!(conn.recovery_model("HR").await.unwrap(), RecoveryModel::BulkLogged);

        let empty = tempfile::tempdir().unwrap();
        let conn = connection(fake_sqlcmd(&empty, "true"));
        assert!(matches!(
            conn.recovery_model("Ghost").await,
            Err(ServerError::DatabaseNotFound(name)) if name == "Ghost"
        ));
    }
}
