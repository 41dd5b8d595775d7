// sqlbackuptool/src/backup/outcome.rs
use serde::Serialize;
use std::fmt;

/// Placed in `failure_reasons` when nothing went wrong.
pub const NO_ISSUES: &str = "no issues";

/// Where a database's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Ineligible,
    PlanFailed,
    Completed,
    ExecutionFailed,
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TerminalState::Ineligible => "ineligible",
            TerminalState::PlanFailed => "plan failed",
            TerminalState::Completed => "completed",
            TerminalState::ExecutionFailed => "execution failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupOutcome {
    pub sql_instance: String,
    pub database_name: String,
    pub completed: bool,
    pub file_count: usize,
    pub command_trace: String,
    pub failure_reasons: Vec<String>,
}

impl BackupOutcome {
    /// True unless the only reason is the [`NO_ISSUES`] marker.
    pub fn has_issues(&self) -> bool {
        !(self.failure_reasons.len() == 1 && self.failure_reasons[0] == NO_ISSUES)
    }
}

pub fn build_outcome(
    sql_instance: &str,
    database_name: &str,
    completed: bool,
    file_count: usize,
    command_trace: String,
    failures: Vec<String>,
) -> BackupOutcome {
    let failure_reasons = if failures.is_empty() {
        vec![NO_ISSUES.to_string()]
    } else {
        failures
    };

    BackupOutcome {
        sql_instance: sql_instance.to_string(),
        database_name: database_name.to_string(),
        completed,
        file_count,
        command_trace,
        failure_reasons,
    }
}
