// sqlbackuptool/src/server/script.rs
use super::{BackupAction, BackupSpec};

/// Bracket-quotes an identifier, doubling any closing bracket.
pub fn quote_identifier(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Renders an `N'...'` unicode string literal.
pub fn quote_literal(value: &str) -> String {
    format!("N'{}'", value.replace('\'', "''"))
}

/// Builds the `BACKUP` statement for a spec. This is also the command trace
/// reported back to the caller.
pub fn build_backup_statement(spec: &BackupSpec) -> String {
    let verb = match spec.action {
        BackupAction::Database => "DATABASE",
        BackupAction::Log => "LOG",
    };

    let devices = spec
        .devices
        .iter()
        .map(|device| format!("DISK = {}", quote_literal(device)))
        .collect::<Vec<_>>()
        .join(", ");

    let mut options = Vec::new();
    if spec.copy_only {
        options.push("COPY_ONLY");
    }
    if spec.incremental && spec.action == BackupAction::Database {
        options.push("DIFFERENTIAL");
    }
    options.push("NOFORMAT");
    options.push("NOINIT");
    options.push("STATS = 1");

    format!(
        "BACKUP {} {} TO {} WITH {}",
        verb,
        quote_identifier(&spec.database_name),
        devices,
        options.join(", ")
    )
}
