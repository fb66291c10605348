use crate::commands::{run_schema_preflight, CommandResult};

/// Preflight for the server binary: config validates, the database accepts
/// connections, and migrations are applied. Leaves the schema ready so a
/// following `triage-server` start does no setup work.
pub fn run() -> CommandResult {
    run_schema_preflight("start")
}
