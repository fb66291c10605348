use crate::commands::{run_schema_preflight, CommandResult};

pub fn run() -> CommandResult {
    run_schema_preflight("migrate")
}
