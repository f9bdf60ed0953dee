use crate::commands::{with_migrated_database, CommandResult};

pub fn run() -> CommandResult {
    match with_migrated_database("migrate", |_pool| async { Ok(()) }) {
        Ok(()) => CommandResult::success("migrate", "applied pending migrations"),
        Err(failure) => failure,
    }
}
