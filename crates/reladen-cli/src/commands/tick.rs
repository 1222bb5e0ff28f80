use std::path::Path;

use reladen_core::config::ReladenConfig;
use reladen_core::scheduler::TickOutcome;

use crate::commands::common::{build_scheduler, open_store};
use crate::error::CliError;

pub async fn run_tick(config: &ReladenConfig, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let Some(scheduler) = build_scheduler(config, &store)? else {
        return Err(CliError::GeneratorNotConfigured);
    };

    match scheduler.tick().await {
        TickOutcome::Completed(persisted) => {
            println!("{}", persisted.event_id);
            Ok(())
        }
        TickOutcome::Skipped(reason) => {
            println!("Tick skipped: {reason:?}");
            Ok(())
        }
        TickOutcome::Failed(message) => Err(CliError::TickFailed(message)),
        TickOutcome::Halted(message) => Err(CliError::Halted(message)),
    }
}
