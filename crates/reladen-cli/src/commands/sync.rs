use std::path::Path;

use reladen_core::config::ReladenConfig;
use reladen_core::sync::{SyncOutcome, SyncTrigger};

use crate::commands::common::{build_reconciler, format_sync_report, open_store};
use crate::error::CliError;

pub async fn run_sync(config: &ReladenConfig, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let Some(reconciler) = build_reconciler(config, &store)? else {
        return Err(CliError::SyncNotConfigured);
    };

    match reconciler.handle(SyncTrigger::NetworkOnline).await? {
        SyncOutcome::Synced(report) => {
            if let Some(error) = reconciler.last_error() {
                println!("Sync finished with errors: {}", format_sync_report(&report));
                eprintln!("{error}");
            } else {
                println!("Sync completed: {}", format_sync_report(&report));
            }
        }
        other => println!("Sync skipped: {other:?}"),
    }
    Ok(())
}
