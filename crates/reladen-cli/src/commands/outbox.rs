use std::path::Path;

use reladen_core::sync::pending_entries;

use crate::commands::common::{
    format_outbox_lines, format_sync_conflict_lines, open_store, outbox_to_item,
    sync_conflict_to_item, OutboxItem, SyncConflictItem,
};
use crate::error::CliError;

pub async fn run_outbox(list: bool, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let counts = store.outbox().counts().await?;
    let entries = if list {
        pending_entries(&store).await?
    } else {
        Vec::new()
    };

    if as_json {
        let items = entries.iter().map(outbox_to_item).collect::<Vec<OutboxItem>>();
        let payload = serde_json::json!({
            "pending": counts.pending,
            "failed": counts.failed,
            "entries": items,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("pending: {}  failed: {}", counts.pending, counts.failed);
    for line in format_outbox_lines(&entries) {
        println!("{line}");
    }
    Ok(())
}

pub async fn run_conflicts(limit: usize, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let conflicts = store.list_conflicts(limit).await?;

    if as_json {
        let items = conflicts
            .iter()
            .map(sync_conflict_to_item)
            .collect::<Vec<SyncConflictItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if conflicts.is_empty() {
        println!("No sync conflicts recorded.");
        return Ok(());
    }

    for line in format_sync_conflict_lines(&conflicts) {
        println!("{line}");
    }
    Ok(())
}
