use std::path::Path;
use std::time::Duration;

use reladen_core::config::ReladenConfig;
use reladen_core::sync::{SyncOutcome, SyncTrigger};

use crate::commands::common::{build_reconciler, build_scheduler, format_sync_report, open_store};
use crate::error::CliError;

/// Scheduler and periodic sync until Ctrl-C.
pub async fn run_host(config: &ReladenConfig, db_path: &Path) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let reconciler = build_reconciler(config, &store)?;
    let scheduler = if config.scheduler.enabled {
        build_scheduler(config, &store)?
    } else {
        None
    };

    if reconciler.is_none() && scheduler.is_none() {
        return Err(CliError::Config(
            "nothing to run: configure sync, the generator, or both".to_string(),
        ));
    }
    if let Some(scheduler) = &scheduler {
        scheduler.start();
    } else {
        tracing::info!("Conversation scheduler disabled");
    }

    let mut interval = tokio::time::interval(Duration::from_millis(config.sync.interval_ms.max(1)));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = interval.tick() => {
                let Some(reconciler) = &reconciler else { continue };
                match reconciler.handle(SyncTrigger::NetworkOnline).await {
                    Ok(SyncOutcome::Synced(report)) => {
                        tracing::info!("Sync pass: {}", format_sync_report(&report));
                    }
                    Ok(other) => tracing::debug!("Sync pass skipped: {:?}", other),
                    Err(error) if error.is_unauthenticated() => {
                        tracing::error!("Stopping sync: {}", error);
                        break;
                    }
                    Err(error) => tracing::warn!("Sync pass failed: {}", error),
                }
            }
        }
    }

    if let Some(scheduler) = &scheduler {
        scheduler.stop().await;
    }
    Ok(())
}
