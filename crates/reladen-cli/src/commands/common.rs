use std::path::{Path, PathBuf};
use std::sync::Arc;

use reladen_core::config::ReladenConfig;
use reladen_core::lease::KvLeaseLock;
use reladen_core::models::{OutboxEntry, SyncConflict};
use reladen_core::scheduler::ConversationScheduler;
use reladen_core::sync::{SyncReconciler, SyncReport};
use reladen_core::LocalStore;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct OutboxItem {
    pub key: String,
    pub table: String,
    pub record_id: String,
    pub status: String,
    pub attempts: u32,
    pub updated_at: i64,
    pub enqueued_at: i64,
    pub last_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncConflictItem {
    pub id: i64,
    pub table: String,
    pub record_id: String,
    pub local_updated_at: i64,
    pub incoming_updated_at: i64,
    pub resolved_at: i64,
    pub resolved_at_iso: String,
    pub strategy: String,
}

/// Config file when given, environment otherwise.
pub fn load_config(path: Option<&Path>) -> Result<ReladenConfig, CliError> {
    match path {
        Some(path) => {
            let payload = std::fs::read_to_string(path)?;
            ReladenConfig::from_json(&payload)
                .map_err(|error| CliError::Config(format!("{}: {error}", path.display())))
        }
        None => ReladenConfig::from_env().map_err(CliError::Config),
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>, config: &ReladenConfig) -> PathBuf {
    cli_db_path
        .or_else(|| config.database_path.as_ref().map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("reladen")
        .join("reladen.db")
}

pub async fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(db_path).await?)
}

pub fn build_reconciler(
    config: &ReladenConfig,
    store: &LocalStore,
) -> Result<Option<SyncReconciler>, CliError> {
    let Some(cloud) = config.sync.cloud_tables()? else {
        return Ok(None);
    };
    Ok(Some(SyncReconciler::new(
        store.clone(),
        Arc::new(cloud),
        config.sync.options(),
    )))
}

pub fn build_scheduler(
    config: &ReladenConfig,
    store: &LocalStore,
) -> Result<Option<ConversationScheduler>, CliError> {
    let Some(generator) = config.generator.client()? else {
        return Ok(None);
    };
    Ok(Some(ConversationScheduler::new(
        store.clone(),
        Arc::new(KvLeaseLock::new(store.clone())),
        Arc::new(generator),
        config.scheduler.clone(),
    )))
}

pub fn format_sync_report(report: &SyncReport) -> String {
    let mut line = format!(
        "pushed {}, pulled {}",
        report.pushed, report.pulled
    );
    if report.push_failed > 0 {
        line.push_str(&format!(", {} failed", report.push_failed));
    }
    if report.stale > 0 {
        line.push_str(&format!(", {} stale", report.stale));
    }
    if report.requeued > 0 {
        line.push_str(&format!(", {} retried", report.requeued));
    }
    line
}

pub fn outbox_to_item(entry: &OutboxEntry) -> OutboxItem {
    OutboxItem {
        key: entry.key.clone(),
        table: entry.table.to_string(),
        record_id: entry.record_id.to_string(),
        status: entry.status.as_str().to_string(),
        attempts: entry.attempts,
        updated_at: entry.updated_at,
        enqueued_at: entry.enqueued_at,
        last_error: entry.last_error.clone(),
    }
}

pub fn format_outbox_lines(entries: &[OutboxEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            format!(
                "{}  {:<7}  {}  attempts={}",
                format_timestamp(entry.enqueued_at),
                entry.status.as_str(),
                entry.key,
                entry.attempts
            )
        })
        .collect()
}

pub fn sync_conflict_to_item(conflict: &SyncConflict) -> SyncConflictItem {
    SyncConflictItem {
        id: conflict.id,
        table: conflict.table.clone(),
        record_id: conflict.record_id.clone(),
        local_updated_at: conflict.local_updated_at,
        incoming_updated_at: conflict.incoming_updated_at,
        resolved_at: conflict.resolved_at,
        resolved_at_iso: format_timestamp(conflict.resolved_at),
        strategy: conflict.strategy.clone(),
    }
}

pub fn format_sync_conflict_lines(conflicts: &[SyncConflict]) -> Vec<String> {
    conflicts
        .iter()
        .map(|conflict| {
            format!(
                "{}  {:<4}  {}:{}  local={} incoming={}",
                format_timestamp(conflict.resolved_at),
                conflict.strategy,
                conflict.table,
                conflict.record_id,
                conflict.local_updated_at,
                conflict.incoming_updated_at
            )
        })
        .collect()
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}
