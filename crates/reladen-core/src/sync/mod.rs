//! Outbox push and cloud pull under last-writer-wins.
//!
//! A sync pass walks every table: pending outbox entries are upserted to the
//! cloud (at least once), then rows changed since the table's cursor are
//! pulled and merged into the local store. Pulled rows never enter the
//! outbox, so nothing is echoed back.

mod cloud;
mod columns;

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;

use crate::db::MergeOutcome;
use crate::models::{OutboxEntry, Table};
use crate::services::LocalStore;
use crate::state::SyncPhase;
use crate::{Error, Result};

pub use cloud::{CloudApi, CloudError, CloudResult, RestCloudTables};
pub use columns::{
    from_cloud_row, millis_to_rfc3339, timestamp_to_millis, to_camel_case, to_cloud_row,
    to_snake_case,
};

/// Most rows sent in one upsert request.
pub const PUSH_BATCH_SIZE: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct SyncOptions {
    /// Minimum time between passes started by network or realtime triggers
    pub min_interval_ms: i64,
    /// Failed entries are retried until they reach this many attempts
    pub max_attempts: u32,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            min_interval_ms: 4_000,
            max_attempts: 20,
        }
    }
}

/// A row change pushed by the cloud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeChange {
    pub table: Table,
    pub row: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncTrigger {
    NetworkOnline,
    NetworkOffline,
    /// A cloud row arrived in document form
    Realtime(RealtimeChange),
    /// Explicit user request; ignores the throttle
    Manual,
}

/// Counts for one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub requeued: u64,
    pub pushed: usize,
    pub push_failed: usize,
    pub pulled: usize,
    pub stale: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Synced(SyncReport),
    /// A realtime row was merged
    Merged(MergeOutcome),
    Offline,
    AlreadySyncing,
    Throttled,
}

/// Drives sync passes and publishes the current `SyncPhase`.
pub struct SyncReconciler {
    store: LocalStore,
    cloud: Arc<dyn CloudApi>,
    options: SyncOptions,
    online: AtomicBool,
    syncing: AtomicBool,
    last_run_at: AtomicI64,
    last_error: Mutex<Option<String>>,
    phase: watch::Sender<SyncPhase>,
}

impl SyncReconciler {
    pub fn new(store: LocalStore, cloud: Arc<dyn CloudApi>, options: SyncOptions) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Offline);
        Self {
            store,
            cloud,
            options,
            online: AtomicBool::new(false),
            syncing: AtomicBool::new(false),
            last_run_at: AtomicI64::new(i64::MIN),
            last_error: Mutex::new(None),
            phase,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|error| error.clone())
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }

    fn set_last_error(&self, message: Option<String>) {
        if let Ok(mut last_error) = self.last_error.lock() {
            *last_error = message;
        }
    }

    pub async fn handle(&self, trigger: SyncTrigger) -> Result<SyncOutcome> {
        match trigger {
            SyncTrigger::NetworkOffline => {
                self.online.store(false, Ordering::SeqCst);
                self.set_phase(SyncPhase::Offline);
                Ok(SyncOutcome::Offline)
            }
            SyncTrigger::NetworkOnline => {
                self.online.store(true, Ordering::SeqCst);
                if !self.syncing.load(Ordering::SeqCst) {
                    self.set_phase(SyncPhase::Online);
                }
                self.sync(true).await
            }
            SyncTrigger::Realtime(change) => self.apply_realtime(change).await,
            SyncTrigger::Manual => self.sync(false).await,
        }
    }

    async fn apply_realtime(&self, change: RealtimeChange) -> Result<SyncOutcome> {
        let outcome = self.store.merge_remote(change.table, change.row).await?;
        tracing::debug!("Realtime change on {}: {:?}", change.table, outcome);
        Ok(SyncOutcome::Merged(outcome))
    }

    async fn sync(&self, throttled: bool) -> Result<SyncOutcome> {
        if !self.is_online() {
            self.set_phase(SyncPhase::Offline);
            return Ok(SyncOutcome::Offline);
        }
        if self.syncing.swap(true, Ordering::SeqCst) {
            tracing::debug!("Sync already in progress");
            return Ok(SyncOutcome::AlreadySyncing);
        }

        let now = self.store.now_millis();
        let last = self.last_run_at.load(Ordering::SeqCst);
        if throttled && now.saturating_sub(last) < self.options.min_interval_ms {
            self.syncing.store(false, Ordering::SeqCst);
            return Ok(SyncOutcome::Throttled);
        }
        self.last_run_at.store(now, Ordering::SeqCst);
        self.set_phase(SyncPhase::Syncing);

        let result = self.run_pass().await;
        self.syncing.store(false, Ordering::SeqCst);

        match result {
            Ok((report, None)) => {
                tracing::debug!("Sync pass finished: {:?}", report);
                self.set_last_error(None);
                self.set_phase(SyncPhase::Online);
                Ok(SyncOutcome::Synced(report))
            }
            Ok((report, Some(message))) => {
                tracing::warn!("Sync pass finished with failures: {}", message);
                self.set_last_error(Some(message));
                self.set_phase(SyncPhase::Error);
                Ok(SyncOutcome::Synced(report))
            }
            Err(error) => {
                if error.is_unauthenticated() {
                    tracing::error!("Sync rejected by cloud: {}", error);
                } else {
                    tracing::warn!("Sync pass failed: {}", error);
                }
                self.set_last_error(Some(error.to_string()));
                self.set_phase(SyncPhase::Error);
                Err(error)
            }
        }
    }

    /// One pass: every table is pushed, then every table is pulled. A failure
    /// in one table does not stop the others; the message is the last one.
    /// Authentication failures end the pass.
    async fn run_pass(&self) -> Result<(SyncReport, Option<String>)> {
        let mut report = SyncReport::default();
        let mut last_failure = None;
        for table in Table::ALL {
            if let Some(message) = self.push(table, &mut report).await? {
                last_failure = Some(message);
            }
        }
        for table in Table::ALL {
            match self.pull(table, &mut report).await {
                Ok(()) => {}
                Err(error) if error.is_unauthenticated() => return Err(error),
                Err(error) => {
                    tracing::warn!("Pulling {} failed: {}", table, error);
                    last_failure = Some(error.to_string());
                }
            }
        }
        Ok((report, last_failure))
    }

    async fn push(&self, table: Table, report: &mut SyncReport) -> Result<Option<String>> {
        let outbox = self.store.outbox();
        report.requeued += outbox
            .requeue_failed(table, self.options.max_attempts)
            .await?;
        let pending = outbox.list_pending(table).await?;

        let mut failure = None;
        for batch in pending.chunks(PUSH_BATCH_SIZE) {
            let rows: Vec<Value> = batch.iter().map(|entry| entry.data.clone()).collect();
            match self.cloud.upsert(table, &rows).await {
                Ok(()) => {
                    outbox.mark_sent(batch).await?;
                    report.pushed += batch.len();
                }
                Err(error) => {
                    let message = error.to_string();
                    outbox.mark_failed(batch, &message).await?;
                    report.push_failed += batch.len();
                    if error.is_unauthenticated() {
                        return Err(Error::Cloud(error));
                    }
                    tracing::warn!(
                        "Pushing {} {} row(s) failed: {}",
                        batch.len(),
                        table,
                        message
                    );
                    failure = Some(message);
                }
            }
        }
        Ok(failure)
    }

    async fn pull(&self, table: Table, report: &mut SyncReport) -> Result<()> {
        let key = cursor_key(table);
        let since = self
            .store
            .kv_get(&key)
            .await?
            .and_then(|value| value.parse::<i64>().ok());

        let rows = self.cloud.select_since(table, since).await?;
        let mut cursor = since;
        for row in rows {
            let updated_at = row.get("updatedAt").and_then(Value::as_i64);
            match self.store.merge_remote(table, row).await {
                Ok(MergeOutcome::Applied) => report.pulled += 1,
                Ok(MergeOutcome::Stale { .. }) => report.stale += 1,
                Err(Error::InvalidInput(message)) => {
                    tracing::warn!("Skipping invalid {} row from cloud: {}", table, message);
                    continue;
                }
                Err(error) => return Err(error),
            }
            cursor = cursor.max(updated_at);
        }

        if cursor != since {
            if let Some(cursor) = cursor {
                self.store.kv_set(&key, &cursor.to_string()).await?;
            }
        }
        Ok(())
    }
}

fn cursor_key(table: Table) -> String {
    format!("sync:cursor:{table}")
}

/// Entries still waiting in the outbox, for status displays.
pub async fn pending_entries(store: &LocalStore) -> Result<Vec<OutboxEntry>> {
    let outbox = store.outbox();
    let mut entries = Vec::new();
    for table in Table::ALL {
        entries.extend(outbox.list_pending(table).await?);
    }
    Ok(entries)
}
