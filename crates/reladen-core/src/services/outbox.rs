//! Durable outbox of local mutations awaiting push.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::db::{Database, LibSqlOutboxRepository, OutboxRepository, StoredRow};
use crate::models::{OutboxCounts, OutboxEntry, Table};
use crate::util::Clock;
use crate::Result;

/// Thread-safe outbox handle, obtained from [`LocalStore::outbox`](super::LocalStore::outbox).
#[derive(Clone)]
pub struct Outbox {
    db: Arc<Mutex<Database>>,
    clock: Arc<dyn Clock>,
}

impl Outbox {
    pub(crate) fn new(db: Arc<Mutex<Database>>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Enqueue a row; an older `updated_at` than the queued one is ignored.
    pub async fn enqueue(&self, table: Table, row: &StoredRow) -> Result<bool> {
        let now = self.clock.now_millis();
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .enqueue(table, row, now)
            .await
    }

    /// Pending entries for `table`, oldest first.
    pub async fn list_pending(&self, table: Table) -> Result<Vec<OutboxEntry>> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .list_pending(table)
            .await
    }

    /// Drop entries the cloud accepted.
    pub async fn mark_sent(&self, entries: &[OutboxEntry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .mark_sent(entries)
            .await
    }

    /// Record a failed push; the message is truncated.
    pub async fn mark_failed(&self, entries: &[OutboxEntry], message: &str) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .mark_failed(entries, message)
            .await
    }

    /// Give failed entries under `max_attempts` another try.
    pub async fn requeue_failed(&self, table: Table, max_attempts: u32) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection())
            .requeue_failed(table, max_attempts)
            .await
    }

    pub async fn counts(&self) -> Result<OutboxCounts> {
        let db = self.db.lock().await;
        LibSqlOutboxRepository::new(db.connection()).counts().await
    }
}
