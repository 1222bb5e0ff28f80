//! Outbox repository
//!
//! Entries are keyed by `table:id`. Enqueue coalesces: an entry only ever
//! moves forward to a newer `updated_at`, so replaying an old enqueue after a
//! newer one is a no-op.

use libsql::Connection;

use crate::error::Result;
use crate::models::{EntityId, OutboxCounts, OutboxEntry, OutboxStatus, Table};
use crate::util::{truncate_chars, ERROR_MESSAGE_LIMIT};

use super::entity_repository::StoredRow;

/// Trait for outbox storage operations (async)
#[allow(async_fn_in_trait)]
pub trait OutboxRepository {
    /// Insert or coalesce an entry; returns whether anything was written
    async fn enqueue(&self, table: Table, row: &StoredRow, enqueued_at: i64) -> Result<bool>;

    /// Pending entries for one table, oldest first
    async fn list_pending(&self, table: Table) -> Result<Vec<OutboxEntry>>;

    /// Remove entries confirmed by the cloud
    async fn mark_sent(&self, entries: &[OutboxEntry]) -> Result<()>;

    /// Record a failed push attempt
    async fn mark_failed(&self, entries: &[OutboxEntry], message: &str) -> Result<()>;

    /// Return failed entries under `max_attempts` to pending
    async fn requeue_failed(&self, table: Table, max_attempts: u32) -> Result<u64>;

    /// Pending and failed totals
    async fn counts(&self) -> Result<OutboxCounts>;
}

/// libSQL implementation of `OutboxRepository`
pub struct LibSqlOutboxRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlOutboxRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<OutboxEntry> {
        let key: String = row.get(0)?;
        let table: String = row.get(1)?;
        let record_id: String = row.get(2)?;
        let data: String = row.get(3)?;
        let updated_at: i64 = row.get(4)?;
        let deleted: i64 = row.get(5)?;
        let status: String = row.get(6)?;
        let attempts: i64 = row.get(7)?;
        let last_error: Option<String> = row.get(8)?;
        let enqueued_at: i64 = row.get(9)?;

        Ok(OutboxEntry {
            key,
            table: table.parse()?,
            record_id: EntityId::from(record_id),
            data: serde_json::from_str(&data)?,
            updated_at,
            deleted: deleted != 0,
            status: status.parse()?,
            attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
            last_error,
            enqueued_at,
        })
    }
}

impl OutboxRepository for LibSqlOutboxRepository<'_> {
    async fn enqueue(&self, table: Table, row: &StoredRow, enqueued_at: i64) -> Result<bool> {
        let key = OutboxEntry::key_for(table, &row.id);
        let data = serde_json::to_string(&row.data)?;
        // `enqueued_at` and `attempts` survive coalescing so a hot record keeps its place.
        let changed = self
            .conn
            .execute(
                "INSERT INTO sync_outbox (
                    key, table_name, record_id, data, updated_at, deleted,
                    status, attempts, last_error, enqueued_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, NULL, ?7)
                ON CONFLICT(key) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at,
                    deleted = excluded.deleted,
                    status = 'pending',
                    last_error = NULL
                WHERE excluded.updated_at >= sync_outbox.updated_at",
                libsql::params![
                    key,
                    table.as_str(),
                    row.id.as_str(),
                    data,
                    row.updated_at,
                    i64::from(row.deleted),
                    enqueued_at
                ],
            )
            .await?;
        Ok(changed > 0)
    }

    async fn list_pending(&self, table: Table) -> Result<Vec<OutboxEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT key, table_name, record_id, data, updated_at, deleted,
                        status, attempts, last_error, enqueued_at
                 FROM sync_outbox
                 WHERE status = 'pending' AND table_name = ?1
                 ORDER BY enqueued_at ASC, rowid ASC",
                [table.as_str()],
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn mark_sent(&self, entries: &[OutboxEntry]) -> Result<()> {
        // A newer version enqueued after the push started stays queued.
        for entry in entries {
            self.conn
                .execute(
                    "DELETE FROM sync_outbox WHERE key = ?1 AND updated_at <= ?2",
                    libsql::params![entry.key.as_str(), entry.updated_at],
                )
                .await?;
        }
        Ok(())
    }

    async fn mark_failed(&self, entries: &[OutboxEntry], message: &str) -> Result<()> {
        let message = truncate_chars(message, ERROR_MESSAGE_LIMIT);
        for entry in entries {
            self.conn
                .execute(
                    "UPDATE sync_outbox
                     SET status = ?1, attempts = attempts + 1, last_error = ?2
                     WHERE key = ?3",
                    libsql::params![
                        OutboxStatus::Failed.as_str(),
                        message.as_str(),
                        entry.key.as_str()
                    ],
                )
                .await?;
        }
        Ok(())
    }

    async fn requeue_failed(&self, table: Table, max_attempts: u32) -> Result<u64> {
        let requeued = self
            .conn
            .execute(
                "UPDATE sync_outbox SET status = 'pending'
                 WHERE status = 'failed' AND table_name = ?1 AND attempts < ?2",
                libsql::params![table.as_str(), i64::from(max_attempts)],
            )
            .await?;
        Ok(requeued)
    }

    async fn counts(&self) -> Result<OutboxCounts> {
        let mut rows = self
            .conn
            .query(
                "SELECT status, COUNT(*) FROM sync_outbox GROUP BY status",
                (),
            )
            .await?;

        let mut counts = OutboxCounts::default();
        while let Some(row) = rows.next().await? {
            let status: String = row.get(0)?;
            let count: i64 = row.get(1)?;
            let count = u64::try_from(count).unwrap_or_default();
            match status.parse()? {
                OutboxStatus::Pending => counts.pending = count,
                OutboxStatus::Failed => counts.failed = count,
                OutboxStatus::Sent => {}
            }
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn row(id: &str, name: &str, updated_at: i64) -> StoredRow {
        StoredRow::from_value(json!({
            "id": id,
            "updatedAt": updated_at,
            "deleted": false,
            "name": name,
        }))
        .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_is_idempotent() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());
        let r = row("r1", "Aoi", 100);

        repo.enqueue(Table::Residents, &r, 1).await.unwrap();
        let once = repo.list_pending(Table::Residents).await.unwrap();
        repo.enqueue(Table::Residents, &r, 1).await.unwrap();
        let twice = repo.list_pending(Table::Residents).await.unwrap();

        assert_eq!(once, twice);
        assert_eq!(twice.len(), 1);
        assert_eq!(twice[0].key, "residents:r1");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_coalesces_to_newest() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        assert!(repo
            .enqueue(Table::Residents, &row("r1", "new", 200), 1)
            .await
            .unwrap());
        assert!(!repo
            .enqueue(Table::Residents, &row("r1", "old", 100), 2)
            .await
            .unwrap());

        let pending = repo.list_pending(Table::Residents).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].updated_at, 200);
        assert_eq!(pending[0].data["name"], json!("new"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_list_pending_orders_by_enqueue_time() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        repo.enqueue(Table::Residents, &row("b", "B", 10), 20)
            .await
            .unwrap();
        repo.enqueue(Table::Residents, &row("a", "A", 10), 10)
            .await
            .unwrap();
        repo.enqueue(Table::Relations, &row("x", "X", 10), 5)
            .await
            .unwrap();

        let ids: Vec<_> = repo
            .list_pending(Table::Residents)
            .await
            .unwrap()
            .into_iter()
            .map(|entry| entry.record_id.to_string())
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_sent_removes_only_sent_entries() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        repo.enqueue(Table::Residents, &row("r1", "one", 1), 1)
            .await
            .unwrap();
        repo.enqueue(Table::Residents, &row("r2", "two", 1), 2)
            .await
            .unwrap();
        let pending = repo.list_pending(Table::Residents).await.unwrap();

        repo.mark_sent(&pending[..1]).await.unwrap();

        let remaining = repo.list_pending(Table::Residents).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].key, "residents:r2");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_sent_keeps_newer_version() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        repo.enqueue(Table::Residents, &row("r1", "v1", 100), 1)
            .await
            .unwrap();
        let in_flight = repo.list_pending(Table::Residents).await.unwrap();
        repo.enqueue(Table::Residents, &row("r1", "v2", 200), 2)
            .await
            .unwrap();

        repo.mark_sent(&in_flight).await.unwrap();

        let remaining = repo.list_pending(Table::Residents).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].updated_at, 200);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mark_failed_and_requeue() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        repo.enqueue(Table::Residents, &row("r1", "Aoi", 1), 1)
            .await
            .unwrap();
        let pending = repo.list_pending(Table::Residents).await.unwrap();

        let long_message = "x".repeat(800);
        repo.mark_failed(&pending, &long_message).await.unwrap();

        assert!(repo.list_pending(Table::Residents).await.unwrap().is_empty());
        assert_eq!(
            repo.counts().await.unwrap(),
            OutboxCounts {
                pending: 0,
                failed: 1
            }
        );

        assert_eq!(repo.requeue_failed(Table::Residents, 3).await.unwrap(), 1);
        let requeued = repo.list_pending(Table::Residents).await.unwrap();
        assert_eq!(requeued[0].attempts, 1);
        assert_eq!(
            requeued[0].last_error.as_deref().map(str::len),
            Some(ERROR_MESSAGE_LIMIT)
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_requeue_respects_max_attempts() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        repo.enqueue(Table::Residents, &row("r1", "Aoi", 1), 1)
            .await
            .unwrap();
        let pending = repo.list_pending(Table::Residents).await.unwrap();
        repo.mark_failed(&pending, "boom").await.unwrap();
        repo.mark_failed(&pending, "boom").await.unwrap();

        assert_eq!(repo.requeue_failed(Table::Residents, 2).await.unwrap(), 0);
        assert_eq!(repo.counts().await.unwrap().failed, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reenqueue_after_failure_resets_status() {
        let db = setup().await;
        let repo = LibSqlOutboxRepository::new(db.connection());

        repo.enqueue(Table::Residents, &row("r1", "v1", 1), 1)
            .await
            .unwrap();
        let pending = repo.list_pending(Table::Residents).await.unwrap();
        repo.mark_failed(&pending, "offline").await.unwrap();

        repo.enqueue(Table::Residents, &row("r1", "v2", 2), 5)
            .await
            .unwrap();

        let pending = repo.list_pending(Table::Residents).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].status, OutboxStatus::Pending);
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error, None);
        assert_eq!(pending[0].enqueued_at, 1);
    }
}
