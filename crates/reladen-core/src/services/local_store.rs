//! The local store: the primary source of truth shared by every component.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::db::{
    Database, EntityRepository, KvRepository, LibSqlEntityRepository, LibSqlKvRepository,
    LibSqlOutboxRepository, MergeOutcome, OutboxRepository, StoredRow,
};
use crate::models::{next_updated_at, Entity, EntityId, SyncConflict, Table};
use crate::util::{Clock, SystemClock};
use crate::Result;

use super::outbox::Outbox;

/// A batch of local writes committed atomically.
///
/// Every row gets a fresh `updated_at` at commit time and is enqueued to the
/// outbox in the same transaction.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    rows: Vec<(Table, StoredRow)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an entity write (or a tombstone, if it is marked deleted).
    pub fn put<E: Entity>(&mut self, entity: &E) -> Result<&mut Self> {
        self.rows.push((E::TABLE, StoredRow::from_entity(entity)?));
        Ok(self)
    }

    /// Stage a raw row.
    pub fn put_row(&mut self, table: Table, row: StoredRow) -> &mut Self {
        self.rows.push((table, row));
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Thread-safe handle to the local database.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    clock: Arc<dyn Clock>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open a store at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh one created.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Moving it aside.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            clock: Arc::new(SystemClock),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            clock: Arc::new(SystemClock),
            db_path: None,
        })
    }

    /// Replace the clock used to stamp writes.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    pub fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Outbox handle sharing this store's database.
    pub fn outbox(&self) -> Outbox {
        Outbox::new(Arc::clone(&self.db), Arc::clone(&self.clock))
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };

        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));
            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local DB file from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale database sidecar {}", path.display());
            }
        }

        Ok(())
    }

    /// Fetch a live (non-deleted) entity by id.
    pub async fn get<E: Entity>(&self, id: &EntityId) -> Result<Option<E>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection());
        match repo.get_row(E::TABLE, id).await? {
            Some(row) if !row.deleted => Ok(Some(row.decode()?)),
            _ => Ok(None),
        }
    }

    /// List live entities, oldest `updated_at` first.
    pub async fn list<E: Entity>(&self) -> Result<Vec<E>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection());
        repo.list_rows(E::TABLE, false)
            .await?
            .iter()
            .map(StoredRow::decode::<E>)
            .collect()
    }

    /// Write one entity; returns it with its committed `updated_at`.
    pub async fn put<E: Entity>(&self, entity: &E) -> Result<E> {
        let mut changes = ChangeSet::new();
        changes.put(entity)?;
        let committed = self.commit(changes).await?;
        committed
            .first()
            .ok_or_else(|| crate::Error::Database("commit returned no rows".to_string()))?
            .decode()
    }

    /// Tombstone an entity. Returns `false` if it does not exist or is already deleted.
    pub async fn delete<E: Entity>(&self, id: &EntityId) -> Result<bool> {
        let Some(mut entity) = self.get::<E>(id).await? else {
            return Ok(false);
        };
        entity.meta_mut().deleted = true;
        self.put(&entity).await?;
        Ok(true)
    }

    /// Commit a batch of writes and their outbox entries in one transaction.
    pub async fn commit(&self, changes: ChangeSet) -> Result<Vec<StoredRow>> {
        if changes.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.clock.now_millis();
        let db = self.db.lock().await;
        let conn = db.connection();

        conn.execute("BEGIN IMMEDIATE", ()).await?;
        match Self::apply_changes(conn, changes, now).await {
            Ok(committed) => {
                if let Err(e) = conn.execute("COMMIT", ()).await {
                    conn.execute("ROLLBACK", ()).await.ok();
                    return Err(e.into());
                }
                tracing::debug!("Committed {} local change(s)", committed.len());
                Ok(committed)
            }
            Err(e) => {
                conn.execute("ROLLBACK", ()).await.ok();
                Err(e)
            }
        }
    }

    async fn apply_changes(
        conn: &libsql::Connection,
        changes: ChangeSet,
        now: i64,
    ) -> Result<Vec<StoredRow>> {
        let entities = LibSqlEntityRepository::new(conn);
        let outbox = LibSqlOutboxRepository::new(conn);
        let mut committed = Vec::with_capacity(changes.len());

        for (table, mut row) in changes.rows {
            let previous = entities
                .get_row(table, &row.id)
                .await?
                .map(|existing| existing.updated_at);
            row.stamp(next_updated_at(previous, now));
            if let Some(object) = row.data.as_object_mut() {
                object.insert("deleted".to_string(), Value::Bool(row.deleted));
            }

            entities.write_row(table, &row).await?;
            outbox.enqueue(table, &row, now).await?;
            committed.push(row);
        }

        Ok(committed)
    }

    /// Apply a row received from the cloud under last-writer-wins.
    ///
    /// Never touches the outbox, so pulled rows are not echoed back.
    pub async fn merge_remote(&self, table: Table, data: Value) -> Result<MergeOutcome> {
        let row = StoredRow::from_value(data)?;
        let resolved_at = self.clock.now_millis();
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection());
        repo.merge_row(table, &row, resolved_at).await
    }

    /// List recently logged LWW conflicts.
    pub async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let db = self.db.lock().await;
        let repo = LibSqlEntityRepository::new(db.connection());
        repo.list_conflicts(limit).await
    }

    pub async fn kv_get(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        LibSqlKvRepository::new(db.connection()).get(key).await
    }

    pub async fn kv_set(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlKvRepository::new(db.connection()).set(key, value).await
    }

    pub async fn kv_delete(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlKvRepository::new(db.connection()).delete(key).await
    }
}
