//! Entity table repository
//!
//! Every entity table has the same shape: the identity and ordering columns
//! (`id`, `updated_at`, `deleted`) mirrored out of the JSON document in
//! `data`. Rows travel as [`StoredRow`] so the outbox and the sync path can
//! move records without knowing their concrete type.

use libsql::Connection;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::models::{Entity, EntityId, SyncConflict, Table};

/// One record as stored: ordering columns plus the full document.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub id: EntityId,
    pub updated_at: i64,
    pub deleted: bool,
    pub data: Value,
}

impl StoredRow {
    /// Read the identity and ordering fields out of a camelCase document.
    pub fn from_value(data: Value) -> Result<Self> {
        let object = data
            .as_object()
            .ok_or_else(|| Error::InvalidInput("record must be a JSON object".to_string()))?;
        let id = object
            .get("id")
            .and_then(Value::as_str)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| Error::InvalidInput("record is missing `id`".to_string()))?;
        let updated_at = object
            .get("updatedAt")
            .and_then(Value::as_i64)
            .ok_or_else(|| Error::InvalidInput(format!("record {id} is missing `updatedAt`")))?;
        let deleted = object
            .get("deleted")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            id: EntityId::from(id),
            updated_at,
            deleted,
            data,
        })
    }

    pub fn from_entity<E: Entity>(entity: &E) -> Result<Self> {
        Self::from_value(serde_json::to_value(entity)?)
    }

    /// Decode the document into a concrete entity.
    pub fn decode<E: Entity>(&self) -> Result<E> {
        Ok(serde_json::from_value(self.data.clone())?)
    }

    /// Set `updatedAt` on both the column and the document.
    pub fn stamp(&mut self, updated_at: i64) {
        self.updated_at = updated_at;
        if let Some(object) = self.data.as_object_mut() {
            object.insert("updatedAt".to_string(), Value::from(updated_at));
        }
    }
}

/// Result of applying an incoming row under last-writer-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Row inserted or replaced
    Applied,
    /// Local row was strictly newer; incoming row dropped and logged
    Stale { local_updated_at: i64 },
}

/// Trait for entity table operations (async)
#[allow(async_fn_in_trait)]
pub trait EntityRepository {
    /// Fetch one row, tombstones included
    async fn get_row(&self, table: Table, id: &EntityId) -> Result<Option<StoredRow>>;

    /// List rows in `updated_at` order
    async fn list_rows(&self, table: Table, include_deleted: bool) -> Result<Vec<StoredRow>>;

    /// Unconditionally write a locally produced row
    async fn write_row(&self, table: Table, row: &StoredRow) -> Result<()>;

    /// Apply an incoming row; greater `updated_at` wins, ties favor the incoming row
    async fn merge_row(&self, table: Table, row: &StoredRow, resolved_at: i64)
        -> Result<MergeOutcome>;

    /// List recently logged conflicts, newest first
    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>>;
}

/// libSQL implementation of `EntityRepository`
pub struct LibSqlEntityRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntityRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_row(row: &libsql::Row) -> Result<StoredRow> {
        let id: String = row.get(0)?;
        let updated_at: i64 = row.get(1)?;
        let deleted: i64 = row.get(2)?;
        let data: String = row.get(3)?;

        Ok(StoredRow {
            id: EntityId::from(id),
            updated_at,
            deleted: deleted != 0,
            data: serde_json::from_str(&data)?,
        })
    }

    async fn log_conflict(
        &self,
        table: Table,
        id: &EntityId,
        local_updated_at: i64,
        incoming_updated_at: i64,
        resolved_at: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_conflicts (
                    table_name, record_id, local_updated_at, incoming_updated_at, resolved_at, strategy
                ) VALUES (?1, ?2, ?3, ?4, ?5, 'lww')",
                libsql::params![
                    table.as_str(),
                    id.as_str(),
                    local_updated_at,
                    incoming_updated_at,
                    resolved_at
                ],
            )
            .await?;
        Ok(())
    }
}

impl EntityRepository for LibSqlEntityRepository<'_> {
    async fn get_row(&self, table: Table, id: &EntityId) -> Result<Option<StoredRow>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT id, updated_at, deleted, data FROM {table} WHERE id = ?1"),
                [id.as_str()],
            )
            .await?;

        if let Some(row) = rows.next().await? {
            Ok(Some(Self::parse_row(&row)?))
        } else {
            Ok(None)
        }
    }

    async fn list_rows(&self, table: Table, include_deleted: bool) -> Result<Vec<StoredRow>> {
        let filter = if include_deleted {
            ""
        } else {
            "WHERE deleted = 0"
        };
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT id, updated_at, deleted, data FROM {table} {filter}
                     ORDER BY updated_at ASC, id ASC"
                ),
                (),
            )
            .await?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().await? {
            result.push(Self::parse_row(&row)?);
        }
        Ok(result)
    }

    async fn write_row(&self, table: Table, row: &StoredRow) -> Result<()> {
        let data = serde_json::to_string(&row.data)?;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO {table} (id, updated_at, deleted, data) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        updated_at = excluded.updated_at,
                        deleted = excluded.deleted,
                        data = excluded.data"
                ),
                libsql::params![row.id.as_str(), row.updated_at, i64::from(row.deleted), data],
            )
            .await?;
        Ok(())
    }

    async fn merge_row(
        &self,
        table: Table,
        row: &StoredRow,
        resolved_at: i64,
    ) -> Result<MergeOutcome> {
        let data = serde_json::to_string(&row.data)?;
        let changed = self
            .conn
            .execute(
                &format!(
                    "INSERT INTO {table} (id, updated_at, deleted, data) VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET
                        updated_at = excluded.updated_at,
                        deleted = excluded.deleted,
                        data = excluded.data
                     WHERE excluded.updated_at >= {table}.updated_at"
                ),
                libsql::params![row.id.as_str(), row.updated_at, i64::from(row.deleted), data],
            )
            .await?;

        if changed > 0 {
            return Ok(MergeOutcome::Applied);
        }

        let local_updated_at = self
            .get_row(table, &row.id)
            .await?
            .map_or(row.updated_at, |local| local.updated_at);
        self.log_conflict(table, &row.id, local_updated_at, row.updated_at, resolved_at)
            .await?;
        tracing::warn!(
            "LWW conflict on {table}/{}: kept local {local_updated_at}, dropped incoming {}",
            row.id,
            row.updated_at
        );
        Ok(MergeOutcome::Stale { local_updated_at })
    }

    async fn list_conflicts(&self, limit: usize) -> Result<Vec<SyncConflict>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = self
            .conn
            .query(
                "SELECT id, table_name, record_id, local_updated_at, incoming_updated_at, resolved_at, strategy
                 FROM sync_conflicts
                 ORDER BY resolved_at DESC, id DESC
                 LIMIT ?1",
                [limit],
            )
            .await?;

        let mut conflicts = Vec::new();
        while let Some(row) = rows.next().await? {
            conflicts.push(SyncConflict {
                id: row.get(0)?,
                table: row.get(1)?,
                record_id: row.get(2)?,
                local_updated_at: row.get(3)?,
                incoming_updated_at: row.get(4)?,
                resolved_at: row.get(5)?,
                strategy: row.get(6)?,
            });
        }
        Ok(conflicts)
    }
}
