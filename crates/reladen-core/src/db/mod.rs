//! Database layer for Reladen

mod connection;
mod entity_repository;
mod kv_repository;
mod migrations;
mod outbox_repository;

pub use connection::Database;
pub use entity_repository::{EntityRepository, LibSqlEntityRepository, MergeOutcome, StoredRow};
pub use kv_repository::{KvRepository, LibSqlKvRepository};
pub use outbox_repository::{LibSqlOutboxRepository, OutboxRepository};
