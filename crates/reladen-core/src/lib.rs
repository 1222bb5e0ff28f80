//! reladen-core - Core library for Reladen
//!
//! Local-first state for a resident life simulation: the entity model, the
//! libSQL local store with its sync outbox, a cross-process lease, the
//! conversation scheduler with its deterministic evaluation engine, and the
//! reconciler that keeps the local store and the cloud tables in step.

pub mod config;
pub mod db;
pub mod error;
pub mod evaluation;
pub mod lease;
pub mod models;
pub mod retry;
pub mod scheduler;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Entity, EntityId, Table};
pub use services::{ChangeSet, LocalStore};
pub use state::SyncPhase;
