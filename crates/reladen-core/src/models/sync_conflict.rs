//! Sync conflict model

use serde::{Deserialize, Serialize};

/// Incoming write rejected by last-writer-wins because the local row was newer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConflict {
    /// Conflict row identifier
    pub id: i64,
    /// Table of the record
    pub table: String,
    /// Record involved in the conflict
    pub record_id: String,
    /// Existing row's timestamp when conflict occurred
    pub local_updated_at: i64,
    /// Incoming row's timestamp that was rejected
    pub incoming_updated_at: i64,
    /// Resolution timestamp (unix ms)
    pub resolved_at: i64,
    /// Resolution strategy name
    pub strategy: String,
}
