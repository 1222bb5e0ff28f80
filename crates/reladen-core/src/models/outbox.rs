//! Outbox entry model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{EntityId, Table};
use crate::error::Error;

/// Delivery state of an outbox entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    #[default]
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!("Unknown outbox status: {other}"))),
        }
    }
}

/// A local mutation waiting to be pushed to the cloud.
///
/// At most one entry exists per `(table, id)`; it always carries the newest
/// version of the record that has not been confirmed sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxEntry {
    /// `"table:id"`
    pub key: String,
    pub table: Table,
    pub record_id: EntityId,
    /// Full record payload
    pub data: Value,
    pub updated_at: i64,
    pub deleted: bool,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub enqueued_at: i64,
}

impl OutboxEntry {
    pub fn key_for(table: Table, id: &EntityId) -> String {
        format!("{table}:{id}")
    }
}

/// Outbox totals for the status indicator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxCounts {
    pub pending: u64,
    pub failed: u64,
}

impl OutboxCounts {
    pub const fn is_empty(&self) -> bool {
        self.pending == 0 && self.failed == 0
    }
}
