//! Shared entity shape and last-writer-wins rules

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::Error;

/// A stable record identifier.
///
/// New ids are UUID v7 (time-sortable); ids received from the cloud or typed
/// by hand are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Create a new unique id using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Fields every synchronized record carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    /// Immutable after creation
    pub id: EntityId,
    /// Last mutation (Unix ms); sole ordering key for conflict resolution
    pub updated_at: i64,
    /// Tombstone; deleted rows are kept so the delete can sync
    #[serde(default)]
    pub deleted: bool,
}

impl EntityMeta {
    pub fn new(updated_at: i64) -> Self {
        Self {
            id: EntityId::new(),
            updated_at,
            deleted: false,
        }
    }

    pub fn with_id(id: impl Into<EntityId>, updated_at: i64) -> Self {
        Self {
            id: id.into(),
            updated_at,
            deleted: false,
        }
    }
}

/// Every synchronized table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Residents,
    Relations,
    Feelings,
    Events,
    TopicThreads,
    Beliefs,
    Notifications,
}

impl Table {
    pub const ALL: [Self; 7] = [
        Self::Residents,
        Self::Relations,
        Self::Feelings,
        Self::Events,
        Self::TopicThreads,
        Self::Beliefs,
        Self::Notifications,
    ];

    /// Table name, shared by the local schema, outbox keys and cloud API.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Residents => "residents",
            Self::Relations => "relations",
            Self::Feelings => "feelings",
            Self::Events => "events",
            Self::TopicThreads => "topic_threads",
            Self::Beliefs => "beliefs",
            Self::Notifications => "notifications",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown table: {s}")))
    }
}

/// A record stored in one of the synchronized tables.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: Table;

    fn meta(&self) -> &EntityMeta;

    fn meta_mut(&mut self) -> &mut EntityMeta;

    fn id(&self) -> &EntityId {
        &self.meta().id
    }

    fn updated_at(&self) -> i64 {
        self.meta().updated_at
    }

    fn is_deleted(&self) -> bool {
        self.meta().deleted
    }
}

macro_rules! impl_entity {
    ($ty:ty, $table:expr) => {
        impl $crate::models::Entity for $ty {
            const TABLE: $crate::models::Table = $table;

            fn meta(&self) -> &$crate::models::EntityMeta {
                &self.meta
            }

            fn meta_mut(&mut self) -> &mut $crate::models::EntityMeta {
                &mut self.meta
            }
        }
    };
}

pub(crate) use impl_entity;

/// Whether an incoming version may replace the stored one.
///
/// Greater `updated_at` wins; on a tie the incoming (cloud) side wins.
pub const fn incoming_wins(local_updated_at: i64, incoming_updated_at: i64) -> bool {
    incoming_updated_at >= local_updated_at
}

/// Last-writer-wins merge of two versions of the same record.
#[must_use]
pub fn merge<E: Entity>(local: E, remote: E) -> E {
    if incoming_wins(local.updated_at(), remote.updated_at()) {
        remote
    } else {
        local
    }
}

/// Timestamp for the next write to a record last written at `previous`.
///
/// Strictly greater than `previous` even if the clock stalls or runs back.
pub fn next_updated_at(previous: Option<i64>, now: i64) -> i64 {
    match previous {
        Some(previous) if now <= previous => previous.saturating_add(1),
        _ => now,
    }
}
