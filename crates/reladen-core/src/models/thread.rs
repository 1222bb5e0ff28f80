//! Topic thread model

use serde::{Deserialize, Serialize};

use super::entity::{impl_entity, EntityId, EntityMeta, Table};

/// Whether a thread should keep going.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Ongoing,
    Paused,
    Done,
}

impl ThreadStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ongoing => "ongoing",
            Self::Paused => "paused",
            Self::Done => "done",
        }
    }
}

/// A conversation topic shared by two residents across several events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicThread {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub participants: [EntityId; 2],
    #[serde(default)]
    pub status: ThreadStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<EntityId>,
}

impl_entity!(TopicThread, Table::TopicThreads);

impl TopicThread {
    #[must_use]
    pub fn new(id: EntityId, participants: [EntityId; 2], now: i64) -> Self {
        Self {
            meta: EntityMeta::with_id(id, now),
            participants,
            status: ThreadStatus::Ongoing,
            topic: None,
            last_event_id: None,
        }
    }

    /// Whether the thread is between `x` and `y`, in either order.
    pub fn is_between(&self, x: &EntityId, y: &EntityId) -> bool {
        let [a, b] = &self.participants;
        (a == x && b == y) || (a == y && b == x)
    }
}
