//! Notification model

use serde::{Deserialize, Serialize};

use super::entity::{impl_entity, EntityId, EntityMeta, Table};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationType {
    #[default]
    Conversation,
    Consult,
    System,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
    Archived,
}

/// A dashboard notification pointing at an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(rename = "type", default)]
    pub kind: NotificationType,
    pub linked_event_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<EntityId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<[EntityId; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
    /// Unix ms
    pub occurred_at: i64,
    #[serde(default)]
    pub status: NotificationStatus,
    #[serde(default)]
    pub priority: i32,
}

impl_entity!(Notification, Table::Notifications);

impl Notification {
    #[must_use]
    pub fn new(kind: NotificationType, linked_event_id: EntityId, now: i64) -> Self {
        Self {
            meta: EntityMeta::new(now),
            kind,
            linked_event_id,
            thread_id: None,
            participants: None,
            snippet: None,
            occurred_at: now,
            status: NotificationStatus::Unread,
            priority: 0,
        }
    }
}
