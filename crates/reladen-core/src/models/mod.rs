//! Data models for Reladen

mod belief;
mod entity;
mod event;
mod notification;
mod outbox;
mod relation;
mod resident;
mod sync_conflict;
mod thread;

pub use belief::{Belief, PersonKnowledge, WorldFact};
pub(crate) use entity::impl_entity;
pub use entity::{
    incoming_wins, merge, next_updated_at, Entity, EntityId, EntityMeta, Table,
};
pub use event::{
    ConversationPayload, Event, EventPayload, FavorChangePayload, FeelingChangePayload,
};
pub use notification::{Notification, NotificationStatus, NotificationType};
pub use outbox::{OutboxCounts, OutboxEntry, OutboxStatus};
pub use relation::{Feeling, Relation, RelationType};
pub use resident::{Resident, Situation, SleepProfile, Traits, TodaySchedule};
pub use sync_conflict::SyncConflict;
pub use thread::{ThreadStatus, TopicThread};
