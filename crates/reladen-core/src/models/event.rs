//! Event log model
//!
//! The payload shape depends on `kind`. It is modelled as a sum type and
//! converted through a raw `{kind, payload}` form at the serde boundary, so an
//! unknown kind or a payload that does not match its kind is a decode error.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::entity::{impl_entity, EntityId, EntityMeta, Table};
use crate::evaluation::{ConversationMeta, DialogueLine, Impression, PairDeltas};

/// A generated conversation after evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationPayload {
    pub thread_id: EntityId,
    pub participants: [EntityId; 2],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub lines: Vec<DialogueLine>,
    pub meta: ConversationMeta,
    pub deltas: PairDeltas,
    pub system_line: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FavorChangePayload {
    pub from_id: EntityId,
    pub to_id: EntityId,
    pub delta: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeelingChangePayload {
    pub from_id: EntityId,
    pub to_id: EntityId,
    pub before: Impression,
    pub after: Impression,
    pub reason: String,
}

/// Event payload, discriminated by `kind`.
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Conversation(Box<ConversationPayload>),
    FavorChange(FavorChangePayload),
    FeelingChange(FeelingChangePayload),
    /// Free-form system message
    System(Map<String, Value>),
    /// Free-form consult exchange
    Consult(Map<String, Value>),
}

impl EventPayload {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Conversation(_) => "conversation",
            Self::FavorChange(_) => "favor_change",
            Self::FeelingChange(_) => "feeling_change",
            Self::System(_) => "system",
            Self::Consult(_) => "consult",
        }
    }
}

/// An entry in the event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent", into = "RawEvent")]
pub struct Event {
    pub meta: EntityMeta,
    pub payload: EventPayload,
}

impl_entity!(Event, Table::Events);

impl Event {
    #[must_use]
    pub fn new(payload: EventPayload, now: i64) -> Self {
        Self {
            meta: EntityMeta::new(now),
            payload,
        }
    }

    /// Thread this event belongs to, for conversation events.
    pub fn thread_id(&self) -> Option<&EntityId> {
        match &self.payload {
            EventPayload::Conversation(conversation) => Some(&conversation.thread_id),
            _ => None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawEvent {
    #[serde(flatten)]
    meta: EntityMeta,
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl TryFrom<RawEvent> for Event {
    type Error = serde_json::Error;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let payload = match raw.kind.as_str() {
            "conversation" => {
                EventPayload::Conversation(Box::new(serde_json::from_value(raw.payload)?))
            }
            "favor_change" => EventPayload::FavorChange(serde_json::from_value(raw.payload)?),
            "feeling_change" => EventPayload::FeelingChange(serde_json::from_value(raw.payload)?),
            "system" => EventPayload::System(object_or_empty(raw.payload)),
            "consult" => EventPayload::Consult(object_or_empty(raw.payload)),
            other => {
                return Err(serde::de::Error::custom(format!(
                    "unknown event kind: {other}"
                )))
            }
        };
        Ok(Self {
            meta: raw.meta,
            payload,
        })
    }
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        let kind = event.payload.kind().to_string();
        let payload = match event.payload {
            EventPayload::Conversation(conversation) => {
                serde_json::to_value(*conversation).unwrap_or(Value::Null)
            }
            EventPayload::FavorChange(change) => {
                serde_json::to_value(change).unwrap_or(Value::Null)
            }
            EventPayload::FeelingChange(change) => {
                serde_json::to_value(change).unwrap_or(Value::Null)
            }
            EventPayload::System(map) | EventPayload::Consult(map) => Value::Object(map),
        };
        Self {
            meta: event.meta,
            kind,
            payload,
        }
    }
}

fn object_or_empty(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
