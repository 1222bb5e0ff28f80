//! Writing an evaluated conversation back to the local store
//!
//! Everything one conversation changes goes into a single `ChangeSet`, so the
//! event, thread, feelings, beliefs and notification appear together or not
//! at all, and each is queued for upload in the same transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::evaluation::{DirectedDelta, Evaluation};
use crate::models::{
    Belief, ConversationPayload, EntityId, Event, EventPayload, Feeling, Notification,
    NotificationType, Resident, TopicThread,
};
use crate::services::{ChangeSet, LocalStore};
use crate::util::truncate_chars;
use crate::Result;

use super::generator::GeneratedConversation;

/// Longest notification snippet, in characters.
pub const SNIPPET_LIMIT: usize = 80;

const DEFAULT_SNIPPET: &str = "会話が発生しました。";

/// Store state the write depends on.
#[derive(Debug, Clone, Copy)]
pub struct PersistContext<'a> {
    pub participants: &'a [Resident; 2],
    pub thread: Option<&'a TopicThread>,
    pub feelings: &'a [Feeling],
    pub beliefs: &'a BTreeMap<EntityId, Belief>,
}

/// Identifiers of what a conversation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedConversation {
    pub event_id: EntityId,
    pub thread_id: EntityId,
    pub notification_id: EntityId,
}

/// One-line human readable record of the deltas, stored with the event.
pub fn system_line(participants: &[Resident; 2], evaluation: &Evaluation) -> String {
    let [a, b] = participants;
    let direction = |from: &Resident, to: &Resident, delta: DirectedDelta| {
        format!(
            "{}→{} favor {:+.2} / impression {}",
            from.name, to.name, delta.favor, delta.impression.after
        )
    };
    format!(
        "SYSTEM: {} | {}",
        direction(a, b, evaluation.deltas.a_to_b),
        direction(b, a, evaluation.deltas.b_to_a)
    )
}

fn snippet(participants: &[Resident; 2], conversation: &GeneratedConversation) -> String {
    conversation
        .lines
        .first()
        .map(|line| {
            let speaker = participants
                .iter()
                .find(|resident| resident.meta.id == line.speaker)
                .map_or_else(|| line.speaker.to_string(), |resident| resident.name.clone());
            truncate_chars(&format!("{speaker}: {}", line.text.trim()), SNIPPET_LIMIT)
        })
        .unwrap_or_else(|| DEFAULT_SNIPPET.to_string())
}

fn updated_feeling(
    feelings: &[Feeling],
    from: &EntityId,
    to: &EntityId,
    delta: DirectedDelta,
    now: i64,
) -> Feeling {
    let mut feeling = feelings
        .iter()
        .find(|feeling| &feeling.from_id == from && &feeling.to_id == to && !feeling.meta.deleted)
        .cloned()
        .unwrap_or_else(|| Feeling::new(from.clone(), to.clone(), now));
    feeling.score += delta.favor;
    feeling.label = delta.impression.after;
    feeling
}

/// Residents that learn a fact about `target` from a conversation between
/// `a` and `b`: the partner when the target is a participant, both otherwise.
fn learners<'a>(a: &'a EntityId, b: &'a EntityId, target: &EntityId) -> Vec<&'a EntityId> {
    if target == a {
        vec![b]
    } else if target == b {
        vec![a]
    } else {
        vec![a, b]
    }
}

/// Write the outcome of one conversation in a single transaction.
pub async fn persist_conversation(
    store: &LocalStore,
    context: PersistContext<'_>,
    conversation: &GeneratedConversation,
    evaluation: &Evaluation,
) -> Result<PersistedConversation> {
    let now = store.now_millis();
    let learned_at = DateTime::<Utc>::from_timestamp_millis(now).unwrap_or_default();
    let [a, b] = context.participants;
    let (a_id, b_id) = (&a.meta.id, &b.meta.id);

    let event = Event::new(
        EventPayload::Conversation(Box::new(ConversationPayload {
            thread_id: conversation.thread_id.clone(),
            participants: [a_id.clone(), b_id.clone()],
            topic: conversation.topic.clone(),
            lines: conversation.lines.clone(),
            meta: conversation.meta.clone(),
            deltas: evaluation.deltas,
            system_line: system_line(context.participants, evaluation),
        })),
        now,
    );

    let mut thread = context.thread.cloned().unwrap_or_else(|| {
        TopicThread::new(
            conversation.thread_id.clone(),
            [a_id.clone(), b_id.clone()],
            now,
        )
    });
    thread.status = evaluation.thread_status;
    thread.last_event_id = Some(event.meta.id.clone());
    if conversation.topic.is_some() {
        thread.topic.clone_from(&conversation.topic);
    }

    let a_to_b = updated_feeling(context.feelings, a_id, b_id, evaluation.deltas.a_to_b, now);
    let b_to_a = updated_feeling(context.feelings, b_id, a_id, evaluation.deltas.b_to_a, now);

    let mut beliefs: BTreeMap<EntityId, Belief> = BTreeMap::new();
    for patch in &evaluation.belief_patches {
        for learner in learners(a_id, b_id, &patch.target) {
            let belief = beliefs.entry(learner.clone()).or_insert_with(|| {
                context
                    .beliefs
                    .get(learner)
                    .cloned()
                    .unwrap_or_else(|| Belief::new(learner.clone(), now))
            });
            belief.learn(&patch.target, &patch.key, learned_at);
        }
    }

    let mut notification = Notification::new(NotificationType::Conversation, event.meta.id.clone(), now);
    notification.thread_id = Some(thread.meta.id.clone());
    notification.participants = Some([a_id.clone(), b_id.clone()]);
    notification.snippet = Some(snippet(context.participants, conversation));

    let mut changes = ChangeSet::new();
    changes.put(&event)?.put(&thread)?.put(&a_to_b)?.put(&b_to_a)?;
    for (resident_id, belief) in &beliefs {
        let unchanged = context
            .beliefs
            .get(resident_id)
            .is_some_and(|previous| previous == belief);
        if !unchanged {
            changes.put(belief)?;
        }
    }
    changes.put(&notification)?;
    store.commit(changes).await?;

    Ok(PersistedConversation {
        event_id: event.meta.id,
        thread_id: thread.meta.id,
        notification_id: notification.meta.id,
    })
}
