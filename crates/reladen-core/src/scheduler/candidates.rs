//! Who talks next
//!
//! An ongoing thread between two available residents is continued first,
//! oldest first. Otherwise a fresh pair is drawn at random. A pair whose
//! relation is explicitly `none` never talks.

use chrono::{DateTime, FixedOffset, Local, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::models::{
    EntityId, Relation, RelationType, Resident, Situation, ThreadStatus, TopicThread,
};

/// Decides whether a resident can take part in a conversation right now.
pub trait ResidentAvailability: Send + Sync {
    fn is_available(&self, resident: &Resident, now: DateTime<Utc>) -> bool;
}

/// Residents are unavailable while asleep according to their sleep profile.
///
/// Profiles are wall-clock times, so they are read in the host's local time
/// zone unless a fixed offset is given.
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepScheduleAvailability {
    offset: Option<FixedOffset>,
}

impl SleepScheduleAvailability {
    pub const fn with_offset(offset: FixedOffset) -> Self {
        Self {
            offset: Some(offset),
        }
    }
}

impl ResidentAvailability for SleepScheduleAvailability {
    fn is_available(&self, resident: &Resident, now: DateTime<Utc>) -> bool {
        let local = match self.offset {
            Some(offset) => now.with_timezone(&offset).naive_local(),
            None => now.with_timezone(&Local).naive_local(),
        };
        resident.situation_at(local) != Situation::Sleeping
    }
}

/// Selected pair, with the thread to continue if there is one.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationTarget {
    pub thread: Option<TopicThread>,
    pub participants: [Resident; 2],
    pub relation: RelationType,
}

fn relation_between<'a>(
    relations: &'a [Relation],
    a: &EntityId,
    b: &EntityId,
) -> Option<&'a Relation> {
    relations.iter().find(|relation| relation.connects(a, b))
}

fn is_blocked(relations: &[Relation], a: &EntityId, b: &EntityId) -> bool {
    relation_between(relations, a, b).is_some_and(|relation| relation.kind == RelationType::None)
}

fn relation_kind(relations: &[Relation], a: &EntityId, b: &EntityId) -> RelationType {
    relation_between(relations, a, b).map_or(RelationType::None, |relation| relation.kind)
}

/// Pick the next conversation among `eligible` residents.
pub fn select_target<R: Rng + ?Sized>(
    eligible: &[Resident],
    relations: &[Relation],
    threads: &[TopicThread],
    rng: &mut R,
) -> Option<ConversationTarget> {
    if eligible.len() < 2 {
        return None;
    }
    let find = |id: &EntityId| eligible.iter().find(|resident| &resident.meta.id == id);

    let mut ongoing: Vec<&TopicThread> = threads
        .iter()
        .filter(|thread| thread.status == ThreadStatus::Ongoing && !thread.meta.deleted)
        .collect();
    ongoing.sort_by_key(|thread| thread.meta.updated_at);

    for thread in ongoing {
        let [a_id, b_id] = &thread.participants;
        if a_id == b_id || is_blocked(relations, a_id, b_id) {
            continue;
        }
        if let (Some(a), Some(b)) = (find(a_id), find(b_id)) {
            return Some(ConversationTarget {
                thread: Some(thread.clone()),
                participants: [a.clone(), b.clone()],
                relation: relation_kind(relations, a_id, b_id),
            });
        }
    }

    let mut shuffled: Vec<&Resident> = eligible.iter().collect();
    shuffled.shuffle(rng);

    for (index, a) in shuffled.iter().enumerate() {
        for b in &shuffled[index + 1..] {
            if a.meta.id == b.meta.id || is_blocked(relations, &a.meta.id, &b.meta.id) {
                continue;
            }
            return Some(ConversationTarget {
                thread: None,
                participants: [(*a).clone(), (*b).clone()],
                relation: relation_kind(relations, &a.meta.id, &b.meta.id),
            });
        }
    }

    None
}
