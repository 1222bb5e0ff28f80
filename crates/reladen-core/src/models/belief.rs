//! Belief model: what a resident has learned

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::{impl_entity, EntityId, EntityMeta, Table};

/// A world event the resident witnessed or heard about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorldFact {
    pub event_id: EntityId,
    pub learned_at: DateTime<Utc>,
}

/// Facts known about one other resident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonKnowledge {
    pub keys: Vec<String>,
    pub learned_at: DateTime<Utc>,
}

/// Accumulated knowledge of one resident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Belief {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub resident_id: EntityId,
    #[serde(default)]
    pub world_facts: Vec<WorldFact>,
    #[serde(default)]
    pub person_knowledge: BTreeMap<EntityId, PersonKnowledge>,
}

impl_entity!(Belief, Table::Beliefs);

impl Belief {
    #[must_use]
    pub fn new(resident_id: EntityId, now: i64) -> Self {
        Self {
            meta: EntityMeta::new(now),
            resident_id,
            world_facts: Vec::new(),
            person_knowledge: BTreeMap::new(),
        }
    }

    /// Record that this resident learned `key` about `target`.
    ///
    /// Returns `false` when the key was already known (nothing changed).
    pub fn learn(&mut self, target: &EntityId, key: &str, learned_at: DateTime<Utc>) -> bool {
        let knowledge = self
            .person_knowledge
            .entry(target.clone())
            .or_insert_with(|| PersonKnowledge {
                keys: Vec::new(),
                learned_at,
            });
        if knowledge.keys.iter().any(|known| known == key) {
            return false;
        }
        knowledge.keys.push(key.to_string());
        knowledge.learned_at = learned_at;
        true
    }

    /// Whether `key` is known about `target`.
    pub fn knows(&self, target: &EntityId, key: &str) -> bool {
        self.person_knowledge
            .get(target)
            .is_some_and(|knowledge| knowledge.keys.iter().any(|known| known == key))
    }
}
