//! Relation and feeling models

use serde::{Deserialize, Serialize};

use super::entity::{impl_entity, EntityId, EntityMeta, Table};
use crate::evaluation::Impression;

/// Kind of relationship between two residents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    /// The "no relationship" sentinel; such pairs are never paired up
    #[default]
    None,
    Friend,
    BestFriend,
    Lover,
    Family,
}

/// Unordered relationship between two residents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub a_id: EntityId,
    pub b_id: EntityId,
    #[serde(rename = "type", default)]
    pub kind: RelationType,
}

impl_entity!(Relation, Table::Relations);

impl Relation {
    #[must_use]
    pub fn new(a_id: EntityId, b_id: EntityId, kind: RelationType, now: i64) -> Self {
        Self {
            meta: EntityMeta::new(now),
            a_id,
            b_id,
            kind,
        }
    }

    /// Whether this relation links `x` and `y`, in either order.
    pub fn connects(&self, x: &EntityId, y: &EntityId) -> bool {
        (&self.a_id == x && &self.b_id == y) || (&self.a_id == y && &self.b_id == x)
    }
}

/// Directed feeling from one resident toward another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feeling {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub from_id: EntityId,
    pub to_id: EntityId,
    #[serde(default)]
    pub label: Impression,
    /// Accumulated favor
    #[serde(default)]
    pub score: f64,
}

impl_entity!(Feeling, Table::Feelings);

impl Feeling {
    #[must_use]
    pub fn new(from_id: EntityId, to_id: EntityId, now: i64) -> Self {
        Self {
            meta: EntityMeta::new(now),
            from_id,
            to_id,
            label: Impression::default(),
            score: 0.0,
        }
    }
}
