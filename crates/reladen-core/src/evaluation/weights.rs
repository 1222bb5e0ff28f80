//! Weight tables and the impression ladder
//!
//! The single source of truth for how tags, quality hints and signals score.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ThreadSignal;

const DEFAULT_FAVOR_MIN: f64 = -2.0;
const DEFAULT_FAVOR_MAX: f64 = 2.0;

/// Impression one resident holds of another.
///
/// Totally ordered from most negative to most positive; a single
/// conversation moves it by at most one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Impression {
    #[serde(rename = "dislike")]
    Dislike,
    #[serde(rename = "awkward")]
    Awkward,
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "curious")]
    Curious,
    #[serde(rename = "like?", alias = "maybe_like")]
    MaybeLike,
    #[serde(rename = "like")]
    Like,
}

impl Impression {
    /// Ladder order, lowest first.
    pub const LADDER: [Self; 6] = [
        Self::Dislike,
        Self::Awkward,
        Self::None,
        Self::Curious,
        Self::MaybeLike,
        Self::Like,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dislike => "dislike",
            Self::Awkward => "awkward",
            Self::None => "none",
            Self::Curious => "curious",
            Self::MaybeLike => "like?",
            Self::Like => "like",
        }
    }

    /// Position on the ladder, 0 = most negative.
    pub fn rank(self) -> usize {
        Self::LADDER
            .iter()
            .position(|step| *step == self)
            .unwrap_or(2)
    }

    /// Move one step toward the sign of `delta`; zero stays put.
    #[must_use]
    pub fn step(self, delta: f64) -> Self {
        let rank = self.rank();
        if delta > 0.0 {
            Self::LADDER[(rank + 1).min(Self::LADDER.len() - 1)]
        } else if delta < 0.0 {
            Self::LADDER[rank.saturating_sub(1)]
        } else {
            self
        }
    }
}

impl std::fmt::Display for Impression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scoring constants for the evaluation engine.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    /// Conversation-act tag → favor contribution (both directions)
    pub tags: HashMap<String, f64>,
    /// `"<hint>.<value>"` → favor contribution (both directions)
    pub quality: HashMap<String, f64>,
    /// Multiplier on `1 - imbalance`
    pub balance_weight: f64,
    pub signal_continue: f64,
    pub signal_close: f64,
    pub signal_park: f64,
    /// Signal sum strictly above this marks the thread done
    pub done_threshold: f64,
    /// Symmetric per-conversation favor bound
    pub favor_min: f64,
    pub favor_max: f64,
}

impl WeightTable {
    pub fn tag_weight(&self, tag: &str) -> f64 {
        self.tags.get(tag.trim()).copied().unwrap_or(0.0)
    }

    pub fn quality_weight(&self, key: &str) -> f64 {
        self.quality.get(key).copied().unwrap_or(0.0)
    }

    pub const fn signal_weight(&self, signal: ThreadSignal) -> f64 {
        match signal {
            ThreadSignal::Continue => self.signal_continue,
            ThreadSignal::Close => self.signal_close,
            ThreadSignal::Park => self.signal_park,
        }
    }

    /// Clamp to `[favor_min, favor_max]` after rounding to 2 decimals.
    ///
    /// Bounds that are not finite or not ordered fall back to ±2.
    pub fn clip_favor(&self, value: f64) -> f64 {
        if !value.is_finite() {
            return 0.0;
        }
        let (min, max) = if self.favor_min.is_finite()
            && self.favor_max.is_finite()
            && self.favor_min <= self.favor_max
        {
            (self.favor_min, self.favor_max)
        } else {
            (DEFAULT_FAVOR_MIN, DEFAULT_FAVOR_MAX)
        };
        let rounded = (value * 100.0).round() / 100.0;
        rounded.clamp(min, max)
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        let tags = [
            ("共感", 0.6),
            ("感謝", 0.7),
            ("称賛", 0.8),
            ("協力", 0.5),
            ("否定", -0.8),
            ("皮肉", -0.5),
            ("非難", -1.2),
            ("情報共有", 0.1),
            ("軽い冗談", 0.2),
        ];
        let quality = [
            ("coherence.good", 0.2),
            ("coherence.poor", -0.4),
            ("tone.gentle", 0.2),
            ("tone.friendly", 0.2),
            ("tone.harsh", -0.4),
            ("turnBalance.balanced", 0.1),
            ("turnBalance.skewed", -0.1),
        ];

        Self {
            tags: tags
                .into_iter()
                .map(|(tag, weight)| (tag.to_string(), weight))
                .collect(),
            quality: quality
                .into_iter()
                .map(|(key, weight)| (key.to_string(), weight))
                .collect(),
            balance_weight: 0.3,
            signal_continue: 0.1,
            signal_close: 0.2,
            signal_park: 0.0,
            done_threshold: 0.15,
            favor_min: DEFAULT_FAVOR_MIN,
            favor_max: DEFAULT_FAVOR_MAX,
        }
    }
}
