//! Conversation evaluation
//!
//! Turns a generated dialogue and its metadata into bounded favor deltas,
//! impression transitions, belief patches and the next thread status. Pure:
//! no I/O, no clock, no panics. Unknown or missing metadata scores zero.

mod weights;

pub use weights::{Impression, WeightTable};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{EntityId, ThreadStatus};

/// One spoken line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueLine {
    pub speaker: EntityId,
    pub text: String,
}

/// A fact one participant revealed about `target`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKnowledge {
    pub target: EntityId,
    pub key: String,
}

/// Thread continuation signal emitted by the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadSignal {
    Continue,
    Close,
    Park,
}

impl ThreadSignal {
    /// Parse a raw signal; unknown values yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "continue" => Some(Self::Continue),
            "close" => Some(Self::Close),
            "park" => Some(Self::Park),
            _ => None,
        }
    }
}

/// Metadata attached to a generated conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMeta {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub new_knowledge: Vec<NewKnowledge>,
    /// Raw signal names; unknown names are ignored when scoring.
    #[serde(default)]
    pub signals: Vec<String>,
    /// Hint name → value, e.g. `tone → gentle`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_hints: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub debug: Vec<String>,
}

/// Impression before and after one conversation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpressionChange {
    pub before: Impression,
    pub after: Impression,
}

impl ImpressionChange {
    pub fn changed(self) -> bool {
        self.before != self.after
    }
}

/// Result for one direction of the pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectedDelta {
    /// Clipped favor delta
    pub favor: f64,
    pub impression: ImpressionChange,
}

/// Deltas for both directions: `a_to_b` is how A's view of B changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairDeltas {
    pub a_to_b: DirectedDelta,
    pub b_to_a: DirectedDelta,
}

/// Everything [`evaluate`] needs.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationInput<'a> {
    pub participants: [&'a EntityId; 2],
    pub lines: &'a [DialogueLine],
    pub meta: &'a ConversationMeta,
    /// Current A→B impression
    pub a_to_b: Impression,
    /// Current B→A impression
    pub b_to_a: Impression,
}

/// Output of [`evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub deltas: PairDeltas,
    pub belief_patches: Vec<NewKnowledge>,
    pub thread_status: ThreadStatus,
    pub summary: String,
}

/// Evaluate one conversation with the given weights.
pub fn evaluate(input: &EvaluationInput<'_>, weights: &WeightTable) -> Evaluation {
    let tag_score: f64 = input
        .meta
        .tags
        .iter()
        .map(|tag| weights.tag_weight(tag))
        .sum();
    let balance = balance_bonus(input.participants, input.lines, weights);
    let quality = quality_score(input.meta.quality_hints.as_ref(), weights);

    // Tag attribution is symmetric: both directions get the same raw score.
    let favor = weights.clip_favor(tag_score + balance + quality);

    let a_to_b = DirectedDelta {
        favor,
        impression: ImpressionChange {
            before: input.a_to_b,
            after: input.a_to_b.step(favor),
        },
    };
    let b_to_a = DirectedDelta {
        favor,
        impression: ImpressionChange {
            before: input.b_to_a,
            after: input.b_to_a.step(favor),
        },
    };

    let thread_status = thread_status(&input.meta.signals, weights);
    let deltas = PairDeltas { a_to_b, b_to_a };
    let belief_patches = input.meta.new_knowledge.clone();
    let summary = summarize(&deltas, &belief_patches, thread_status);

    Evaluation {
        deltas,
        belief_patches,
        thread_status,
        summary,
    }
}

fn balance_bonus(participants: [&EntityId; 2], lines: &[DialogueLine], weights: &WeightTable) -> f64 {
    if lines.is_empty() {
        return 0.0;
    }
    let [a, b] = participants;
    let a_lines = lines.iter().filter(|line| &line.speaker == a).count();
    let b_lines = lines.iter().filter(|line| &line.speaker == b).count();
    let imbalance = a_lines.abs_diff(b_lines) as f64 / lines.len() as f64;
    (1.0 - imbalance) * weights.balance_weight
}

fn quality_score(hints: Option<&BTreeMap<String, String>>, weights: &WeightTable) -> f64 {
    hints.map_or(0.0, |hints| {
        hints
            .iter()
            .map(|(hint, value)| weights.quality_weight(&format!("{}.{}", hint.trim(), value.trim())))
            .sum()
    })
}

fn thread_status(signals: &[String], weights: &WeightTable) -> ThreadStatus {
    let total: f64 = signals
        .iter()
        .filter_map(|signal| ThreadSignal::parse(signal))
        .map(|signal| weights.signal_weight(signal))
        .sum();
    if total > weights.done_threshold {
        ThreadStatus::Done
    } else if total > 0.0 {
        ThreadStatus::Ongoing
    } else {
        ThreadStatus::Paused
    }
}

fn summarize(deltas: &PairDeltas, patches: &[NewKnowledge], status: ThreadStatus) -> String {
    let mut parts = Vec::new();

    for (label, delta) in [("A→B", deltas.a_to_b), ("B→A", deltas.b_to_a)] {
        if delta.favor.abs() > f64::EPSILON {
            parts.push(format!("{label} favor {:+.2}", delta.favor));
        }
        if delta.impression.changed() {
            parts.push(format!(
                "{label} impression {}→{}",
                delta.impression.before, delta.impression.after
            ));
        }
    }

    if !patches.is_empty() {
        let learned = patches
            .iter()
            .map(|patch| format!("{}:{}", patch.target, patch.key))
            .collect::<Vec<_>>()
            .join(", ");
        parts.push(format!("learned {learned}"));
    }

    parts.push(format!("thread {}", status.as_str()));
    parts.join(" / ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn line(speaker: &EntityId, text: &str) -> DialogueLine {
        DialogueLine {
            speaker: speaker.clone(),
            text: text.to_string(),
        }
    }

    fn meta(tags: &[&str], signals: &[&str]) -> ConversationMeta {
        ConversationMeta {
            tags: tags.iter().map(ToString::to_string).collect(),
            signals: signals.iter().map(ToString::to_string).collect(),
            ..ConversationMeta::default()
        }
    }

    fn run(
        a: &EntityId,
        b: &EntityId,
        lines: &[DialogueLine],
        meta: &ConversationMeta,
        before: Impression,
    ) -> Evaluation {
        evaluate(
            &EvaluationInput {
                participants: [a, b],
                lines,
                meta,
                a_to_b: before,
                b_to_a: before,
            },
            &WeightTable::default(),
        )
    }

    #[test]
    fn test_empathy_and_gratitude_scenario() {
        let a = EntityId::from("A");
        let b = EntityId::from("B");
        let lines = vec![
            line(&a, "昨日の映画、良かったね。"),
            line(&b, "うん、後半がすごかった。"),
            line(&a, "誘ってくれてありがとう。"),
            line(&b, "こちらこそ。"),
        ];
        let meta = meta(&["共感", "感謝"], &[]);

        let result = run(&a, &b, &lines, &meta, Impression::None);

        // 0.6 + 0.7 tags, plus a full balance bonus of 0.3
        assert!((result.deltas.a_to_b.favor - 1.6).abs() < 1e-9);
        assert!((result.deltas.b_to_a.favor - 1.6).abs() < 1e-9);
        assert_eq!(result.deltas.a_to_b.impression.after, Impression::Curious);
        assert_eq!(result.deltas.b_to_a.impression.after, Impression::Curious);
        assert!(!result.summary.is_empty());
        assert!(result.summary.contains("favor +1.60"));
    }

    #[test]
    fn test_favor_is_clipped() {
        let a = EntityId::from("A");
        let b = EntityId::from("B");
        let meta = meta(&["非難", "非難", "否定"], &[]);

        let result = run(&a, &b, &[], &meta, Impression::None);

        assert!((result.deltas.a_to_b.favor + 2.0).abs() < f64::EPSILON);
        assert_eq!(result.deltas.a_to_b.impression.after, Impression::Awkward);
    }

    #[test]
    fn test_impression_moves_at_most_one_step() {
        let a = EntityId::from("A");
        let b = EntityId::from("B");
        let meta = meta(&["称賛", "称賛", "称賛", "感謝"], &[]);

        for before in Impression::LADDER {
            let result = run(&a, &b, &[], &meta, before);
            let after = result.deltas.a_to_b.impression.after;
            assert!(after.rank().abs_diff(before.rank()) <= 1);
            assert!(after >= before);
        }
    }

    #[test]
    fn test_missing_metadata_scores_zero() {
        let a = EntityId::from("A");
        let b = EntityId::from("B");
        let meta = meta(&["未知のタグ"], &["wander"]);

        let result = run(&a, &b, &[], &meta, Impression::Like);

        assert!(result.deltas.a_to_b.favor.abs() < f64::EPSILON);
        assert_eq!(result.deltas.a_to_b.impression.after, Impression::Like);
        assert_eq!(result.thread_status, ThreadStatus::Paused);
        assert_eq!(result.summary, "thread paused");
    }

    #[test]
    fn test_one_sided_dialogue_gets_no_balance_bonus() {
        let a = EntityId::from("A");
        let b = EntityId::from("B");
        let lines = vec![line(&a, "ねえ"), line(&a, "聞いてる?")];

        let result = run(&a, &b, &lines, &ConversationMeta::default(), Impression::None);

        assert!(result.deltas.a_to_b.favor.abs() < f64::EPSILON);
    }

    #[test]
    fn test_quality_hints_use_hint_value_keys() {
        let a = EntityId::from("A");
        let b = EntityId::from("B");
        let mut meta = ConversationMeta::default();
        meta.quality_hints = Some(BTreeMap::from([
            ("tone".to_string(), "harsh".to_string()),
            ("coherence".to_string(), "good".to_string()),
            ("mood".to_string(), "sunny".to_string()),
        ]));

        let result = run(&a, &b, &[], &meta, Impression::None);

        assert!((result.deltas.a_to_b.favor + 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_thread_status_thresholds() {
        let a = EntityId::from("A");
        let b = EntityId::from("B");
        let cases = [
            (vec!["continue"], ThreadStatus::Ongoing),
            (vec!["close"], ThreadStatus::Done),
            (vec!["continue", "continue"], ThreadStatus::Done),
            (vec!["park"], ThreadStatus::Paused),
            (vec![], ThreadStatus::Paused),
        ];

        for (signals, expected) in cases {
            let meta = meta(&[], &signals);
            let result = run(&a, &b, &[], &meta, Impression::None);
            assert_eq!(result.thread_status, expected, "signals: {signals:?}");
        }
    }

    #[test]
    fn test_belief_patches_pass_through() {
        let a = EntityId::from("A");
        let b = EntityId::from("B");
        let mut meta = ConversationMeta::default();
        meta.new_knowledge.push(NewKnowledge {
            target: b.clone(),
            key: "likes.movie".to_string(),
        });

        let result = run(&a, &b, &[], &meta, Impression::None);

        assert_eq!(result.belief_patches, meta.new_knowledge);
        assert!(result.summary.contains("learned B:likes.movie"));
    }

    #[test]
    fn test_meta_deserializes_with_missing_fields() {
        let meta: ConversationMeta = serde_json::from_str(r#"{"tags":["共感"]}"#).unwrap();
        assert_eq!(meta.tags, vec!["共感".to_string()]);
        assert!(meta.new_knowledge.is_empty());
        assert!(meta.quality_hints.is_none());
    }
}
