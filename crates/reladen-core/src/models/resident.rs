//! Resident model and daily sleep schedule

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use super::entity::{impl_entity, EntityMeta, Table};

const MINUTES_PER_DAY: u32 = 1440;

/// Five personality sliders, 1-5 each (3 when unset).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Traits {
    pub sociability: Option<u8>,
    pub empathy: Option<u8>,
    pub stubbornness: Option<u8>,
    pub activity: Option<u8>,
    pub expressiveness: Option<u8>,
}

/// Bedtime/wake time drawn for one specific day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodaySchedule {
    /// `YYYY-MM-DD`
    pub date: String,
    /// `HH:MM`
    pub bedtime: String,
    /// `HH:MM`
    pub wake_time: String,
}

/// When a resident sleeps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SleepProfile {
    /// `HH:MM`
    pub base_bedtime: String,
    /// `HH:MM`
    pub base_wake_time: String,
    #[serde(default = "default_prep_minutes")]
    pub prep_minutes: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub today_schedule: Option<TodaySchedule>,
}

const fn default_prep_minutes() -> u32 {
    30
}

/// What a resident is doing at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Situation {
    Active,
    Preparing,
    Sleeping,
}

impl SleepProfile {
    /// Situation at local time `now`.
    ///
    /// Uses today's drawn schedule when it is for `now`'s date, otherwise the
    /// base times. `[bed, wake)` is sleeping (wrapping past midnight), the
    /// `prep_minutes` before bed are preparing.
    pub fn situation_at(&self, now: NaiveDateTime) -> Situation {
        let today = now.date().format("%Y-%m-%d").to_string();
        let (bedtime, wake_time) = match &self.today_schedule {
            Some(schedule) if schedule.date == today => {
                (schedule.bedtime.as_str(), schedule.wake_time.as_str())
            }
            _ => (self.base_bedtime.as_str(), self.base_wake_time.as_str()),
        };

        let minute = now.hour() * 60 + now.minute();
        let bed = hm_to_minutes(bedtime);
        let wake = hm_to_minutes(wake_time);
        let prep_start = (bed + MINUTES_PER_DAY - self.prep_minutes % MINUTES_PER_DAY)
            % MINUTES_PER_DAY;

        if in_range(bed, wake, minute) {
            Situation::Sleeping
        } else if in_range(prep_start, bed, minute) {
            Situation::Preparing
        } else {
            Situation::Active
        }
    }
}

/// Parse `HH:MM` into minutes after midnight; malformed or out-of-range
/// input reads as 0.
fn hm_to_minutes(hm: &str) -> u32 {
    let Some((hours, minutes)) = hm.split_once(':') else {
        return 0;
    };
    match (hours.trim().parse::<u32>(), minutes.trim().parse::<u32>()) {
        (Ok(hours @ 0..=23), Ok(minutes @ 0..=59)) => hours * 60 + minutes,
        _ => 0,
    }
}

/// Half-open `[start, end)`; wraps past midnight when `end < start`.
const fn in_range(start: u32, end: u32, x: u32) -> bool {
    if start <= end {
        x >= start && x < end
    } else {
        x >= start || x < end
    }
}

/// A simulated resident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mbti: Option<String>,
    #[serde(default)]
    pub traits: Traits,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occupation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speech_preset: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_person: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    /// 0-100, 50 is neutral
    #[serde(default = "default_trust")]
    pub trust_to_player: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sleep_profile: Option<SleepProfile>,
}

const fn default_trust() -> u8 {
    50
}

impl_entity!(Resident, Table::Residents);

impl Resident {
    /// Create a resident with the given name
    #[must_use]
    pub fn new(name: impl Into<String>, now: i64) -> Self {
        Self {
            meta: EntityMeta::new(now),
            name: name.into(),
            mbti: None,
            traits: Traits::default(),
            gender: None,
            age: None,
            occupation: None,
            speech_preset: None,
            first_person: None,
            interests: Vec::new(),
            trust_to_player: default_trust(),
            sleep_profile: None,
        }
    }

    /// Situation at `now`; residents without a profile are always active.
    pub fn situation_at(&self, now: NaiveDateTime) -> Situation {
        self.sleep_profile
            .as_ref()
            .map_or(Situation::Active, |profile| profile.situation_at(now))
    }
}
