//! Level-change suggestion detection.
//!
//! A habit's assessed level is compared with the level its workload
//! implies: weekly minutes, scaled by how much of it the owner actually
//! completes. A divergence larger than the threshold yields a draft for
//! human review.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::constants::{DEFAULT_DIFFICULTY, GENERAL_DOMAIN_CODE, MAX_LEVEL};
use crate::model::{HabitProfile, SuggestionType};

pub const PATCH_DIFFICULTY_LEVEL: &str = "difficulty_level";
pub const PATCH_DOMAIN_CODE: &str = "domain_code";
pub const PATCH_EXPERTISE_LEVEL: &str = "expertise_level";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DetectionPolicy {
    /// Divergence, in levels, that must be exceeded to raise a suggestion.
    pub divergence_threshold: u8,
    /// Weekly minutes of completed practice per level.
    pub minutes_per_level: f64,
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self {
            divergence_threshold: 25,
            minutes_per_level: 2.0,
        }
    }
}

/// A suggestion ready to be stored as pending.
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionDraft {
    pub habit_id: String,
    pub suggestion_type: SuggestionType,
    pub current_level: u8,
    pub target_level: u8,
    pub proposed_changes: Map<String, Value>,
    pub reason: String,
}

/// Domain the habit's expertise adjustments land in.
pub fn primary_domain(habit: &HabitProfile) -> &str {
    habit
        .domain_codes
        .first()
        .map(String::as_str)
        .unwrap_or(GENERAL_DOMAIN_CODE)
}

/// Level implied by the habit's configured workload and recent completion.
pub fn workload_level(habit: &HabitProfile, policy: &DetectionPolicy) -> u8 {
    let minutes_per_level = if policy.minutes_per_level.is_finite() && policy.minutes_per_level > 0.0 {
        policy.minutes_per_level
    } else {
        DetectionPolicy::default().minutes_per_level
    };
    let completion = if habit.completion_rate_30d.is_finite() {
        habit.completion_rate_30d.clamp(0.0, 100.0) / 100.0
    } else {
        0.0
    };
    let weekly_minutes = habit.sessions_per_week as f64 * habit.minutes_per_session as f64;
    (weekly_minutes * completion / minutes_per_level)
        .round()
        .clamp(0.0, MAX_LEVEL as f64) as u8
}

/// Compare a habit's assessed level with its workload level.
///
/// `expertise_level` is the owner's current level in the habit's primary
/// domain. The proposed expertise only ever moves in the suggested
/// direction: a level-up never lowers expertise and a level-down never
/// raises it.
pub fn evaluate(
    habit: &HabitProfile,
    expertise_level: u8,
    policy: &DetectionPolicy,
) -> Option<SuggestionDraft> {
    let current = habit
        .difficulty_level
        .unwrap_or(DEFAULT_DIFFICULTY as u8)
        .min(MAX_LEVEL);
    let implied = workload_level(habit, policy);
    let divergence = implied as i16 - current as i16;

    if divergence.unsigned_abs() <= policy.divergence_threshold as u16 {
        return None;
    }

    let (suggestion_type, expertise_target) = if divergence > 0 {
        (SuggestionType::LevelUp, expertise_level.max(implied))
    } else {
        (SuggestionType::LevelDown, expertise_level.min(implied))
    };

    let direction = match suggestion_type {
        SuggestionType::LevelUp => "above",
        SuggestionType::LevelDown => "below",
    };
    let reason = format!(
        "'{}' is assessed at level {current}, but {} sessions of {} min per week at {:.0}% completion \
         put it at level {implied}, {} levels {direction} the assessment",
        habit.name,
        habit.sessions_per_week,
        habit.minutes_per_session,
        habit.completion_rate_30d.clamp(0.0, 100.0),
        divergence.unsigned_abs(),
    );

    let mut proposed_changes = Map::new();
    proposed_changes.insert(PATCH_DIFFICULTY_LEVEL.into(), json!(implied));
    proposed_changes.insert(PATCH_DOMAIN_CODE.into(), json!(primary_domain(habit)));
    proposed_changes.insert(PATCH_EXPERTISE_LEVEL.into(), json!(expertise_target));

    Some(SuggestionDraft {
        habit_id: habit.habit_id.clone(),
        suggestion_type,
        current_level: current,
        target_level: implied,
        proposed_changes,
        reason,
    })
}
