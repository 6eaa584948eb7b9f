//! Records, events and queries shared by the store and its callers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::tier::Tier;
use crate::validation::ValidationError;

macro_rules! string_enum {
    ($name:ident, $field:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(ValidationError::UnknownVariant {
                        field: $field,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

/// What kind of activity an award came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    #[default]
    Habit,
    Task,
}

string_enum!(ActivityKind, "activity kind", { Habit => "habit", Task => "task" });

/// A "habit completed" event from the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub owner: String,
    pub habit_id: String,
    /// `None` and an empty list both mean "unclassified".
    #[serde(default)]
    pub domain_codes: Option<Vec<String>>,
    #[serde(default)]
    pub difficulty_level: Option<f64>,
    #[serde(default)]
    pub streak_days: f64,
    #[serde(default)]
    pub kind: ActivityKind,
}

/// Per-(owner, domain) expertise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertiseRecord {
    pub owner: String,
    pub domain_code: String,
    pub domain_name: String,
    pub experience_points: f64,
    pub expertise_level: u8,
    pub expertise_tier: Tier,
    pub habit_count: u32,
    pub task_count: u32,
    pub last_activity_at: i64,
    /// Level as of the last activity or explicit assessment. Decay is always
    /// computed from this base, never from an already-decayed level.
    #[serde(default)]
    pub level_at_last_activity: u8,
    pub last_decay_applied_at: Option<i64>,
    /// Optimistic-concurrency version; bumped on every write.
    pub version: i64,
}

impl ExpertiseRecord {
    /// A fresh zeroed record. `version` 0 means "not yet persisted".
    pub fn new(owner: &str, domain_code: &str, domain_name: &str, now: i64) -> Self {
        Self {
            owner: owner.to_string(),
            domain_code: domain_code.to_string(),
            domain_name: domain_name.to_string(),
            experience_points: 0.0,
            expertise_level: 0,
            expertise_tier: Tier::Beginner,
            habit_count: 0,
            task_count: 0,
            last_activity_at: now,
            level_at_last_activity: 0,
            last_decay_applied_at: None,
            version: 0,
        }
    }

    pub fn is_new(&self) -> bool {
        self.version == 0
    }
}

/// Per-owner overall level. Always rebuilt from scratch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverallLevelRecord {
    pub owner: String,
    pub overall_level: u8,
    pub overall_tier: Tier,
    pub total_experience_points: f64,
    pub habit_continuity_power: f64,
    pub resilience_score: f64,
    pub last_calculated_at: i64,
    pub version: i64,
}

impl OverallLevelRecord {
    pub fn empty(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            overall_level: 0,
            overall_tier: Tier::Beginner,
            total_experience_points: 0.0,
            habit_continuity_power: 0.0,
            resilience_score: 0.0,
            last_calculated_at: 0,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Overall,
    Expertise,
    Continuity,
    Resilience,
}

string_enum!(ChangeType, "change type", {
    Overall => "overall",
    Expertise => "expertise",
    Continuity => "continuity",
    Resilience => "resilience",
});

/// A history entry about to be appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryEntry {
    pub owner: String,
    pub change_type: ChangeType,
    pub domain_code: Option<String>,
    pub old_level: f64,
    pub new_level: f64,
    pub change_reason: String,
    pub metrics_snapshot: serde_json::Value,
}

/// An immutable, stored history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelHistoryEntry {
    pub id: Uuid,
    pub owner: String,
    pub change_type: ChangeType,
    pub domain_code: Option<String>,
    pub old_level: f64,
    pub new_level: f64,
    pub change_reason: String,
    pub metrics_snapshot: serde_json::Value,
    pub created_at: i64,
}

/// History query. All filters are optional and combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryFilter {
    pub from: Option<i64>,
    pub to: Option<i64>,
    pub change_type: Option<ChangeType>,
    pub domain_code: Option<String>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn validate(&self) -> Result<(), ValidationError> {
        crate::validation::validate_date_range(self.from, self.to)?;
        crate::validation::validate_limit(self.limit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    LevelUp,
    LevelDown,
}

string_enum!(SuggestionType, "suggestion type", {
    LevelUp => "level_up",
    LevelDown => "level_down",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Dismissed,
}

string_enum!(SuggestionStatus, "suggestion status", {
    Pending => "pending",
    Accepted => "accepted",
    Dismissed => "dismissed",
});

impl SuggestionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SuggestionStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSuggestion {
    pub id: Uuid,
    pub owner: String,
    pub habit_id: String,
    pub suggestion_type: SuggestionType,
    pub current_level: u8,
    pub target_level: u8,
    /// Patch applied on acceptance. Keys: `difficulty_level`,
    /// `domain_code`, `expertise_level`.
    pub proposed_changes: serde_json::Map<String, serde_json::Value>,
    pub reason: String,
    pub detected_at: i64,
    pub status: SuggestionStatus,
    pub resolved_at: Option<i64>,
}

/// Collaborator-provided habit configuration, read by suggestion detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitProfile {
    pub owner: String,
    pub habit_id: String,
    pub name: String,
    #[serde(default)]
    pub domain_codes: Vec<String>,
    /// Assessed level; `None` until assessed.
    #[serde(default)]
    pub difficulty_level: Option<u8>,
    pub sessions_per_week: u32,
    pub minutes_per_session: u32,
    /// Share of scheduled sessions completed over the last 30 days, 0–100.
    pub completion_rate_30d: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpertiseSort {
    #[default]
    Level,
    Recent,
}

string_enum!(ExpertiseSort, "sort", { Level => "level", Recent => "recent" });
