use serde_json::{Value, json};

use crate::curve::LevelCurve;
use crate::metrics::{BehaviorWindow, SharedMetrics};
use crate::model::{ExpertiseRecord, OverallLevelRecord};
use crate::tier::Tier;

/// Rebuild an owner's overall level from all of their expertise records
/// and a fresh set of shared metrics. Nothing from the previous overall
/// record is carried over except its version.
pub fn derive_overall(
    owner: &str,
    records: &[ExpertiseRecord],
    metrics: SharedMetrics,
    curve: &dyn LevelCurve,
    now: i64,
    previous_version: i64,
) -> OverallLevelRecord {
    let total_experience_points: f64 = records.iter().map(|r| r.experience_points.max(0.0)).sum();
    let overall_level = curve.level_for(total_experience_points);

    OverallLevelRecord {
        owner: owner.to_string(),
        overall_level,
        overall_tier: Tier::from_level(overall_level),
        total_experience_points,
        habit_continuity_power: metrics.continuity_power,
        resilience_score: metrics.resilience_score,
        last_calculated_at: now,
        version: previous_version,
    }
}

/// Inputs recorded alongside overall, continuity and resilience history
/// entries.
pub fn overall_snapshot(
    record: &OverallLevelRecord,
    domain_count: usize,
    window: &BehaviorWindow,
) -> Value {
    json!({
        "total_experience_points": record.total_experience_points,
        "domain_count": domain_count,
        "continuity_components": window.continuity_components(),
        "resilience_components": window.resilience_components(),
    })
}
