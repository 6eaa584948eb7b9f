use rusqlite::Connection;

use hl_core::constants::EPSILON;
use hl_core::overall::overall_snapshot;
use hl_core::{
    BehaviorWindow, ChangeType, ExpertiseSort, LevelCurve, NewHistoryEntry, OverallLevelRecord,
    derive_overall,
};

use crate::error::Result;
use crate::history::LevelHistoryLedger;
use crate::store::Store;

/// Rebuild the owner's overall record from scratch and log each value that
/// moved. Continuity and resilience come only from the latest behavior
/// window; the stored scores are overwritten, never blended.
pub fn recompute_overall(
    store: &Store,
    conn: &Connection,
    owner: &str,
    curve: &dyn LevelCurve,
    reason: &str,
    now: i64,
) -> Result<OverallLevelRecord> {
    let records = store.list_expertise_on(conn, owner, ExpertiseSort::Level, None)?;
    let window = store
        .get_behavior_window_on(conn, owner)?
        .unwrap_or_default();
    let previous = store
        .get_overall_on(conn, owner)?
        .unwrap_or_else(|| OverallLevelRecord::empty(owner));

    let derived = derive_overall(
        owner,
        &records,
        window.shared_metrics(),
        curve,
        now,
        previous.version,
    );
    let saved = store.save_overall_on(conn, &derived)?;

    let snapshot = overall_snapshot(&saved, records.len(), &window);
    let changes = [
        (
            ChangeType::Overall,
            previous.overall_level as f64,
            saved.overall_level as f64,
        ),
        (
            ChangeType::Continuity,
            previous.habit_continuity_power,
            saved.habit_continuity_power,
        ),
        (
            ChangeType::Resilience,
            previous.resilience_score,
            saved.resilience_score,
        ),
    ];
    for (change_type, old, new) in changes {
        if (new - old).abs() <= EPSILON {
            continue;
        }
        LevelHistoryLedger::record(
            conn,
            &NewHistoryEntry {
                owner: owner.to_string(),
                change_type,
                domain_code: None,
                old_level: old,
                new_level: new,
                change_reason: reason.to_string(),
                metrics_snapshot: snapshot.clone(),
            },
            now,
        )?;
    }

    tracing::debug!(
        owner,
        level = saved.overall_level,
        total = saved.total_experience_points,
        continuity = saved.habit_continuity_power,
        resilience = saved.resilience_score,
        "overall recomputed"
    );
    Ok(saved)
}

/// Log out-of-range window inputs. They are clamped downstream either way.
pub fn warn_window_anomalies(owner: &str, window: &BehaviorWindow) {
    for field in window.anomalies() {
        tracing::warn!(owner, field, "behavior window value out of range, clamping");
    }
}
