//! Per-domain expertise ledger.
//!
//! Every write goes through the store's versioned save, so a concurrent
//! award, decay step or suggestion acceptance on the same (owner, domain)
//! surfaces as `Conflict` instead of overwriting the other change.

use rusqlite::Connection;

use hl_core::{ActivityKind, DecayStep, ExpertiseRecord, LevelCurve, MAX_LEVEL, Tier};

use crate::error::Result;
use crate::store::Store;

/// State of one record before and after a ledger write.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerUpdate {
    pub before: ExpertiseRecord,
    pub after: ExpertiseRecord,
}

impl LedgerUpdate {
    pub fn level_changed(&self) -> bool {
        self.before.expertise_level != self.after.expertise_level
    }
}

pub struct ExpertiseLedger<'a> {
    store: &'a Store,
    curve: &'a dyn LevelCurve,
}

impl<'a> ExpertiseLedger<'a> {
    pub fn new(store: &'a Store, curve: &'a dyn LevelCurve) -> Self {
        Self { store, curve }
    }

    fn load_or_create(
        &self,
        conn: &Connection,
        owner: &str,
        domain_code: &str,
        domain_name: &str,
        now: i64,
    ) -> Result<ExpertiseRecord> {
        Ok(self
            .store
            .get_expertise_on(conn, owner, domain_code)?
            .unwrap_or_else(|| ExpertiseRecord::new(owner, domain_code, domain_name, now)))
    }

    /// Add `points_delta` to the record for (owner, domain), creating it on
    /// first award. The domain code is taken literally; an empty string is
    /// its own domain.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &self,
        conn: &Connection,
        owner: &str,
        domain_code: &str,
        domain_name: &str,
        points_delta: f64,
        kind: ActivityKind,
        now: i64,
    ) -> Result<LedgerUpdate> {
        let before = self.load_or_create(conn, owner, domain_code, domain_name, now)?;
        let mut next = before.clone();

        let delta = if points_delta.is_finite() { points_delta } else { 0.0 };
        next.experience_points = (next.experience_points + delta).max(0.0);
        next.expertise_level = self.curve.level_for(next.experience_points);
        next.expertise_tier = Tier::from_level(next.expertise_level);
        match kind {
            ActivityKind::Habit => next.habit_count = next.habit_count.saturating_add(1),
            ActivityKind::Task => next.task_count = next.task_count.saturating_add(1),
        }
        next.last_activity_at = now;
        next.level_at_last_activity = next.expertise_level;
        if before.is_new() {
            next.domain_name = domain_name.to_string();
        }

        let after = self.store.save_expertise_on(conn, &next)?;
        tracing::debug!(
            owner,
            domain = domain_code,
            points = after.experience_points,
            level = after.expertise_level,
            created = before.is_new(),
            "expertise applied"
        );
        Ok(LedgerUpdate { before, after })
    }

    /// Move a record to an explicit level, adjusting its points so the curve
    /// still maps them to that level. The new level becomes the decay base;
    /// activity timestamps are left alone.
    pub fn set_level(
        &self,
        conn: &Connection,
        owner: &str,
        domain_code: &str,
        domain_name: &str,
        level: u8,
        now: i64,
    ) -> Result<LedgerUpdate> {
        let before = self.load_or_create(conn, owner, domain_code, domain_name, now)?;
        let level = level.min(MAX_LEVEL);
        if !before.is_new() && before.expertise_level == level {
            return Ok(LedgerUpdate {
                after: before.clone(),
                before,
            });
        }

        let mut next = before.clone();
        next.expertise_level = level;
        next.expertise_tier = Tier::from_level(level);
        next.experience_points = self.points_for_level(next.experience_points, level);
        next.level_at_last_activity = level;

        let after = self.store.save_expertise_on(conn, &next)?;
        Ok(LedgerUpdate { before, after })
    }

    /// Write the result of a decay step. The level never rises here and the
    /// points are trimmed to the new level's threshold. The decay base is
    /// kept so later steps start from the same level.
    pub fn apply_decay(
        &self,
        conn: &Connection,
        record: &ExpertiseRecord,
        step: &DecayStep,
        now: i64,
    ) -> Result<LedgerUpdate> {
        let mut next = record.clone();
        let level = step.new_level.min(record.expertise_level);
        next.expertise_level = level;
        next.expertise_tier = Tier::from_level(level);
        next.experience_points = self.points_for_level(record.experience_points, level);
        next.last_decay_applied_at = Some(now);

        let after = self.store.save_expertise_on(conn, &next)?;
        Ok(LedgerUpdate {
            before: record.clone(),
            after,
        })
    }

    fn points_for_level(&self, points: f64, level: u8) -> f64 {
        if self.curve.level_for(points) == level {
            points
        } else {
            self.curve.min_points_for(level)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hl_core::SquareRootCurve;

    fn setup() -> (Store, SquareRootCurve) {
        (Store::open_in_memory().unwrap(), SquareRootCurve::new(100.0))
    }

    #[test]
    fn test_lazy_create_and_level() {
        let (store, curve) = setup();
        let ledger = ExpertiseLedger::new(&store, &curve);
        let update = ledger
            .apply(store.conn(), "u1", "000", "General", 520.0, ActivityKind::Habit, 1000)
            .unwrap();

        assert!(update.before.is_new());
        assert_eq!(update.before.expertise_level, 0);
        assert_eq!(update.after.experience_points, 520.0);
        assert_eq!(update.after.expertise_level, 2);
        assert_eq!(update.after.habit_count, 1);
        assert_eq!(update.after.task_count, 0);
        assert_eq!(update.after.last_activity_at, 1000);
        assert!(update.level_changed());
    }

    #[test]
    fn test_accumulates_and_counts_tasks() {
        let (store, curve) = setup();
        let ledger = ExpertiseLedger::new(&store, &curve);
        let conn = store.conn();
        ledger.apply(conn, "u1", "A", "A", 50.0, ActivityKind::Habit, 1).unwrap();
        let update = ledger.apply(conn, "u1", "A", "A", 30.0, ActivityKind::Task, 2).unwrap();

        assert_eq!(update.before.experience_points, 50.0);
        assert_eq!(update.after.experience_points, 80.0);
        assert_eq!(update.after.task_count, 1);
        assert_eq!(update.after.habit_count, 1);
        assert!(!update.level_changed());
    }

    #[test]
    fn test_empty_domain_code_is_literal() {
        let (store, curve) = setup();
        let ledger = ExpertiseLedger::new(&store, &curve);
        ledger.apply(store.conn(), "u1", "", "", 10.0, ActivityKind::Habit, 1).unwrap();
        assert!(store.get_expertise_on(store.conn(), "u1", "").unwrap().is_some());
        assert!(store.get_expertise_on(store.conn(), "u1", "000").unwrap().is_none());
    }

    #[test]
    fn test_set_level_aligns_points() {
        let (store, curve) = setup();
        let ledger = ExpertiseLedger::new(&store, &curve);
        let conn = store.conn();
        ledger.apply(conn, "u1", "A", "A", 520.0, ActivityKind::Habit, 1).unwrap();

        let up = ledger.set_level(conn, "u1", "A", "A", 10, 2).unwrap();
        assert_eq!(up.after.expertise_level, 10);
        assert_eq!(up.after.experience_points, 10_000.0);
        assert_eq!(curve.level_for(up.after.experience_points), 10);
        assert_eq!(up.after.last_activity_at, 1);
        assert_eq!(up.after.level_at_last_activity, 10);

        let same = ledger.set_level(conn, "u1", "A", "A", 10, 3).unwrap();
        assert!(!same.level_changed());
        assert_eq!(same.after.version, up.after.version);
    }

    #[test]
    fn test_apply_decay_never_raises() {
        let (store, curve) = setup();
        let ledger = ExpertiseLedger::new(&store, &curve);
        let conn = store.conn();
        let update = ledger.apply(conn, "u1", "A", "A", 10_000.0, ActivityKind::Habit, 0).unwrap();

        assert_eq!(update.after.level_at_last_activity, 10);

        let step = DecayStep {
            days_since_activity: 28,
            weeks_over_grace: 2,
            base_level: 10,
            old_level: 10,
            new_level: 9,
        };
        let decayed = ledger.apply_decay(conn, &update.after, &step, 28 * 86_400).unwrap();
        assert_eq!(decayed.after.expertise_level, 9);
        assert_eq!(decayed.after.level_at_last_activity, 10);
        assert_eq!(decayed.after.experience_points, 8_100.0);
        assert_eq!(decayed.after.last_decay_applied_at, Some(28 * 86_400));
        assert_eq!(decayed.after.last_activity_at, 0);
    }

    #[test]
    fn test_stale_record_conflicts() {
        let (store, curve) = setup();
        let ledger = ExpertiseLedger::new(&store, &curve);
        let conn = store.conn();
        let first = ledger.apply(conn, "u1", "A", "A", 10_000.0, ActivityKind::Habit, 0).unwrap();
        ledger.apply(conn, "u1", "A", "A", 10.0, ActivityKind::Habit, 1).unwrap();

        let step = DecayStep {
            days_since_activity: 21,
            weeks_over_grace: 1,
            base_level: 10,
            old_level: 10,
            new_level: 9,
        };
        let err = ledger.apply_decay(conn, &first.after, &step, 2).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }
}
