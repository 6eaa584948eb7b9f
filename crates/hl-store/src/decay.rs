//! Inactivity decay over stored expertise.
//!
//! The batch pass walks every (owner, domain) key with one short write
//! transaction per key. A key whose record changed underneath the pass is
//! skipped and counted; the next pass picks it up again. Shared metrics are
//! never read or written here beyond the overall rebuild, which takes them
//! from the stored behavior window unchanged.

use std::collections::BTreeSet;

use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;

use hl_core::{ChangeType, DecayPolicy, ExpertiseSort, LevelCurve, NewHistoryEntry};

use crate::error::{ErrorKind, Result};
use crate::history::LevelHistoryLedger;
use crate::ledger::ExpertiseLedger;
use crate::overall::recompute_overall;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DecayReport {
    pub examined: usize,
    /// Records whose level dropped.
    pub decayed: usize,
    pub unchanged: usize,
    /// Keys skipped because a concurrent writer got there first.
    pub conflicts: usize,
    pub owners_recomputed: usize,
}

pub struct DecayEngine<'a> {
    store: &'a Store,
    policy: DecayPolicy,
    expertise_curve: &'a dyn LevelCurve,
    overall_curve: &'a dyn LevelCurve,
}

impl<'a> DecayEngine<'a> {
    pub fn new(
        store: &'a Store,
        policy: DecayPolicy,
        expertise_curve: &'a dyn LevelCurve,
        overall_curve: &'a dyn LevelCurve,
    ) -> Self {
        Self {
            store,
            policy,
            expertise_curve,
            overall_curve,
        }
    }

    /// Decay one record inside the caller's transaction. Returns whether
    /// its level dropped. Nothing is written when the level would not change.
    pub fn decay_record(
        &self,
        conn: &Connection,
        owner: &str,
        domain_code: &str,
        now: i64,
    ) -> Result<bool> {
        let Some(record) = self.store.get_expertise_on(conn, owner, domain_code)? else {
            return Ok(false);
        };
        let step = self.policy.step(
            record.level_at_last_activity,
            record.expertise_level,
            record.last_activity_at,
            now,
        );
        if !step.level_dropped() {
            return Ok(false);
        }

        let ledger = ExpertiseLedger::new(self.store, self.expertise_curve);
        let update = ledger.apply_decay(conn, &record, &step, now)?;
        if !update.level_changed() {
            return Ok(false);
        }

        LevelHistoryLedger::record(
            conn,
            &NewHistoryEntry {
                owner: owner.to_string(),
                change_type: ChangeType::Expertise,
                domain_code: Some(domain_code.to_string()),
                old_level: step.old_level as f64,
                new_level: update.after.expertise_level as f64,
                change_reason: format!(
                    "decay: {} days inactive, {} week(s) past the {}-day grace period",
                    step.days_since_activity, step.weeks_over_grace, self.policy.grace_period_days
                ),
                metrics_snapshot: json!({
                    "days_since_activity": step.days_since_activity,
                    "weeks_over_grace": step.weeks_over_grace,
                    "base_level": step.base_level,
                    "weekly_decay_rate": self.policy.weekly_decay_rate,
                    "grace_period_days": self.policy.grace_period_days,
                    "experience_points_before": update.before.experience_points,
                    "experience_points_after": update.after.experience_points,
                }),
            },
            now,
        )?;
        tracing::info!(
            owner,
            domain = domain_code,
            from = step.old_level,
            to = update.after.expertise_level,
            weeks = step.weeks_over_grace,
            "expertise decayed"
        );
        Ok(true)
    }

    /// Decay every record of one owner inside the caller's transaction and
    /// rebuild the overall record if any level dropped. Used for lazy decay
    /// on read.
    pub fn decay_owner(&self, conn: &Connection, owner: &str, now: i64) -> Result<usize> {
        let records = self
            .store
            .list_expertise_on(conn, owner, ExpertiseSort::Level, None)?;
        let mut dropped = 0;
        for record in &records {
            if self.decay_record(conn, owner, &record.domain_code, now)? {
                dropped += 1;
            }
        }
        if dropped > 0 {
            recompute_overall(self.store, conn, owner, self.overall_curve, "decay", now)?;
        }
        Ok(dropped)
    }

    /// Scheduled pass over every stored record.
    pub fn run_pass(&self, now: i64) -> Result<DecayReport> {
        let keys = self.store.expertise_keys_on(self.store.conn())?;
        let mut report = DecayReport::default();
        let mut touched_owners = BTreeSet::new();

        for (owner, domain_code) in &keys {
            report.examined += 1;
            let tx = self.store.begin_write()?;
            match self.decay_record(&tx, owner, domain_code, now) {
                Ok(dropped) => {
                    tx.commit()?;
                    if dropped {
                        report.decayed += 1;
                        touched_owners.insert(owner.clone());
                    } else {
                        report.unchanged += 1;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Conflict => {
                    tracing::warn!(owner, domain = domain_code, error = %e, "decay skipped on conflict");
                    report.conflicts += 1;
                }
                Err(e) => return Err(e),
            }
        }

        for owner in &touched_owners {
            let tx = self.store.begin_write()?;
            match recompute_overall(self.store, &tx, owner, self.overall_curve, "decay", now) {
                Ok(_) => {
                    tx.commit()?;
                    report.owners_recomputed += 1;
                }
                Err(e) if e.kind() == ErrorKind::Conflict => {
                    tracing::warn!(owner, error = %e, "overall rebuild skipped on conflict");
                    report.conflicts += 1;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!(
            examined = report.examined,
            decayed = report.decayed,
            conflicts = report.conflicts,
            "decay pass complete"
        );
        Ok(report)
    }
}
