//! Inactivity decay of expertise levels.
//!
//! After a grace period without activity, each further full week removes a
//! fixed fraction of the level, compounded. The decayed level is always
//! derived from the level held at the last activity and the whole inactivity
//! span, rounded once. A record's current level only caps the result, so a
//! daily pass, a weekly pass and a single late pass all land on the same
//! level.

use serde::{Deserialize, Serialize};

use crate::constants::{DAYS_PER_WEEK, MAX_LEVEL};
use crate::time::whole_days_between;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayPolicy {
    pub grace_period_days: i64,
    /// Fraction of the level removed per week past the grace period.
    pub weekly_decay_rate: f64,
}

impl Default for DecayPolicy {
    fn default() -> Self {
        Self {
            grace_period_days: 14,
            weekly_decay_rate: 0.05,
        }
    }
}

/// Outcome of one decay evaluation for a single record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecayStep {
    pub days_since_activity: i64,
    pub weeks_over_grace: i64,
    /// Level the decay is computed from.
    pub base_level: u8,
    pub old_level: u8,
    pub new_level: u8,
}

impl DecayStep {
    pub fn level_dropped(&self) -> bool {
        self.new_level < self.old_level
    }
}

impl DecayPolicy {
    fn rate(&self) -> f64 {
        if self.weekly_decay_rate.is_finite() {
            self.weekly_decay_rate.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Full weeks past the grace period for a given inactivity span.
    pub fn weeks_over_grace(&self, days_since_activity: i64) -> i64 {
        if days_since_activity <= self.grace_period_days {
            return 0;
        }
        (days_since_activity - self.grace_period_days) / DAYS_PER_WEEK
    }

    /// `level * (1 - rate)^weeks`, rounded, floored at 0.
    pub fn decayed_level(&self, level: u8, weeks: i64) -> u8 {
        if weeks <= 0 {
            return level;
        }
        let factor = (1.0 - self.rate()).powi(weeks.min(i32::MAX as i64) as i32);
        (level as f64 * factor).round().clamp(0.0, MAX_LEVEL as f64) as u8
    }

    /// Evaluate decay at `now` for a record that held `base_level` when last
    /// active and holds `current_level` now. The result never exceeds the
    /// current level.
    pub fn step(
        &self,
        base_level: u8,
        current_level: u8,
        last_activity_at: i64,
        now: i64,
    ) -> DecayStep {
        let days_since_activity = whole_days_between(last_activity_at, now);
        let weeks_over_grace = self.weeks_over_grace(days_since_activity);
        DecayStep {
            days_since_activity,
            weeks_over_grace,
            base_level,
            old_level: current_level,
            new_level: self
                .decayed_level(base_level, weeks_over_grace)
                .min(current_level),
        }
    }
}
