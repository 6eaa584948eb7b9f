//! Shared behavioral metrics: continuity power and resilience score.
//!
//! Both are fixed weighted sums of three components in [0, 100]. They have
//! no memory: every calculation starts from the current window only and
//! fully replaces whatever was stored before. Nothing in this module knows
//! about decay.

use serde::{Deserialize, Serialize};

use crate::constants::{METRIC_MAX, METRIC_MIN};

pub const WEIGHT_STREAK: f64 = 0.4;
pub const WEIGHT_COMPLETION: f64 = 0.3;
pub const WEIGHT_ACTIVE_RATIO: f64 = 0.3;

pub const WEIGHT_RECOVERY: f64 = 0.5;
pub const WEIGHT_BOUNCE_BACK: f64 = 0.3;
pub const WEIGHT_STREAK_RECOVERY: f64 = 0.2;

/// Average streak (days) at which the streak component saturates.
const STREAK_SATURATION_DAYS: f64 = 30.0;

/// Bounce-backs at which the bounce-back component saturates.
const BOUNCE_BACK_SATURATION: f64 = 10.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ContinuityComponents {
    pub weighted_streak_score: f64,
    pub completion_rate_30d: f64,
    pub active_habit_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResilienceComponents {
    pub recovery_rate: f64,
    pub bounce_back_count: f64,
    pub streak_recovery_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedMetrics {
    pub continuity_power: f64,
    pub resilience_score: f64,
}

/// Clamp a component into [0, 100]. NaN counts as 0.
pub fn clamp_component(value: f64) -> f64 {
    if value.is_nan() {
        return METRIC_MIN;
    }
    value.clamp(METRIC_MIN, METRIC_MAX)
}

pub fn continuity_power(c: &ContinuityComponents) -> f64 {
    clamp_component(c.weighted_streak_score) * WEIGHT_STREAK
        + clamp_component(c.completion_rate_30d) * WEIGHT_COMPLETION
        + clamp_component(c.active_habit_ratio) * WEIGHT_ACTIVE_RATIO
}

pub fn resilience_score(c: &ResilienceComponents) -> f64 {
    clamp_component(c.recovery_rate) * WEIGHT_RECOVERY
        + clamp_component(c.bounce_back_count) * WEIGHT_BOUNCE_BACK
        + clamp_component(c.streak_recovery_ratio) * WEIGHT_STREAK_RECOVERY
}

/// Raw behavioral counts for one owner over the current window, as
/// reported by the habit tracker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorWindow {
    /// Mean current streak across active habits, in days.
    pub avg_current_streak_days: f64,
    pub completions_30d: u32,
    pub scheduled_30d: u32,
    pub active_habits: u32,
    pub total_habits: u32,
    /// Streaks broken during the window.
    pub streak_breaks: u32,
    /// Broken streaks that were resumed.
    pub recovered_breaks: u32,
    /// Times the owner returned after a multi-day gap.
    pub bounce_backs: u32,
    /// Days of streak rebuilt after breaks.
    pub recovered_streak_days: f64,
    /// Days of streak lost to breaks.
    pub lost_streak_days: f64,
}

fn percent(numerator: f64, denominator: f64) -> f64 {
    if denominator <= 0.0 || !denominator.is_finite() {
        return 0.0;
    }
    clamp_component(numerator / denominator * 100.0)
}

impl BehaviorWindow {
    fn has_activity(&self) -> bool {
        self.completions_30d > 0
    }

    pub fn continuity_components(&self) -> ContinuityComponents {
        ContinuityComponents {
            weighted_streak_score: percent(
                self.avg_current_streak_days.min(STREAK_SATURATION_DAYS),
                STREAK_SATURATION_DAYS,
            ),
            completion_rate_30d: percent(self.completions_30d as f64, self.scheduled_30d as f64),
            active_habit_ratio: percent(self.active_habits as f64, self.total_habits as f64),
        }
    }

    /// With no breaks in the window, an active owner has nothing to recover
    /// from and scores full marks on the recovery components; an idle owner
    /// scores zero.
    pub fn resilience_components(&self) -> ResilienceComponents {
        let unbroken = if self.has_activity() { METRIC_MAX } else { METRIC_MIN };

        let recovery_rate = if self.streak_breaks == 0 {
            unbroken
        } else {
            percent(self.recovered_breaks as f64, self.streak_breaks as f64)
        };
        let streak_recovery_ratio = if self.lost_streak_days <= 0.0 {
            unbroken
        } else {
            percent(self.recovered_streak_days, self.lost_streak_days)
        };

        ResilienceComponents {
            recovery_rate,
            bounce_back_count: percent(
                (self.bounce_backs as f64).min(BOUNCE_BACK_SATURATION),
                BOUNCE_BACK_SATURATION,
            ),
            streak_recovery_ratio,
        }
    }

    pub fn shared_metrics(&self) -> SharedMetrics {
        SharedMetrics {
            continuity_power: continuity_power(&self.continuity_components()),
            resilience_score: resilience_score(&self.resilience_components()),
        }
    }

    /// Component names that were out of range before clamping.
    pub fn anomalies(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if !self.avg_current_streak_days.is_finite() || self.avg_current_streak_days < 0.0 {
            out.push("avg_current_streak_days");
        }
        if self.completions_30d > self.scheduled_30d && self.scheduled_30d > 0 {
            out.push("completions_30d");
        }
        if self.active_habits > self.total_habits {
            out.push("active_habits");
        }
        if self.recovered_breaks > self.streak_breaks {
            out.push("recovered_breaks");
        }
        if !self.recovered_streak_days.is_finite() || self.recovered_streak_days < 0.0 {
            out.push("recovered_streak_days");
        }
        if !self.lost_streak_days.is_finite() || self.lost_streak_days < 0.0 {
            out.push("lost_streak_days");
        }
        out
    }
}
