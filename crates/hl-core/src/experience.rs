//! Experience awarded for a single completion.
//!
//! `points = difficulty * 10 + min(streak * 2, 50)`, where an unassessed
//! habit counts as difficulty 50. Malformed inputs are clamped rather than
//! rejected so one bad event can never stall a recomputation pass; use
//! [`input_anomalies`] to find out what was clamped.

use crate::constants::{DEFAULT_DIFFICULTY, STREAK_BONUS_CAP, STREAK_BONUS_PER_DAY, XP_PER_DIFFICULTY};

/// Difficulty used for the award: the assessed value, or the default when
/// unassessed or non-finite. Negative difficulty clamps to 0.
pub fn effective_difficulty(difficulty: Option<f64>) -> f64 {
    match difficulty {
        Some(d) if d.is_finite() => d.max(0.0),
        _ => DEFAULT_DIFFICULTY,
    }
}

/// Streak bonus, saturating at a 25-day streak.
pub fn streak_bonus(streak_days: f64) -> f64 {
    if !streak_days.is_finite() || streak_days <= 0.0 {
        return 0.0;
    }
    (streak_days * STREAK_BONUS_PER_DAY).min(STREAK_BONUS_CAP)
}

/// Experience points for one completion.
pub fn compute_experience_points(difficulty: Option<f64>, streak_days: f64) -> u64 {
    let base = effective_difficulty(difficulty) * XP_PER_DIFFICULTY;
    (base + streak_bonus(streak_days)).round() as u64
}

/// Describe every input that [`compute_experience_points`] had to clamp or
/// default. Empty for well-formed inputs.
pub fn input_anomalies(difficulty: Option<f64>, streak_days: f64) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(d) = difficulty {
        if !d.is_finite() {
            out.push(format!("non-finite difficulty {d}, using default"));
        } else if d < 0.0 {
            out.push(format!("negative difficulty {d}, clamped to 0"));
        } else if d.fract() != 0.0 {
            out.push(format!("fractional difficulty {d}"));
        }
    }
    if !streak_days.is_finite() {
        out.push(format!("non-finite streak {streak_days}, treated as 0"));
    } else if streak_days < 0.0 {
        out.push(format!("negative streak {streak_days}, clamped to 0"));
    } else if streak_days.fract() != 0.0 {
        out.push(format!("fractional streak {streak_days}"));
    }
    out
}
