//! Mapping from cumulative experience to a level.
//!
//! The exact shape is pluggable. Any curve must be deterministic, bounded
//! to [0, MAX_LEVEL], and never return a lower level for more points.

use serde::{Deserialize, Serialize};

use crate::constants::MAX_LEVEL;

pub trait LevelCurve {
    /// Level reached with `points` cumulative experience.
    fn level_for(&self, points: f64) -> u8;

    /// Smallest point total that reaches `level`.
    fn min_points_for(&self, level: u8) -> f64;
}

/// `level = floor(sqrt(points / points_per_level_sq))`, capped at MAX_LEVEL.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SquareRootCurve {
    pub points_per_level_sq: f64,
}

impl SquareRootCurve {
    pub fn new(points_per_level_sq: f64) -> Self {
        let points_per_level_sq = if points_per_level_sq.is_finite() && points_per_level_sq > 0.0 {
            points_per_level_sq
        } else {
            1.0
        };
        Self { points_per_level_sq }
    }
}

impl LevelCurve for SquareRootCurve {
    fn level_for(&self, points: f64) -> u8 {
        if !(points > 0.0) {
            return 0;
        }
        let estimate = (points / self.points_per_level_sq).sqrt().floor();
        let mut level = estimate.min(MAX_LEVEL as f64) as u8;

        // Snap to the exact threshold so level_for(min_points_for(l)) == l
        // regardless of float rounding in the estimate.
        while level < MAX_LEVEL && self.min_points_for(level + 1) <= points {
            level += 1;
        }
        while level > 0 && self.min_points_for(level) > points {
            level -= 1;
        }
        level
    }

    fn min_points_for(&self, level: u8) -> f64 {
        let level = level.min(MAX_LEVEL) as f64;
        level * level * self.points_per_level_sq
    }
}
