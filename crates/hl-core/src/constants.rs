/// Highest expertise or overall level.
pub const MAX_LEVEL: u8 = 199;

/// Difficulty assumed for habits that have not been assessed yet.
pub const DEFAULT_DIFFICULTY: f64 = 50.0;

/// Base experience per point of difficulty.
pub const XP_PER_DIFFICULTY: f64 = 10.0;

/// Streak bonus per consecutive day.
pub const STREAK_BONUS_PER_DAY: f64 = 2.0;

/// Streak bonus ceiling. Reached at a 25-day streak.
pub const STREAK_BONUS_CAP: f64 = 50.0;

/// Domain code of the unclassified sentinel domain.
pub const GENERAL_DOMAIN_CODE: &str = "000";

/// Display name of the unclassified sentinel domain.
pub const GENERAL_DOMAIN_NAME: &str = "General (Unclassified)";

/// A habit may declare at most this many domain codes.
pub const MAX_DOMAIN_CODES: usize = 3;

/// Domain detail views carry at most this many history entries.
pub const DOMAIN_DETAIL_HISTORY_LIMIT: usize = 10;

/// Lower bound of every shared metric component and score.
pub const METRIC_MIN: f64 = 0.0;

/// Upper bound of every shared metric component and score.
pub const METRIC_MAX: f64 = 100.0;

pub const SECS_PER_DAY: i64 = 86_400;

pub const DAYS_PER_WEEK: i64 = 7;

/// Numerical epsilon for near-zero comparisons
pub const EPSILON: f64 = 1e-9;
