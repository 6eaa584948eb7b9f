//! Habit progression scoring engine.
//!
//! Turns habit completions into per-domain expertise, an overall level and
//! two behavioral scores (continuity power and resilience). Decay, level
//! curves and suggestion detection live here as pure functions.
//!
//! Zero I/O. Persistence and orchestration live in `hl-store`.

pub mod config;
pub mod constants;
pub mod curve;
pub mod decay;
pub mod distribution;
pub mod domain;
pub mod experience;
pub mod metrics;
pub mod model;
pub mod overall;
pub mod suggestion;
pub mod tier;
pub mod time;
pub mod validation;

pub use config::EngineConfig;
pub use constants::{
    GENERAL_DOMAIN_CODE, GENERAL_DOMAIN_NAME, MAX_DOMAIN_CODES, MAX_LEVEL,
};
pub use curve::{LevelCurve, SquareRootCurve};
pub use decay::{DecayPolicy, DecayStep};
pub use distribution::{DomainShare, distribute};
pub use domain::DomainCatalog;
pub use experience::{compute_experience_points, input_anomalies};
pub use metrics::{
    BehaviorWindow, ContinuityComponents, ResilienceComponents, SharedMetrics, continuity_power,
    resilience_score,
};
pub use model::{
    ActivityKind, ChangeType, CompletionEvent, ExpertiseRecord, ExpertiseSort, HabitProfile,
    HistoryFilter, LevelHistoryEntry, LevelSuggestion, NewHistoryEntry, OverallLevelRecord,
    SuggestionStatus, SuggestionType,
};
pub use overall::derive_overall;
pub use suggestion::{DetectionPolicy, SuggestionDraft};
pub use tier::Tier;
pub use time::{Clock, FixedClock, SystemClock, now_unix_secs, parse_iso8601, unix_to_iso8601};
pub use validation::ValidationError;
