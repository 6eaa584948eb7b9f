//! Request-scoped façade over the store and the ledgers.
//!
//! An `Engine` is built per request or per batch job from a store, a config
//! and a clock. It holds no state of its own. Each write operation reads the
//! clock once and runs in a single IMMEDIATE transaction, so the history
//! entries it writes commit or roll back together with the change.

use serde::Serialize;
use uuid::Uuid;

use hl_core::constants::DOMAIN_DETAIL_HISTORY_LIMIT;
use hl_core::validation::validate_domain_codes;
use hl_core::{
    BehaviorWindow, ChangeType, Clock, CompletionEvent, DomainShare, EngineConfig,
    ExpertiseRecord, ExpertiseSort, HabitProfile, HistoryFilter, LevelHistoryEntry,
    LevelSuggestion, MAX_LEVEL, NewHistoryEntry, OverallLevelRecord, SquareRootCurve,
    SuggestionStatus, ValidationError, compute_experience_points, distribute, input_anomalies,
};

use crate::decay::{DecayEngine, DecayReport};
use crate::error::{Result, StoreError};
use crate::history::LevelHistoryLedger;
use crate::ledger::ExpertiseLedger;
use crate::overall::{recompute_overall, warn_window_anomalies};
use crate::store::Store;
use crate::suggestion::SuggestionWorkflow;

/// Everything one completion changed.
#[derive(Debug, Clone, Serialize)]
pub struct AwardOutcome {
    pub points: u64,
    pub shares: Vec<DomainShare>,
    pub expertise: Vec<ExpertiseRecord>,
    pub overall: OverallLevelRecord,
    pub history_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainDetail {
    pub expertise: ExpertiseRecord,
    pub recent_history: Vec<LevelHistoryEntry>,
}

pub struct Engine<'a> {
    store: &'a Store,
    config: &'a EngineConfig,
    clock: &'a dyn Clock,
    expertise_curve: SquareRootCurve,
    overall_curve: SquareRootCurve,
}

impl<'a> Engine<'a> {
    pub fn new(store: &'a Store, config: &'a EngineConfig, clock: &'a dyn Clock) -> Self {
        Self {
            store,
            config,
            clock,
            expertise_curve: config.curve.expertise_curve(),
            overall_curve: config.curve.overall_curve(),
        }
    }

    fn decay_engine(&self) -> DecayEngine<'_> {
        DecayEngine::new(
            self.store,
            self.config.decay.policy(),
            &self.expertise_curve,
            &self.overall_curve,
        )
    }

    fn workflow(&self) -> SuggestionWorkflow<'_> {
        SuggestionWorkflow::new(
            self.store,
            self.config.suggestions.policy(),
            &self.config.domains,
            &self.expertise_curve,
            &self.overall_curve,
        )
    }

    fn validate_codes(&self, codes: &[String]) -> Result<()> {
        validate_domain_codes(
            codes,
            &self.config.domains,
            self.config.validation.strict_domains,
        )?;
        Ok(())
    }

    // --- Writes ---

    /// Award one completion: points, per-domain shares, ledger writes,
    /// history for every level that moved, and an overall rebuild.
    pub fn award_completion(&self, event: &CompletionEvent) -> Result<AwardOutcome> {
        if let Some(codes) = &event.domain_codes {
            self.validate_codes(codes)?;
        }
        for anomaly in input_anomalies(event.difficulty_level, event.streak_days) {
            tracing::warn!(owner = %event.owner, habit = %event.habit_id, "{anomaly}");
        }

        let now = self.clock.now();
        let points = compute_experience_points(event.difficulty_level, event.streak_days);
        let shares = distribute(points, event.domain_codes.as_deref(), &self.config.domains);

        let tx = self.store.begin_write()?;
        let ledger = ExpertiseLedger::new(self.store, &self.expertise_curve);
        let mut expertise = Vec::with_capacity(shares.len());
        let mut history_ids = Vec::new();

        for share in &shares {
            let update = ledger.apply(
                &tx,
                &event.owner,
                &share.domain_code,
                &share.domain_name,
                share.points as f64,
                event.kind,
                now,
            )?;
            if update.level_changed() {
                let id = LevelHistoryLedger::record(
                    &tx,
                    &NewHistoryEntry {
                        owner: event.owner.clone(),
                        change_type: ChangeType::Expertise,
                        domain_code: Some(share.domain_code.clone()),
                        old_level: update.before.expertise_level as f64,
                        new_level: update.after.expertise_level as f64,
                        change_reason: format!("{} completion of {}", event.kind, event.habit_id),
                        metrics_snapshot: serde_json::json!({
                            "habit_id": event.habit_id,
                            "difficulty_level": event.difficulty_level,
                            "streak_days": event.streak_days,
                            "awarded_points": points,
                            "share_points": share.points,
                            "proportion": share.proportion,
                            "experience_points": update.after.experience_points,
                        }),
                    },
                    now,
                )?;
                history_ids.push(id);
            }
            expertise.push(update.after);
        }

        let overall = recompute_overall(
            self.store,
            &tx,
            &event.owner,
            &self.overall_curve,
            "completion",
            now,
        )?;
        tx.commit()?;

        tracing::info!(
            owner = %event.owner,
            habit = %event.habit_id,
            points,
            domains = shares.len(),
            "completion awarded"
        );
        Ok(AwardOutcome {
            points,
            shares,
            expertise,
            overall,
            history_ids,
        })
    }

    /// Store the owner's latest behavior window and rebuild their scores.
    pub fn record_behavior(&self, owner: &str, window: &BehaviorWindow) -> Result<OverallLevelRecord> {
        warn_window_anomalies(owner, window);
        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        self.store.save_behavior_window_on(&tx, owner, window, now)?;
        let overall = recompute_overall(
            self.store,
            &tx,
            owner,
            &self.overall_curve,
            "behavior window",
            now,
        )?;
        tx.commit()?;
        Ok(overall)
    }

    /// Register or replace a habit's workload configuration.
    pub fn upsert_habit(&self, habit: &HabitProfile) -> Result<HabitProfile> {
        self.validate_codes(&habit.domain_codes)?;
        let mut habit = habit.clone();
        if let Some(d) = habit.difficulty_level
            && d > MAX_LEVEL
        {
            tracing::warn!(habit = %habit.habit_id, difficulty = d, "difficulty above max level, clamping");
            habit.difficulty_level = Some(MAX_LEVEL);
        }
        if !habit.completion_rate_30d.is_finite() || !(0.0..=100.0).contains(&habit.completion_rate_30d) {
            tracing::warn!(
                habit = %habit.habit_id,
                rate = habit.completion_rate_30d,
                "completion rate out of range, clamping"
            );
            habit.completion_rate_30d = if habit.completion_rate_30d.is_finite() {
                habit.completion_rate_30d.clamp(0.0, 100.0)
            } else {
                0.0
            };
        }

        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        self.store.upsert_habit_on(&tx, &habit, now)?;
        tx.commit()?;
        Ok(habit)
    }

    pub fn detect_suggestions(&self, owner: &str) -> Result<Vec<LevelSuggestion>> {
        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        let created = self.workflow().detect(&tx, owner, now)?;
        tx.commit()?;
        Ok(created)
    }

    pub fn accept_suggestion(&self, id: Uuid) -> Result<LevelSuggestion> {
        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        let accepted = self.workflow().accept(&tx, id, now)?;
        tx.commit()?;
        Ok(accepted)
    }

    pub fn dismiss_suggestion(&self, id: Uuid) -> Result<LevelSuggestion> {
        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        let dismissed = self.workflow().dismiss(&tx, id, now)?;
        tx.commit()?;
        Ok(dismissed)
    }

    pub fn run_decay_pass(&self) -> Result<DecayReport> {
        self.decay_engine().run_pass(self.clock.now())
    }

    // --- Reads ---

    /// Run lazy decay for `owner` first when the config asks for it.
    fn decay_on_read(&self, owner: &str) -> Result<()> {
        if !self.config.decay.apply_on_read {
            return Ok(());
        }
        let now = self.clock.now();
        let tx = self.store.begin_write()?;
        let dropped = self.decay_engine().decay_owner(&tx, owner, now)?;
        tx.commit()?;
        if dropped > 0 {
            tracing::debug!(owner, dropped, "lazy decay applied");
        }
        Ok(())
    }

    pub fn overall_level(&self, owner: &str) -> Result<OverallLevelRecord> {
        self.decay_on_read(owner)?;
        self.store
            .get_overall_on(self.store.conn(), owner)?
            .ok_or_else(|| StoreError::NotFound(format!("overall level for {owner:?}")))
    }

    pub fn list_expertise(
        &self,
        owner: &str,
        sort: ExpertiseSort,
        limit: Option<usize>,
    ) -> Result<Vec<ExpertiseRecord>> {
        hl_core::validation::validate_limit(limit)?;
        let conn = self.store.conn();
        self.store.require_owner_on(conn, owner)?;
        self.decay_on_read(owner)?;
        self.store.list_expertise_on(conn, owner, sort, limit)
    }

    /// One domain's record plus its most recent history entries.
    pub fn domain_detail(&self, owner: &str, domain_code: &str) -> Result<DomainDetail> {
        self.decay_on_read(owner)?;
        let conn = self.store.conn();
        let expertise = self
            .store
            .get_expertise_on(conn, owner, domain_code)?
            .ok_or_else(|| StoreError::NotFound(format!("domain {domain_code:?} for {owner:?}")))?;
        let recent_history = LevelHistoryLedger::query(
            conn,
            owner,
            &HistoryFilter {
                domain_code: Some(domain_code.to_string()),
                limit: Some(DOMAIN_DETAIL_HISTORY_LIMIT),
                ..Default::default()
            },
        )?;
        Ok(DomainDetail {
            expertise,
            recent_history,
        })
    }

    pub fn history(&self, owner: &str, filter: &HistoryFilter) -> Result<Vec<LevelHistoryEntry>> {
        filter.validate()?;
        let conn = self.store.conn();
        self.store.require_owner_on(conn, owner)?;
        LevelHistoryLedger::query(conn, owner, filter)
    }

    pub fn list_suggestions(
        &self,
        owner: &str,
        status: Option<SuggestionStatus>,
    ) -> Result<Vec<LevelSuggestion>> {
        self.workflow().list(self.store.conn(), owner, status)
    }

    pub fn list_habits(&self, owner: &str) -> Result<Vec<HabitProfile>> {
        self.store.list_habits_on(self.store.conn(), owner)
    }
}

/// Parse an optional limit from user input. Zero is rejected.
pub fn parse_limit(raw: Option<&str>) -> std::result::Result<Option<usize>, ValidationError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let limit = raw.parse::<usize>().map_err(|_| ValidationError::UnknownVariant {
        field: "limit",
        value: raw.to_string(),
    })?;
    hl_core::validation::validate_limit(Some(limit))?;
    Ok(Some(limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hl_core::{ActivityKind, FixedClock};

    fn event(owner: &str, codes: Option<Vec<&str>>) -> CompletionEvent {
        CompletionEvent {
            owner: owner.into(),
            habit_id: "h1".into(),
            domain_codes: codes.map(|c| c.into_iter().map(String::from).collect()),
            difficulty_level: Some(50.0),
            streak_days: 10.0,
            kind: ActivityKind::Habit,
        }
    }

    #[test]
    fn test_award_general_domain() {
        let store = Store::open_in_memory().unwrap();
        let config = EngineConfig::default();
        let clock = FixedClock(1_000);
        let engine = Engine::new(&store, &config, &clock);

        let outcome = engine.award_completion(&event("u1", None)).unwrap();
        assert_eq!(outcome.points, 520);
        assert_eq!(outcome.shares.len(), 1);
        assert_eq!(outcome.expertise[0].domain_code, "000");
        assert_eq!(outcome.expertise[0].domain_name, "General (Unclassified)");
        assert_eq!(outcome.overall.total_experience_points, 520.0);
        assert_eq!(outcome.history_ids.len(), 1);
        assert_eq!(outcome.overall.last_calculated_at, 1_000);
    }

    #[test]
    fn test_too_many_codes_rejected_before_writes() {
        let store = Store::open_in_memory().unwrap();
        let config = EngineConfig::default();
        let clock = FixedClock(0);
        let engine = Engine::new(&store, &config, &clock);

        let err = engine
            .award_completion(&event("u1", Some(vec!["A", "B", "C", "D"])))
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(!store.owner_exists_on(store.conn(), "u1").unwrap());
    }

    #[test]
    fn test_strict_domains() {
        let store = Store::open_in_memory().unwrap();
        let mut config = EngineConfig::default();
        config.validation.strict_domains = true;
        config.domains.insert("A-01-001", "Fitness");
        let clock = FixedClock(0);
        let engine = Engine::new(&store, &config, &clock);

        assert!(engine.award_completion(&event("u1", Some(vec!["A-01-001"]))).is_ok());
        let err = engine
            .award_completion(&event("u1", Some(vec!["Z-99-999"])))
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Validation(ValidationError::UnknownDomainCode(_))
        ));
    }

    #[test]
    fn test_reads_for_unknown_owner() {
        let store = Store::open_in_memory().unwrap();
        let config = EngineConfig::default();
        let clock = FixedClock(0);
        let engine = Engine::new(&store, &config, &clock);

        assert!(matches!(engine.overall_level("ghost"), Err(StoreError::NotFound(_))));
        assert!(matches!(
            engine.list_expertise("ghost", ExpertiseSort::Level, None),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            engine.history("ghost", &HistoryFilter::default()),
            Err(StoreError::NotFound(_))
        ));
        assert!(matches!(
            engine.domain_detail("ghost", "000"),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_domain_detail_history_capped() {
        let store = Store::open_in_memory().unwrap();
        let config = EngineConfig::default();
        let clock = FixedClock(0);
        let engine = Engine::new(&store, &config, &clock);

        // Twelve 1990-point awards move domain A through more than ten levels.
        let mut heavy = event("u1", Some(vec!["A"]));
        heavy.difficulty_level = Some(199.0);
        heavy.streak_days = 0.0;
        for _ in 0..12 {
            engine.award_completion(&heavy).unwrap();
        }
        let detail = engine.domain_detail("u1", "A").unwrap();
        assert_eq!(detail.recent_history.len(), DOMAIN_DETAIL_HISTORY_LIMIT);
        assert!(detail.recent_history.iter().all(|e| e.domain_code.as_deref() == Some("A")));
    }

    #[test]
    fn test_lazy_decay_on_read() {
        let store = Store::open_in_memory().unwrap();
        let mut config = EngineConfig::default();
        let mut heavy = event("u1", Some(vec!["A"]));
        heavy.difficulty_level = Some(1000.0);
        Engine::new(&store, &config, &FixedClock(0))
            .award_completion(&heavy)
            .unwrap();

        let later = FixedClock(28 * 86_400);
        let before = Engine::new(&store, &config, &later)
            .list_expertise("u1", ExpertiseSort::Level, None)
            .unwrap();
        assert_eq!(before[0].expertise_level, 10);

        config.decay.apply_on_read = true;
        let after = Engine::new(&store, &config, &later)
            .list_expertise("u1", ExpertiseSort::Level, None)
            .unwrap();
        assert_eq!(after[0].expertise_level, 9);
    }

    #[test]
    fn test_upsert_habit_clamps() {
        let store = Store::open_in_memory().unwrap();
        let config = EngineConfig::default();
        let clock = FixedClock(0);
        let engine = Engine::new(&store, &config, &clock);
        let habit = HabitProfile {
            owner: "u1".into(),
            habit_id: "h1".into(),
            name: "Swim".into(),
            domain_codes: vec![],
            difficulty_level: Some(250),
            sessions_per_week: 3,
            minutes_per_session: 45,
            completion_rate_30d: 140.0,
        };
        let saved = engine.upsert_habit(&habit).unwrap();
        assert_eq!(saved.difficulty_level, Some(199));
        assert_eq!(saved.completion_rate_30d, 100.0);
        assert_eq!(engine.list_habits("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_parse_limit() {
        assert_eq!(parse_limit(None).unwrap(), None);
        assert_eq!(parse_limit(Some("")).unwrap(), None);
        assert_eq!(parse_limit(Some("5")).unwrap(), Some(5));
        assert_eq!(parse_limit(Some("0")), Err(ValidationError::ZeroLimit));
        assert!(parse_limit(Some("many")).is_err());
    }
}
