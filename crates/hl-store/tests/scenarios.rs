//! End-to-end flows through the engine against an in-memory store.

use hl_core::constants::SECS_PER_DAY;
use hl_core::{
    ActivityKind, BehaviorWindow, ChangeType, CompletionEvent, EngineConfig, ExpertiseSort,
    FixedClock, HabitProfile, HistoryFilter, SuggestionStatus,
};
use hl_store::{Engine, ErrorKind, Store, StoreError};

const DAY: i64 = SECS_PER_DAY;

fn completion(owner: &str, codes: Option<&[&str]>) -> CompletionEvent {
    CompletionEvent {
        owner: owner.to_string(),
        habit_id: "meditate".to_string(),
        domain_codes: codes.map(|c| c.iter().map(|s| s.to_string()).collect()),
        difficulty_level: Some(50.0),
        streak_days: 10.0,
        kind: ActivityKind::Habit,
    }
}

fn expertise_history(store: &Store, config: &EngineConfig, owner: &str) -> Vec<hl_core::LevelHistoryEntry> {
    let clock = FixedClock(0);
    Engine::new(store, config, &clock)
        .history(
            owner,
            &HistoryFilter {
                change_type: Some(ChangeType::Expertise),
                ..Default::default()
            },
        )
        .unwrap()
}

#[test]
fn completion_without_domains_lands_in_general() {
    let store = Store::open_in_memory().unwrap();
    let config = EngineConfig::default();
    let clock = FixedClock(10 * DAY);
    let engine = Engine::new(&store, &config, &clock);

    let before = engine.overall_level("u1").map(|o| o.total_experience_points).unwrap_or(0.0);
    engine.award_completion(&completion("u1", Some(&[]))).unwrap();

    let general = engine.domain_detail("u1", "000").unwrap();
    assert_eq!(general.expertise.experience_points, 520.0);
    assert_eq!(general.expertise.domain_name, "General (Unclassified)");

    let overall = engine.overall_level("u1").unwrap();
    assert_eq!(overall.total_experience_points - before, 520.0);

    let history = expertise_history(&store, &config, "u1");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].domain_code.as_deref(), Some("000"));
}

#[test]
fn completion_with_two_domains_splits_evenly() {
    let store = Store::open_in_memory().unwrap();
    let config = EngineConfig::default();
    let clock = FixedClock(0);
    let engine = Engine::new(&store, &config, &clock);

    engine
        .award_completion(&completion("u1", Some(&["A-01-001", "B-02-002"])))
        .unwrap();

    let records = engine.list_expertise("u1", ExpertiseSort::Level, None).unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert_eq!(record.experience_points, 260.0);
    }
    assert!(matches!(
        engine.domain_detail("u1", "000"),
        Err(StoreError::NotFound(_))
    ));
    assert_eq!(engine.overall_level("u1").unwrap().total_experience_points, 520.0);
}

#[test]
fn empty_string_code_is_explicit() {
    let store = Store::open_in_memory().unwrap();
    let config = EngineConfig::default();
    let clock = FixedClock(0);
    let engine = Engine::new(&store, &config, &clock);

    engine.award_completion(&completion("u1", Some(&[""]))).unwrap();
    assert!(engine.domain_detail("u1", "").is_ok());
    assert!(engine.domain_detail("u1", "000").is_err());
}

#[test]
fn decay_leaves_shared_metrics_alone() {
    let store = Store::open_in_memory().unwrap();
    let config = EngineConfig::default();
    let start = FixedClock(0);
    let engine = Engine::new(&store, &config, &start);

    let window = BehaviorWindow {
        avg_current_streak_days: 12.0,
        completions_30d: 20,
        scheduled_30d: 25,
        active_habits: 2,
        total_habits: 3,
        streak_breaks: 4,
        recovered_breaks: 3,
        bounce_backs: 2,
        recovered_streak_days: 5.0,
        lost_streak_days: 10.0,
    };
    let mut heavy = completion("u1", Some(&["A"]));
    heavy.difficulty_level = Some(199.0);
    for _ in 0..5 {
        engine.award_completion(&heavy).unwrap();
    }
    let before = engine.record_behavior("u1", &window).unwrap();

    let later = FixedClock(60 * DAY);
    let engine = Engine::new(&store, &config, &later);
    let report = engine.run_decay_pass().unwrap();
    assert_eq!(report.decayed, 1);

    let after = engine.overall_level("u1").unwrap();
    assert!(after.overall_level <= before.overall_level);
    assert!(after.total_experience_points < before.total_experience_points);
    assert_eq!(after.habit_continuity_power, before.habit_continuity_power);
    assert_eq!(after.resilience_score, before.resilience_score);
    assert_eq!(after.habit_continuity_power, window.shared_metrics().continuity_power);

    let continuity = engine
        .history(
            "u1",
            &HistoryFilter {
                change_type: Some(ChangeType::Continuity),
                from: Some(DAY),
                ..Default::default()
            },
        )
        .unwrap();
    assert!(continuity.is_empty());
}

#[test]
fn suggestion_accept_is_single_shot() {
    let store = Store::open_in_memory().unwrap();
    let config = EngineConfig::default();
    let clock = FixedClock(0);
    let engine = Engine::new(&store, &config, &clock);

    engine
        .upsert_habit(&HabitProfile {
            owner: "u1".into(),
            habit_id: "run".into(),
            name: "Morning run".into(),
            domain_codes: vec!["A-01-001".into()],
            difficulty_level: Some(10),
            sessions_per_week: 6,
            minutes_per_session: 40,
            completion_rate_30d: 90.0,
        })
        .unwrap();

    let created = engine.detect_suggestions("u1").unwrap();
    assert_eq!(created.len(), 1);
    let id = created[0].id;

    engine.accept_suggestion(id).unwrap();
    let err = engine.accept_suggestion(id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    assert_eq!(expertise_history(&store, &config, "u1").len(), 1);
    let accepted = engine
        .list_suggestions("u1", Some(SuggestionStatus::Accepted))
        .unwrap();
    assert_eq!(accepted.len(), 1);
}

#[test]
fn suggestion_dismiss_changes_only_status() {
    let store = Store::open_in_memory().unwrap();
    let config = EngineConfig::default();
    let clock = FixedClock(0);
    let engine = Engine::new(&store, &config, &clock);

    engine
        .upsert_habit(&HabitProfile {
            owner: "u1".into(),
            habit_id: "stretch".into(),
            name: "Stretch".into(),
            domain_codes: vec![],
            difficulty_level: Some(150),
            sessions_per_week: 2,
            minutes_per_session: 10,
            completion_rate_30d: 50.0,
        })
        .unwrap();
    let id = engine.detect_suggestions("u1").unwrap()[0].id;

    engine.dismiss_suggestion(id).unwrap();
    assert!(engine.history("u1", &HistoryFilter::default()).unwrap().is_empty());
    assert!(engine.list_expertise("u1", ExpertiseSort::Level, None).unwrap().is_empty());
    assert_eq!(engine.dismiss_suggestion(id).unwrap_err().kind(), ErrorKind::Conflict);
}

#[test]
fn stale_version_write_conflicts() {
    let store = Store::open_in_memory().unwrap();
    let config = EngineConfig::default();
    let clock = FixedClock(0);
    let engine = Engine::new(&store, &config, &clock);
    engine.award_completion(&completion("u1", None)).unwrap();

    let snapshot = store
        .get_expertise_on(store.conn(), "u1", "000")
        .unwrap()
        .unwrap();
    engine.award_completion(&completion("u1", None)).unwrap();

    let mut stale = snapshot.clone();
    stale.experience_points = 0.0;
    let err = store.save_expertise_on(store.conn(), &stale).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert!(err.is_retryable());

    let current = store
        .get_expertise_on(store.conn(), "u1", "000")
        .unwrap()
        .unwrap();
    assert_eq!(current.experience_points, 1040.0);
}

#[test]
fn history_filters_validate_range() {
    let store = Store::open_in_memory().unwrap();
    let config = EngineConfig::default();
    let clock = FixedClock(0);
    let engine = Engine::new(&store, &config, &clock);
    engine.award_completion(&completion("u1", None)).unwrap();

    let err = engine
        .history(
            "u1",
            &HistoryFilter {
                from: Some(2 * DAY),
                to: Some(DAY),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}
