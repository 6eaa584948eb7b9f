//! Property tests for the pure scoring functions: experience awards,
//! domain distribution, shared metrics, level curve and decay.

use approx::assert_abs_diff_eq;
use hl_core::metrics::{
    WEIGHT_ACTIVE_RATIO, WEIGHT_BOUNCE_BACK, WEIGHT_COMPLETION, WEIGHT_RECOVERY, WEIGHT_STREAK,
    WEIGHT_STREAK_RECOVERY,
};
use hl_core::{
    ContinuityComponents, DecayPolicy, DomainCatalog, LevelCurve, MAX_LEVEL, ResilienceComponents,
    SquareRootCurve, Tier, compute_experience_points, continuity_power, distribute,
    resilience_score,
};
use proptest::prelude::*;

const TOLERANCE: f64 = 1e-9;

fn component() -> impl Strategy<Value = f64> {
    0.0f64..=100.0
}

fn domain_code() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        "[A-Z]-[0-9]{2}-[0-9]{3}",
        "[a-z ]{1,8}",
    ]
}

proptest! {
    #[test]
    fn experience_base_and_bonus(d in 1u32..=199, s in 0u32..=400) {
        let d = d as f64;
        let s_f = s as f64;
        prop_assert_eq!(compute_experience_points(Some(d), 0.0), (d * 10.0) as u64);
        let bonus = compute_experience_points(Some(d), s_f) - compute_experience_points(Some(d), 0.0);
        prop_assert_eq!(bonus, (2 * s).min(50) as u64);
        prop_assert_eq!(compute_experience_points(None, s_f), compute_experience_points(Some(50.0), s_f));
        prop_assert!(compute_experience_points(Some(d), s_f) > 0);
    }

    #[test]
    fn experience_monotonic(d in 1u32..199, s in 0u32..100) {
        let (d, s) = (d as f64, s as f64);
        let base = compute_experience_points(Some(d), s);
        prop_assert!(compute_experience_points(Some(d + 1.0), s) >= base);
        prop_assert!(compute_experience_points(Some(d), s + 1.0) >= base);
    }

    #[test]
    fn experience_never_panics(d in proptest::num::f64::ANY, s in proptest::num::f64::ANY) {
        let _ = compute_experience_points(Some(d), s);
    }

    #[test]
    fn distribute_general_for_absent_or_empty(p in 0u64..1_000_000) {
        let catalog = DomainCatalog::default();
        let empty: Vec<String> = Vec::new();
        for shares in [distribute(p, None, &catalog), distribute(p, Some(&empty), &catalog)] {
            prop_assert_eq!(shares.len(), 1);
            prop_assert_eq!(shares[0].domain_code.as_str(), "000");
            prop_assert_eq!(shares[0].points, p);
            prop_assert_eq!(shares[0].proportion, 1.0);
        }
    }

    #[test]
    fn distribute_explicit_conserves_and_excludes_general(
        p in 0u64..1_000_000,
        codes in proptest::collection::vec(domain_code(), 1..=3),
    ) {
        let shares = distribute(p, Some(&codes), &DomainCatalog::default());
        prop_assert_eq!(shares.len(), codes.len());
        prop_assert!(shares.iter().all(|s| s.domain_code != "000"));
        prop_assert_eq!(shares.iter().map(|s| s.points).sum::<u64>(), p);
        let proportions: f64 = shares.iter().map(|s| s.proportion).sum();
        prop_assert!((proportions - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn continuity_formula_and_bounds(a in component(), b in component(), c in component()) {
        let combined = continuity_power(&ContinuityComponents {
            weighted_streak_score: a,
            completion_rate_30d: b,
            active_habit_ratio: c,
        });
        let expected = a * WEIGHT_STREAK + b * WEIGHT_COMPLETION + c * WEIGHT_ACTIVE_RATIO;
        assert_abs_diff_eq!(combined, expected, epsilon = TOLERANCE);
        prop_assert!((0.0..=100.0 + TOLERANCE).contains(&combined));

        let isolated = continuity_power(&ContinuityComponents { weighted_streak_score: a, ..Default::default() })
            + continuity_power(&ContinuityComponents { completion_rate_30d: b, ..Default::default() })
            + continuity_power(&ContinuityComponents { active_habit_ratio: c, ..Default::default() });
        assert_abs_diff_eq!(combined, isolated, epsilon = TOLERANCE);
    }

    #[test]
    fn resilience_formula_and_bounds(a in component(), b in component(), c in component()) {
        let combined = resilience_score(&ResilienceComponents {
            recovery_rate: a,
            bounce_back_count: b,
            streak_recovery_ratio: c,
        });
        let expected = a * WEIGHT_RECOVERY + b * WEIGHT_BOUNCE_BACK + c * WEIGHT_STREAK_RECOVERY;
        assert_abs_diff_eq!(combined, expected, epsilon = TOLERANCE);
        prop_assert!((0.0..=100.0 + TOLERANCE).contains(&combined));

        let isolated = resilience_score(&ResilienceComponents { recovery_rate: a, ..Default::default() })
            + resilience_score(&ResilienceComponents { bounce_back_count: b, ..Default::default() })
            + resilience_score(&ResilienceComponents { streak_recovery_ratio: c, ..Default::default() });
        assert_abs_diff_eq!(combined, isolated, epsilon = TOLERANCE);
    }

    #[test]
    fn metrics_monotonic_per_component(
        a in component(), b in component(), c in component(), bump in 0.0f64..=50.0,
    ) {
        let base = ContinuityComponents { weighted_streak_score: a, completion_rate_30d: b, active_habit_ratio: c };
        let before = continuity_power(&base);
        for bumped in [
            ContinuityComponents { weighted_streak_score: (a + bump).min(100.0), ..base },
            ContinuityComponents { completion_rate_30d: (b + bump).min(100.0), ..base },
            ContinuityComponents { active_habit_ratio: (c + bump).min(100.0), ..base },
        ] {
            prop_assert!(continuity_power(&bumped) >= before);
        }

        let base = ResilienceComponents { recovery_rate: a, bounce_back_count: b, streak_recovery_ratio: c };
        let before = resilience_score(&base);
        for bumped in [
            ResilienceComponents { recovery_rate: (a + bump).min(100.0), ..base },
            ResilienceComponents { bounce_back_count: (b + bump).min(100.0), ..base },
            ResilienceComponents { streak_recovery_ratio: (c + bump).min(100.0), ..base },
        ] {
            prop_assert!(resilience_score(&bumped) >= before);
        }
    }

    #[test]
    fn metrics_are_pure(a in component(), b in component(), c in component()) {
        let input = ResilienceComponents { recovery_rate: a, bounce_back_count: b, streak_recovery_ratio: c };
        prop_assert_eq!(resilience_score(&input).to_bits(), resilience_score(&input).to_bits());
        let input = ContinuityComponents { weighted_streak_score: a, completion_rate_30d: b, active_habit_ratio: c };
        prop_assert_eq!(continuity_power(&input).to_bits(), continuity_power(&input).to_bits());
    }

    #[test]
    fn curve_bounded_and_monotonic(p in 0.0f64..1e9, extra in 0.0f64..1e6, k in 1.0f64..1000.0) {
        let curve = SquareRootCurve::new(k);
        let level = curve.level_for(p);
        prop_assert!(level <= MAX_LEVEL);
        prop_assert!(curve.level_for(p + extra) >= level);
        prop_assert_eq!(curve.level_for(p), level);
    }

    #[test]
    fn decay_within_grace_is_identity(level in 0u8..=MAX_LEVEL, days in 0i64..=14) {
        let policy = DecayPolicy::default();
        let step = policy.step(level, level, 0, days * 86_400);
        prop_assert_eq!(step.new_level, level);
    }

    #[test]
    fn decay_never_raises(level in 0u8..=MAX_LEVEL, days in 0i64..2_000, rate in 0.0f64..=1.0) {
        let policy = DecayPolicy { grace_period_days: 14, weekly_decay_rate: rate };
        let step = policy.step(level, level, 0, days * 86_400);
        prop_assert!(step.new_level <= level);
    }

    #[test]
    fn decay_independent_of_pass_frequency(
        level in 0u8..=MAX_LEVEL,
        days in 0i64..400,
        every in 1i64..30,
    ) {
        let policy = DecayPolicy::default();
        let mut current = level;
        let mut day = 0;
        while day < days {
            current = policy.step(level, current, 0, day * 86_400).new_level;
            day += every;
        }
        current = policy.step(level, current, 0, days * 86_400).new_level;
        prop_assert_eq!(current, policy.step(level, level, 0, days * 86_400).new_level);
    }

    #[test]
    fn tier_monotonic(a in 0u8..=MAX_LEVEL, b in 0u8..=MAX_LEVEL) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(Tier::from_level(lo) <= Tier::from_level(hi));
    }
}

#[test]
fn experience_boundaries() {
    assert_eq!(compute_experience_points(Some(1.0), 0.0), 10);
    assert_eq!(compute_experience_points(Some(100.0), 25.0), 1050);
    assert_eq!(compute_experience_points(Some(100.0), 100.0), 1050);
}
