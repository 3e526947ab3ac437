//! Property-based tests for the estimator and scheduler invariants:
//! - belief probability stays in [0, 1] under any valid update sequence
//! - correct streaks never decrease the belief with default parameters
//! - the derived level always matches the threshold table
//! - a failed review resets the schedule regardless of history
//! - overdue items dominate the urgency signal

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use tutor_core::config::{BktParams, SchedulerConfig};
use tutor_core::mastery;
use tutor_core::scheduler::{self, ReviewSchedule};
use tutor_core::types::{MasteryBelief, MasteryLevel, Urgency};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

fn arb_probability() -> impl Strategy<Value = f64> {
    (0u64..=10_000u64).prop_map(|v| v as f64 / 10_000.0)
}

fn arb_params() -> impl Strategy<Value = BktParams> {
    (
        arb_probability(),
        arb_probability(),
        arb_probability(),
        arb_probability(),
    )
        .prop_map(|(p_init, p_transit, p_slip, p_guess)| BktParams {
            p_init,
            p_transit,
            p_slip,
            p_guess,
        })
}

fn belief(probability: f64) -> MasteryBelief {
    MasteryBelief {
        probability,
        practice_count: 0,
        correct_count: 0,
        level: MasteryLevel::from_probability(probability),
        last_updated_at: now(),
    }
}

proptest! {
    #[test]
    fn prop_probability_stays_bounded(
        prior in arb_probability(),
        params in arb_params(),
        answers in proptest::collection::vec(any::<bool>(), 1..40),
    ) {
        let mut current = belief(prior);
        for answer in answers {
            current = mastery::update(&current, answer, &params, now()).unwrap();
            prop_assert!((0.0..=1.0).contains(&current.probability));
            prop_assert!(current.probability.is_finite());
        }
    }

    #[test]
    fn prop_correct_streak_is_monotone_with_defaults(
        prior in arb_probability(),
        streak in 1usize..30,
    ) {
        let params = BktParams::default();
        let mut current = belief(prior);
        let mut previous = current.probability;
        for _ in 0..streak {
            current = mastery::update(&current, true, &params, now()).unwrap();
            prop_assert!(current.probability >= previous);
            previous = current.probability;
        }
    }

    #[test]
    fn prop_level_always_matches_probability(
        prior in arb_probability(),
        answers in proptest::collection::vec(any::<bool>(), 1..20),
    ) {
        let params = BktParams::default();
        let mut current = belief(prior);
        for answer in answers {
            current = mastery::update(&current, answer, &params, now()).unwrap();
            prop_assert_eq!(current.level, MasteryLevel::from_probability(current.probability));
        }
    }

    #[test]
    fn prop_counters_track_answers(
        answers in proptest::collection::vec(any::<bool>(), 1..30),
    ) {
        let params = BktParams::default();
        let mut current = belief(params.p_init);
        for answer in &answers {
            current = mastery::update(&current, *answer, &params, now()).unwrap();
        }
        prop_assert_eq!(current.practice_count as usize, answers.len());
        prop_assert_eq!(
            current.correct_count as usize,
            answers.iter().filter(|a| **a).count()
        );
    }

    #[test]
    fn prop_failed_review_always_resets(
        history in proptest::collection::vec(any::<bool>(), 0..12),
    ) {
        let config = SchedulerConfig::default();
        let mut schedule = ReviewSchedule::new("C1", now());
        for answer in history {
            schedule = scheduler::review(&schedule, answer, now(), &config).unwrap();
        }

        let reset = scheduler::review(&schedule, false, now(), &config).unwrap();
        prop_assert_eq!(reset.review_count, 0);
        prop_assert_eq!(reset.interval_days, 1.0);
        prop_assert_eq!(reset.due_at, now() + Duration::days(1));
        prop_assert!(reset.easiness_factor >= config.min_easiness);
    }

    #[test]
    fn prop_successful_reviews_never_shrink_intervals(
        rounds in 1usize..10,
    ) {
        let config = SchedulerConfig::default();
        let mut schedule = ReviewSchedule::new("C1", now());
        let mut previous = schedule.interval_days;
        for _ in 0..rounds {
            schedule = scheduler::review(&schedule, true, now(), &config).unwrap();
            prop_assert!(schedule.interval_days >= previous);
            previous = schedule.interval_days;
        }
    }

    #[test]
    fn prop_any_overdue_item_dominates(
        due_count in 0usize..20,
        overdue_days in 2i64..30,
    ) {
        let config = SchedulerConfig::default();
        let mut schedules = vec![ReviewSchedule {
            concept_code: "OVER".into(),
            due_at: now() - Duration::days(overdue_days),
            interval_days: 1.0,
            easiness_factor: 2.5,
            review_count: 1,
        }];
        for i in 0..due_count {
            schedules.push(ReviewSchedule {
                concept_code: format!("D{i}"),
                due_at: now() - Duration::hours(1),
                interval_days: 1.0,
                easiness_factor: 2.5,
                review_count: 1,
            });
        }

        let summary = scheduler::summarize(&schedules, now(), &config);
        prop_assert_eq!(summary.urgency, Urgency::High);
        prop_assert_eq!(summary.overdue_count, 1);
        prop_assert_eq!(summary.due_now, due_count + 1);
    }
}
