//! SM-2 style spaced-repetition scheduling.
//!
//! Pure computation: [`review`] produces the successor schedule, and
//! [`summarize`] folds a learner's schedules into a due/overdue workload
//! signal. Malformed schedules are rejected, never repaired.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::SchedulerConfig;
use crate::error::EngineError;
use crate::types::Urgency;

/// Per (learner, concept) review schedule. Created the first time a belief
/// crosses the mastered threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSchedule {
    pub concept_code: String,
    pub due_at: DateTime<Utc>,
    pub interval_days: f64,
    pub easiness_factor: f64,
    pub review_count: i32,
}

impl ReviewSchedule {
    pub fn new(concept_code: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            concept_code: concept_code.into(),
            due_at: now + Duration::days(1),
            interval_days: 1.0,
            easiness_factor: 2.5,
            review_count: 0,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }

    pub fn is_overdue(&self, now: DateTime<Utc>, grace_period_days: i64) -> bool {
        self.due_at < now - Duration::days(grace_period_days)
    }

    fn validate(&self) -> Result<(), EngineError> {
        for (field, value) in [
            ("intervalDays", self.interval_days),
            ("easinessFactor", self.easiness_factor),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(EngineError::MalformedInput { field, value });
            }
        }
        if self.review_count < 0 {
            return Err(EngineError::MalformedInput {
                field: "reviewCount",
                value: f64::from(self.review_count),
            });
        }
        Ok(())
    }
}

/// Applies one review attempt. A failed review resets the trajectory: the
/// concept needs re-teaching, not just another pass.
pub fn review(
    schedule: &ReviewSchedule,
    correct: bool,
    now: DateTime<Utc>,
    config: &SchedulerConfig,
) -> Result<ReviewSchedule, EngineError> {
    schedule.validate()?;

    let mut next = schedule.clone();
    if correct {
        let easiness = (schedule.easiness_factor + config.easiness_bonus)
            .clamp(config.min_easiness, config.max_easiness);
        let interval = match schedule.review_count {
            0 => 1.0,
            1 => 6.0,
            _ => (schedule.interval_days * easiness).round(),
        };
        next.easiness_factor = easiness;
        next.interval_days = interval;
        next.due_at = now + Duration::days(interval as i64);
        next.review_count = schedule.review_count + 1;
    } else {
        next.easiness_factor =
            (schedule.easiness_factor - config.easiness_penalty).max(config.min_easiness);
        next.interval_days = 1.0;
        next.due_at = now + Duration::days(1);
        next.review_count = 0;
    }
    Ok(next)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub due_now: usize,
    pub overdue_count: usize,
    pub estimated_minutes: i64,
    pub urgency: Urgency,
}

/// Aggregates a learner's schedules into an urgency signal. A single
/// overdue item outranks any number of merely-due items.
pub fn summarize(
    schedules: &[ReviewSchedule],
    now: DateTime<Utc>,
    config: &SchedulerConfig,
) -> ReviewSummary {
    let due_now = schedules.iter().filter(|s| s.is_due(now)).count();
    let overdue_count = schedules
        .iter()
        .filter(|s| s.is_overdue(now, config.grace_period_days))
        .count();

    let urgency = if overdue_count > 0 {
        Urgency::High
    } else if due_now > 0 {
        Urgency::Medium
    } else {
        Urgency::None
    };

    ReviewSummary {
        due_now,
        overdue_count,
        estimated_minutes: due_now as i64 * config.minutes_per_item,
        urgency,
    }
}

/// A notification derived from a review summary. Expires a fixed time after
/// creation whether or not the reviews were completed; stale notifications
/// are suppressed, not re-sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewNotification {
    pub learner_id: String,
    pub summary: ReviewSummary,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReviewNotification {
    /// Returns `None` when there is nothing worth notifying about.
    pub fn from_summary(
        learner_id: impl Into<String>,
        summary: ReviewSummary,
        now: DateTime<Utc>,
        config: &SchedulerConfig,
    ) -> Option<Self> {
        if summary.urgency == Urgency::None {
            return None;
        }
        Some(Self {
            learner_id: learner_id.into(),
            summary,
            created_at: now,
            expires_at: now + Duration::days(config.notification_ttl_days),
        })
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn config() -> SchedulerConfig {
        SchedulerConfig::default()
    }

    #[test]
    fn test_fresh_schedule_due_tomorrow() {
        let schedule = ReviewSchedule::new("C1", now());
        assert_eq!(schedule.due_at, now() + Duration::days(1));
        assert_eq!(schedule.interval_days, 1.0);
        assert_eq!(schedule.easiness_factor, 2.5);
        assert_eq!(schedule.review_count, 0);
    }

    #[test]
    fn test_success_backoff_one_six_then_scaled() {
        let config = config();
        let s0 = ReviewSchedule::new("C1", now());

        let s1 = review(&s0, true, now(), &config).unwrap();
        assert_eq!(s1.interval_days, 1.0);
        assert_eq!(s1.review_count, 1);

        let s2 = review(&s1, true, now(), &config).unwrap();
        assert_eq!(s2.interval_days, 6.0);
        assert_eq!(s2.review_count, 2);

        let s3 = review(&s2, true, now(), &config).unwrap();
        // Easiness is capped at 2.5, so the third interval is round(6 * 2.5).
        assert_eq!(s3.interval_days, 15.0);
        assert_eq!(s3.due_at, now() + Duration::days(15));
    }

    #[test]
    fn test_failure_resets_regardless_of_history() {
        let config = config();
        let mut schedule = ReviewSchedule::new("C1", now());
        for _ in 0..4 {
            schedule = review(&schedule, true, now(), &config).unwrap();
        }
        assert!(schedule.interval_days > 6.0);

        let reset = review(&schedule, false, now(), &config).unwrap();
        assert_eq!(reset.review_count, 0);
        assert_eq!(reset.interval_days, 1.0);
        assert_eq!(reset.due_at, now() + Duration::days(1));
        assert!((reset.easiness_factor - (schedule.easiness_factor - 0.2)).abs() < 1e-12);
    }

    #[test]
    fn test_easiness_floor() {
        let config = config();
        let mut schedule = ReviewSchedule::new("C1", now());
        for _ in 0..10 {
            schedule = review(&schedule, false, now(), &config).unwrap();
        }
        assert_eq!(schedule.easiness_factor, 1.3);
    }

    #[test]
    fn test_rejects_malformed_schedule() {
        let config = config();
        let mut schedule = ReviewSchedule::new("C1", now());
        schedule.interval_days = -2.0;
        assert!(matches!(
            review(&schedule, true, now(), &config),
            Err(EngineError::MalformedInput {
                field: "intervalDays",
                ..
            })
        ));

        let mut schedule = ReviewSchedule::new("C1", now());
        schedule.easiness_factor = f64::NAN;
        assert!(review(&schedule, true, now(), &config).is_err());
    }

    #[test]
    fn test_urgency_dominance() {
        let config = config();

        let overdue = ReviewSchedule {
            concept_code: "C1".into(),
            due_at: now() - Duration::days(3),
            interval_days: 1.0,
            easiness_factor: 2.5,
            review_count: 1,
        };
        let due = |code: &str| ReviewSchedule {
            concept_code: code.into(),
            due_at: now() - Duration::hours(1),
            interval_days: 1.0,
            easiness_factor: 2.5,
            review_count: 1,
        };

        let mut schedules = vec![overdue];
        for i in 0..10 {
            schedules.push(due(&format!("D{i}")));
        }
        let summary = summarize(&schedules, now(), &config);
        assert_eq!(summary.overdue_count, 1);
        assert_eq!(summary.due_now, 11);
        assert_eq!(summary.urgency, Urgency::High);

        let schedules: Vec<_> = (0..3).map(|i| due(&format!("D{i}"))).collect();
        let summary = summarize(&schedules, now(), &config);
        assert_eq!(summary.urgency, Urgency::Medium);
        assert_eq!(summary.estimated_minutes, 6);

        let summary = summarize(&[], now(), &config);
        assert_eq!(summary.urgency, Urgency::None);
        assert_eq!(summary.estimated_minutes, 0);
    }

    #[test]
    fn test_due_within_grace_is_not_overdue() {
        let config = config();
        let schedule = ReviewSchedule {
            concept_code: "C1".into(),
            due_at: now() - Duration::hours(12),
            interval_days: 1.0,
            easiness_factor: 2.5,
            review_count: 1,
        };
        assert!(schedule.is_due(now()));
        assert!(!schedule.is_overdue(now(), config.grace_period_days));
    }

    #[test]
    fn test_notification_expiry() {
        let config = config();
        let summary = ReviewSummary {
            due_now: 2,
            overdue_count: 0,
            estimated_minutes: 4,
            urgency: Urgency::Medium,
        };
        let notification =
            ReviewNotification::from_summary("learner-1", summary, now(), &config).unwrap();
        assert!(!notification.is_expired(now() + Duration::days(6)));
        assert!(notification.is_expired(now() + Duration::days(7)));
    }

    #[test]
    fn test_no_notification_when_nothing_due() {
        let config = config();
        let summary = summarize(&[], now(), &config);
        assert!(ReviewNotification::from_summary("learner-1", summary, now(), &config).is_none());
    }
}
