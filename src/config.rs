use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Bayesian Knowledge Tracing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BktParams {
    /// Initial mastery probability before any evidence.
    pub p_init: f64,
    /// Probability of acquiring mastery on a single practice opportunity.
    pub p_transit: f64,
    /// Probability a mastered learner answers incorrectly.
    pub p_slip: f64,
    /// Probability a non-mastered learner answers correctly by chance.
    pub p_guess: f64,
}

impl Default for BktParams {
    fn default() -> Self {
        Self {
            p_init: 0.30,
            p_transit: 0.10,
            p_slip: 0.10,
            p_guess: 0.25,
        }
    }
}

impl BktParams {
    /// Rejects NaN and out-of-range parameters instead of clamping; a bad
    /// parameter indicates an upstream data-integrity bug.
    pub fn validate(&self) -> Result<(), EngineError> {
        for (field, value) in [
            ("pInit", self.p_init),
            ("pTransit", self.p_transit),
            ("pSlip", self.p_slip),
            ("pGuess", self.p_guess),
        ] {
            if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                return Err(EngineError::MalformedInput { field, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticConfig {
    /// Hard cap on administered questions per diagnostic.
    pub question_budget: usize,
    /// Minimum administered questions for a confident result.
    pub min_questions: usize,
    /// Recent-answer window used for the convergence confidence.
    pub confidence_window: usize,
    /// Stop early once convergence confidence reaches this value.
    pub early_stop_confidence: f64,
    /// Confidence cap when fewer than `min_questions` were administered.
    pub sparse_confidence_cap: f64,
    /// Session-scoped belief considered provisionally mastered.
    pub provisional_mastery_threshold: f64,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        Self {
            question_budget: 20,
            min_questions: 3,
            confidence_window: 5,
            early_stop_confidence: 0.85,
            sparse_confidence_cap: 0.4,
            provisional_mastery_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerConfig {
    pub min_easiness: f64,
    pub max_easiness: f64,
    /// Added to easiness after a correct review.
    pub easiness_bonus: f64,
    /// Subtracted from easiness after a failed review.
    pub easiness_penalty: f64,
    /// Days past due before an item counts as overdue.
    pub grace_period_days: i64,
    /// Fixed per-item review cost for workload estimates.
    pub minutes_per_item: i64,
    /// Review notifications go stale this many days after creation.
    pub notification_ttl_days: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            min_easiness: 1.3,
            max_easiness: 2.5,
            easiness_bonus: 0.1,
            easiness_penalty: 0.2,
            grace_period_days: 1,
            minutes_per_item: 2,
            notification_ttl_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// Consecutive misses at one concept before routing to STRUGGLING.
    pub struggle_threshold: i32,
    /// Minimum signal confidence before an emotion counts at all.
    pub emotion_confidence_threshold: f64,
    /// Consecutive negative signals before an emotional check.
    pub emotion_debounce: i32,
    /// Live sessions expire from the session store after this long.
    pub session_ttl_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            struggle_threshold: 3,
            emotion_confidence_threshold: 0.6,
            emotion_debounce: 2,
            session_ttl_minutes: 120,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    pub bkt: BktParams,
    pub diagnostic: DiagnosticConfig,
    pub scheduler: SchedulerConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("TUTOR_QUESTION_BUDGET") {
            if let Ok(parsed) = val.parse() {
                config.diagnostic.question_budget = parsed;
            }
        }
        if let Ok(val) = std::env::var("TUTOR_EARLY_STOP_CONFIDENCE") {
            if let Ok(parsed) = val.parse() {
                config.diagnostic.early_stop_confidence = parsed;
            }
        }
        if let Ok(val) = std::env::var("TUTOR_STRUGGLE_THRESHOLD") {
            if let Ok(parsed) = val.parse() {
                config.session.struggle_threshold = parsed;
            }
        }
        if let Ok(val) = std::env::var("TUTOR_SESSION_TTL_MINUTES") {
            if let Ok(parsed) = val.parse() {
                config.session.session_ttl_minutes = parsed;
            }
        }

        config
    }
}
