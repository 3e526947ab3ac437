//! Bayesian Knowledge Tracing belief updates.
//!
//! Pure functions over [`MasteryBelief`]; the estimator never touches
//! storage. Callers persist the returned belief.

use chrono::{DateTime, Utc};

use crate::config::BktParams;
use crate::error::EngineError;
use crate::types::{MasteryBelief, MasteryLevel};

/// Canonical threshold at which a concept counts as truly mastered. Drives
/// level derivation, review-schedule creation and the celebrate transition.
pub const MASTERY_THRESHOLD: f64 = 0.95;

/// Lower "good enough to unlock" gate, used for boss challenges and the
/// diagnostic's provisional-mastery cutoff. Deliberately distinct from
/// [`MASTERY_THRESHOLD`]; the two are not interchangeable.
pub const CHALLENGE_UNLOCK_THRESHOLD: f64 = 0.85;

/// Two-stage BKT update: evidence posterior, then the learning-opportunity
/// bump `p' + (1 - p') * pTransit`, clamped to [0, 1].
pub fn update(
    prior: &MasteryBelief,
    correct: bool,
    params: &BktParams,
    now: DateTime<Utc>,
) -> Result<MasteryBelief, EngineError> {
    params.validate()?;

    let p = prior.probability;
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(EngineError::MalformedInput {
            field: "probability",
            value: p,
        });
    }

    let posterior = if correct {
        let evidence = p * (1.0 - params.p_slip);
        let denom = evidence + (1.0 - p) * params.p_guess;
        if denom > 0.0 {
            evidence / denom
        } else {
            // Degenerate parameters make the observation uninformative.
            p
        }
    } else {
        let evidence = p * params.p_slip;
        let denom = evidence + (1.0 - p) * (1.0 - params.p_guess);
        if denom > 0.0 {
            evidence / denom
        } else {
            p
        }
    };

    let next = (posterior + (1.0 - posterior) * params.p_transit).clamp(0.0, 1.0);

    Ok(MasteryBelief {
        probability: next,
        practice_count: prior.practice_count + 1,
        correct_count: prior.correct_count + i32::from(correct),
        level: MasteryLevel::from_probability(next),
        last_updated_at: now,
    })
}

/// True when this update crossed the canonical mastered threshold.
pub fn newly_mastered(prior: &MasteryBelief, updated: &MasteryBelief) -> bool {
    prior.probability < MASTERY_THRESHOLD && updated.probability >= MASTERY_THRESHOLD
}

/// True once the belief clears the boss-challenge gate.
pub fn challenge_unlocked(belief: &MasteryBelief) -> bool {
    belief.probability >= CHALLENGE_UNLOCK_THRESHOLD
}
