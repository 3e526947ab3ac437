//! Collaborator boundary: storage, curriculum, content generation, emotion
//! signals and the clock are all injected traits. The engine never reaches
//! for ambient state, which keeps scheduling and TTL logic deterministic
//! under test.

pub mod memory;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::EngineError;
use crate::scheduler::ReviewSchedule;
use crate::session::SessionState;
use crate::types::{Concept, EmotionalSignal, MasteryBelief, Question};

pub use memory::{
    FixedClock, InMemoryMasteryStore, InMemoryScheduleStore, InMemorySessionStore,
    ScriptedEmotions, StaticCurriculum, TemplateQuestions,
};

/// Injected time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Keyed mastery-belief storage. The store guarantees atomic per-key
/// read-modify-write; a concurrent writer surfaces as
/// [`EngineError::StorageConflict`].
pub trait MasteryStore: Send + Sync {
    fn get(&self, learner_id: &str, concept_code: &str)
        -> Result<Option<MasteryBelief>, EngineError>;
    fn put(
        &self,
        learner_id: &str,
        concept_code: &str,
        belief: MasteryBelief,
    ) -> Result<(), EngineError>;
}

pub trait ScheduleStore: Send + Sync {
    fn get(&self, learner_id: &str, concept_code: &str)
        -> Result<Option<ReviewSchedule>, EngineError>;
    fn put(
        &self,
        learner_id: &str,
        concept_code: &str,
        schedule: ReviewSchedule,
    ) -> Result<(), EngineError>;
    fn list(&self, learner_id: &str) -> Result<Vec<ReviewSchedule>, EngineError>;
}

/// TTL-aware store for live sessions; expired entries read as absent.
pub trait SessionStore: Send + Sync {
    fn get(&self, session_id: Uuid) -> Result<Option<SessionState>, EngineError>;
    fn put(&self, session: SessionState, ttl: Duration) -> Result<(), EngineError>;
    fn delete(&self, session_id: Uuid) -> Result<(), EngineError>;
}

/// Read-only view of the seeded concept graph.
pub trait Curriculum: Send + Sync {
    fn concept(&self, code: &str) -> Result<Concept, EngineError>;
    fn concepts(&self) -> Vec<Concept>;
    fn concepts_by_grade(&self, grade_band: f64) -> Vec<Concept>;
    fn prerequisites(&self, code: &str) -> Result<Vec<String>, EngineError>;
}

/// Content-generation collaborator. The engine only ever reads
/// `correct_option_id` off the returned question.
pub trait QuestionSource: Send + Sync {
    fn generate(&self, concept: &Concept, difficulty_target: f64)
        -> Result<Question, EngineError>;
}

/// Emotion collaborator; purely an input to the transition policy.
pub trait EmotionalSignalSource: Send + Sync {
    fn current(&self, learner_id: &str) -> Option<EmotionalSignal>;
}

/// Read-modify-write on a mastery belief with a single retry on conflict.
///
/// The update closure is pure given the prior, so re-reading and reapplying
/// is safe. A second conflict propagates to the caller.
pub fn update_belief_with_retry<F>(
    store: &dyn MasteryStore,
    learner_id: &str,
    concept_code: &str,
    fresh: impl Fn() -> MasteryBelief,
    apply: F,
) -> Result<MasteryBelief, EngineError>
where
    F: Fn(&MasteryBelief) -> Result<MasteryBelief, EngineError>,
{
    let prior = store
        .get(learner_id, concept_code)?
        .unwrap_or_else(&fresh);
    let updated = apply(&prior)?;

    match store.put(learner_id, concept_code, updated.clone()) {
        Ok(()) => Ok(updated),
        Err(EngineError::StorageConflict { .. }) => {
            tracing::warn!(
                learner = learner_id,
                concept = concept_code,
                "storage conflict, re-reading and reapplying once"
            );
            let prior = store
                .get(learner_id, concept_code)?
                .unwrap_or_else(&fresh);
            let updated = apply(&prior)?;
            store.put(learner_id, concept_code, updated.clone())?;
            Ok(updated)
        }
        Err(err) => Err(err),
    }
}
