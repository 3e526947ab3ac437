//! In-memory collaborator implementations.
//!
//! These back tests and single-process deployments. The mastery and
//! schedule stores serialize writers behind a lock and support injected
//! write conflicts to exercise the retry path.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::EngineError;
use crate::scheduler::ReviewSchedule;
use crate::session::SessionState;
use crate::store::{
    Clock, Curriculum, EmotionalSignalSource, MasteryStore, QuestionSource, ScheduleStore,
    SessionStore,
};
use crate::types::{Concept, EmotionalSignal, MasteryBelief, Question, QuestionOption};

/// Deterministic clock for tests; advances only when told to.
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.write() += by;
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

#[derive(Default)]
pub struct InMemoryMasteryStore {
    records: RwLock<HashMap<(String, String), MasteryBelief>>,
    pending_conflicts: Mutex<u32>,
}

impl InMemoryMasteryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` puts fail with a storage conflict.
    pub fn inject_conflicts(&self, count: u32) {
        *self.pending_conflicts.lock() = count;
    }

    fn take_conflict(&self, learner_id: &str, key: &str) -> Result<(), EngineError> {
        let mut pending = self.pending_conflicts.lock();
        if *pending > 0 {
            *pending -= 1;
            return Err(EngineError::StorageConflict {
                learner: learner_id.to_string(),
                key: key.to_string(),
            });
        }
        Ok(())
    }
}

impl MasteryStore for InMemoryMasteryStore {
    fn get(
        &self,
        learner_id: &str,
        concept_code: &str,
    ) -> Result<Option<MasteryBelief>, EngineError> {
        Ok(self
            .records
            .read()
            .get(&(learner_id.to_string(), concept_code.to_string()))
            .cloned())
    }

    fn put(
        &self,
        learner_id: &str,
        concept_code: &str,
        belief: MasteryBelief,
    ) -> Result<(), EngineError> {
        self.take_conflict(learner_id, concept_code)?;
        self.records
            .write()
            .insert((learner_id.to_string(), concept_code.to_string()), belief);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryScheduleStore {
    records: RwLock<HashMap<(String, String), ReviewSchedule>>,
}

impl InMemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ScheduleStore for InMemoryScheduleStore {
    fn get(
        &self,
        learner_id: &str,
        concept_code: &str,
    ) -> Result<Option<ReviewSchedule>, EngineError> {
        Ok(self
            .records
            .read()
            .get(&(learner_id.to_string(), concept_code.to_string()))
            .cloned())
    }

    fn put(
        &self,
        learner_id: &str,
        concept_code: &str,
        schedule: ReviewSchedule,
    ) -> Result<(), EngineError> {
        self.records
            .write()
            .insert((learner_id.to_string(), concept_code.to_string()), schedule);
        Ok(())
    }

    fn list(&self, learner_id: &str) -> Result<Vec<ReviewSchedule>, EngineError> {
        let mut schedules: Vec<_> = self
            .records
            .read()
            .iter()
            .filter(|((learner, _), _)| learner == learner_id)
            .map(|(_, schedule)| schedule.clone())
            .collect();
        schedules.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then_with(|| a.concept_code.cmp(&b.concept_code))
        });
        Ok(schedules)
    }
}

struct SessionEntry {
    session: SessionState,
    expires_at: DateTime<Utc>,
}

/// TTL-aware session store; reads consult the injected clock so expired
/// sessions are simply absent.
pub struct InMemorySessionStore<C: Clock> {
    entries: RwLock<HashMap<Uuid, SessionEntry>>,
    clock: std::sync::Arc<C>,
}

impl<C: Clock> InMemorySessionStore<C> {
    pub fn new(clock: std::sync::Arc<C>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

impl<C: Clock> SessionStore for InMemorySessionStore<C> {
    fn get(&self, session_id: Uuid) -> Result<Option<SessionState>, EngineError> {
        let now = self.clock.now();
        Ok(self
            .entries
            .read()
            .get(&session_id)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.session.clone()))
    }

    fn put(&self, session: SessionState, ttl: Duration) -> Result<(), EngineError> {
        let expires_at = self.clock.now() + ttl;
        self.entries.write().insert(
            session.id,
            SessionEntry {
                session,
                expires_at,
            },
        );
        Ok(())
    }

    fn delete(&self, session_id: Uuid) -> Result<(), EngineError> {
        self.entries.write().remove(&session_id);
        Ok(())
    }
}

/// Curriculum backed by a fixed concept list.
pub struct StaticCurriculum {
    concepts: Vec<Concept>,
}

impl StaticCurriculum {
    pub fn new(mut concepts: Vec<Concept>) -> Self {
        concepts.sort_by(|a, b| {
            a.difficulty
                .partial_cmp(&b.difficulty)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.code.cmp(&b.code))
        });
        Self { concepts }
    }
}

impl Curriculum for StaticCurriculum {
    fn concept(&self, code: &str) -> Result<Concept, EngineError> {
        self.concepts
            .iter()
            .find(|c| c.code == code)
            .cloned()
            .ok_or_else(|| EngineError::ConceptNotFound(code.to_string()))
    }

    fn concepts(&self) -> Vec<Concept> {
        self.concepts.clone()
    }

    fn concepts_by_grade(&self, grade_band: f64) -> Vec<Concept> {
        self.concepts
            .iter()
            .filter(|c| (c.grade_band - grade_band).abs() < 0.5)
            .cloned()
            .collect()
    }

    fn prerequisites(&self, code: &str) -> Result<Vec<String>, EngineError> {
        Ok(self.concept(code)?.prerequisites)
    }
}

/// Canned four-option questions; stands in for the LLM-backed generator.
#[derive(Default)]
pub struct TemplateQuestions;

impl QuestionSource for TemplateQuestions {
    fn generate(
        &self,
        concept: &Concept,
        difficulty_target: f64,
    ) -> Result<Question, EngineError> {
        let options = ["a", "b", "c", "d"]
            .iter()
            .map(|id| QuestionOption {
                id: (*id).to_string(),
                text: format!("option {id} for {}", concept.code),
            })
            .collect();
        Ok(Question {
            text: format!(
                "{} practice item (target {:.2})",
                concept.title, difficulty_target
            ),
            options,
            correct_option_id: "a".to_string(),
            explanation: format!("worked example for {}", concept.code),
        })
    }
}

/// Replays a scripted list of emotion signals, then goes quiet.
#[derive(Default)]
pub struct ScriptedEmotions {
    signals: Mutex<Vec<EmotionalSignal>>,
}

impl ScriptedEmotions {
    pub fn new(mut signals: Vec<EmotionalSignal>) -> Self {
        signals.reverse();
        Self {
            signals: Mutex::new(signals),
        }
    }
}

impl EmotionalSignalSource for ScriptedEmotions {
    fn current(&self, _learner_id: &str) -> Option<EmotionalSignal> {
        self.signals.lock().pop()
    }
}
