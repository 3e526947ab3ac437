//! Session orchestration policy.
//!
//! The orchestrator owns no ambient state: live sessions live in an
//! injected TTL-aware session store, beliefs and schedules in their own
//! stores, and every `now` comes from the injected clock. It decides which
//! legal transition to take; legality itself is enforced by
//! [`SessionState::transition`].

use std::sync::Arc;

use chrono::Duration;

use crate::config::EngineConfig;
use crate::diagnostic::PlacementResult;
use crate::error::EngineError;
use crate::mastery;
use crate::scheduler::{self, ReviewSchedule};
use crate::session::phase::{CompletionReason, SessionEvent, SessionPhase, SessionState};
use crate::store::{
    update_belief_with_retry, Clock, Curriculum, EmotionalSignalSource, MasteryStore,
    QuestionSource, ScheduleStore, SessionStore,
};
use crate::types::{MasteryBelief, Question};

/// Outcome of trying to open a boss challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeGate {
    Open,
    /// Belief has not reached the unlock gate yet.
    Locked,
}

pub struct Orchestrator {
    config: EngineConfig,
    mastery: Arc<dyn MasteryStore>,
    schedules: Arc<dyn ScheduleStore>,
    sessions: Arc<dyn SessionStore>,
    curriculum: Arc<dyn Curriculum>,
    questions: Arc<dyn QuestionSource>,
    emotions: Arc<dyn EmotionalSignalSource>,
    clock: Arc<dyn Clock>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: EngineConfig,
        mastery: Arc<dyn MasteryStore>,
        schedules: Arc<dyn ScheduleStore>,
        sessions: Arc<dyn SessionStore>,
        curriculum: Arc<dyn Curriculum>,
        questions: Arc<dyn QuestionSource>,
        emotions: Arc<dyn EmotionalSignalSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            mastery,
            schedules,
            sessions,
            curriculum,
            questions,
            emotions,
            clock,
        }
    }

    fn session_ttl(&self) -> Duration {
        Duration::minutes(self.config.session.session_ttl_minutes)
    }

    fn save(&self, session: &SessionState) -> Result<(), EngineError> {
        self.sessions.put(session.clone(), self.session_ttl())
    }

    /// Opens a live session. Placement output (when present) seeds the
    /// first concept; due reviews take priority over new teaching.
    pub fn start_session(
        &self,
        learner_id: &str,
        placement: Option<&PlacementResult>,
    ) -> Result<SessionState, EngineError> {
        let now = self.clock.now();
        let mut session = SessionState::new(learner_id, now);

        let summary =
            scheduler::summarize(&self.schedules.list(learner_id)?, now, &self.config.scheduler);
        if summary.due_now > 0 {
            let due = self.earliest_due(learner_id)?;
            session.concept_code = due;
            session.transition(SessionPhase::Review, SessionEvent::ReviewStarted, now)?;
        } else {
            let concept_code = match placement {
                Some(placement) => Some(placement.recommended_start_code.clone()),
                None => self.first_unmastered(learner_id)?,
            };
            match concept_code {
                Some(code) => {
                    session.concept_code = Some(code);
                    session.transition(SessionPhase::Teaching, SessionEvent::SessionStarted, now)?;
                }
                None => {
                    // IDLE has no direct edge to COMPLETED; degrade along
                    // the legal teaching path.
                    tracing::info!(learner = learner_id, "no concept to teach, completing");
                    session.transition(SessionPhase::Teaching, SessionEvent::SessionStarted, now)?;
                    session.complete(
                        CompletionReason::ConceptsExhausted,
                        SessionEvent::SessionEnded,
                        now,
                    )?;
                }
            }
        }

        self.save(&session)?;
        Ok(session)
    }

    /// Moves a freshly taught concept into practice and poses the first
    /// question.
    pub fn begin_practice(&self, session: &mut SessionState) -> Result<Question, EngineError> {
        let now = self.clock.now();
        session.transition(SessionPhase::Practice, SessionEvent::LessonPresented, now)?;
        let question = self.pose_question(session)?;
        self.save(session)?;
        Ok(question)
    }

    /// Applies a practice answer: updates the belief (read-modify-write
    /// with one retry on conflict) and picks the next phase per policy.
    pub fn submit_answer(
        &self,
        session: &mut SessionState,
        correct: bool,
    ) -> Result<SessionPhase, EngineError> {
        let now = self.clock.now();
        if session.phase != SessionPhase::Practice {
            return Err(EngineError::InvalidTransition {
                from: session.phase,
                to: SessionPhase::Practice,
                event: SessionEvent::AnswerSubmitted,
            });
        }
        let concept_code = session
            .concept_code
            .clone()
            .ok_or_else(|| EngineError::ConceptNotFound("<no active concept>".to_string()))?;

        let p_init = self.config.bkt.p_init;
        let prior = self
            .mastery
            .get(&session.learner_id, &concept_code)?
            .unwrap_or_else(|| MasteryBelief::new(p_init, now));
        let updated = update_belief_with_retry(
            self.mastery.as_ref(),
            &session.learner_id,
            &concept_code,
            || MasteryBelief::new(p_init, now),
            |prior| mastery::update(prior, correct, &self.config.bkt, now),
        )?;

        session.questions_answered += 1;
        if correct {
            session.correct_streak += 1;
            session.miss_streak = 0;
        } else {
            session.correct_streak = 0;
            session.miss_streak += 1;
        }

        if mastery::newly_mastered(&prior, &updated) {
            self.ensure_schedule(&session.learner_id, &concept_code)?;
            tracing::info!(
                learner = %session.learner_id,
                concept = %concept_code,
                probability = updated.probability,
                "concept mastered"
            );
            session.transition(SessionPhase::Celebrating, SessionEvent::MasteryAchieved, now)?;
        } else if session.miss_streak >= self.config.session.struggle_threshold {
            session.miss_streak = 0;
            session.transition(SessionPhase::Struggling, SessionEvent::StruggleDetected, now)?;
        } else if self.sustained_negative_emotion(session) {
            session.negative_emotion_run = 0;
            session.transition(
                SessionPhase::EmotionalCheck,
                SessionEvent::EmotionFlagged,
                now,
            )?;
        }
        // Otherwise remain in PRACTICE; the caller poses the next question.

        self.save(session)?;
        Ok(session.phase)
    }

    pub fn next_question(&self, session: &SessionState) -> Result<Question, EngineError> {
        self.pose_question(session)
    }

    pub fn request_hint(&self, session: &mut SessionState) -> Result<(), EngineError> {
        let now = self.clock.now();
        session.transition(SessionPhase::HintRequested, SessionEvent::HintRequested, now)?;
        session.hint_count += 1;
        self.save(session)
    }

    pub fn resume_practice(&self, session: &mut SessionState) -> Result<(), EngineError> {
        let now = self.clock.now();
        session.transition(SessionPhase::Practice, SessionEvent::HintResolved, now)?;
        self.save(session)
    }

    /// A struggling learner is always re-taught before seeing another raw
    /// practice item.
    pub fn reteach(&self, session: &mut SessionState) -> Result<(), EngineError> {
        let now = self.clock.now();
        session.transition(SessionPhase::Teaching, SessionEvent::ReteachStarted, now)?;
        self.save(session)
    }

    /// Leaves `CELEBRATING`: interleave a due review when the scheduler
    /// reports one, otherwise teach the next concept in sequence; with
    /// nothing left, the session completes.
    pub fn celebrate_next(&self, session: &mut SessionState) -> Result<SessionPhase, EngineError> {
        let now = self.clock.now();
        let summary = scheduler::summarize(
            &self.schedules.list(&session.learner_id)?,
            now,
            &self.config.scheduler,
        );

        if summary.due_now > 0 {
            session.concept_code = self.earliest_due(&session.learner_id)?;
            session.transition(SessionPhase::Review, SessionEvent::ReviewStarted, now)?;
        } else {
            match self.first_unmastered(&session.learner_id)? {
                Some(code) => {
                    session.concept_code = Some(code);
                    session.transition(SessionPhase::Teaching, SessionEvent::NextConcept, now)?;
                }
                None => {
                    session.complete(
                        CompletionReason::ConceptsExhausted,
                        SessionEvent::NextConcept,
                        now,
                    )?;
                }
            }
        }

        self.save(session)?;
        Ok(session.phase)
    }

    /// Applies a review attempt to both the schedule and the long-term
    /// belief. A pass celebrates; a fail routes back into practice (and
    /// from there through re-teaching if the struggle persists).
    pub fn submit_review(
        &self,
        session: &mut SessionState,
        correct: bool,
    ) -> Result<SessionPhase, EngineError> {
        let now = self.clock.now();
        let concept_code = session
            .concept_code
            .clone()
            .ok_or_else(|| EngineError::ConceptNotFound("<no review concept>".to_string()))?;

        let schedule = self
            .schedules
            .get(&session.learner_id, &concept_code)?
            .unwrap_or_else(|| ReviewSchedule::new(concept_code.clone(), now));
        let next = scheduler::review(&schedule, correct, now, &self.config.scheduler)?;
        self.schedules
            .put(&session.learner_id, &concept_code, next)?;

        let p_init = self.config.bkt.p_init;
        update_belief_with_retry(
            self.mastery.as_ref(),
            &session.learner_id,
            &concept_code,
            || MasteryBelief::new(p_init, now),
            |prior| mastery::update(prior, correct, &self.config.bkt, now),
        )?;

        if correct {
            session.transition(SessionPhase::Celebrating, SessionEvent::ReviewPassed, now)?;
        } else {
            session.transition(SessionPhase::Practice, SessionEvent::ReviewFailed, now)?;
        }
        self.save(session)?;
        Ok(session.phase)
    }

    /// Boss challenges unlock below full mastery, at the separate
    /// challenge gate.
    pub fn start_boss_challenge(
        &self,
        session: &mut SessionState,
        concept_code: &str,
    ) -> Result<ChallengeGate, EngineError> {
        let now = self.clock.now();
        let unlocked = self
            .mastery
            .get(&session.learner_id, concept_code)?
            .as_ref()
            .map(mastery::challenge_unlocked)
            .unwrap_or(false);
        if !unlocked {
            return Ok(ChallengeGate::Locked);
        }

        session.concept_code = Some(concept_code.to_string());
        session.transition(
            SessionPhase::BossChallenge,
            SessionEvent::ChallengeStarted,
            now,
        )?;
        self.save(session)?;
        Ok(ChallengeGate::Open)
    }

    pub fn submit_challenge_result(
        &self,
        session: &mut SessionState,
        passed: bool,
    ) -> Result<SessionPhase, EngineError> {
        let now = self.clock.now();
        if passed {
            session.transition(
                SessionPhase::Celebrating,
                SessionEvent::ChallengePassed,
                now,
            )?;
        } else {
            session.transition(
                SessionPhase::Struggling,
                SessionEvent::ChallengeFailed,
                now,
            )?;
        }
        self.save(session)?;
        Ok(session.phase)
    }

    /// Resolves an emotional check: back to re-teaching, straight back to
    /// practice, or wind the session down.
    pub fn resolve_emotional_check(
        &self,
        session: &mut SessionState,
        next: SessionPhase,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        if next == SessionPhase::Completed {
            session.complete(CompletionReason::EndedEarly, SessionEvent::CheckResolved, now)?;
            self.sessions.delete(session.id)?;
            return Ok(());
        }
        session.transition(next, SessionEvent::CheckResolved, now)?;
        self.save(session)
    }

    /// Degrades the session to `COMPLETED` along a legal path. Mastery and
    /// review state stay exactly as the last applied update left them.
    pub fn end_session(
        &self,
        session: &mut SessionState,
        reason: CompletionReason,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        if session.phase.is_terminal() {
            self.sessions.delete(session.id)?;
            return Ok(());
        }
        // HINT_REQUESTED has no direct edge to COMPLETED; step back into
        // practice first.
        if session.phase == SessionPhase::HintRequested {
            session.transition(SessionPhase::Practice, SessionEvent::HintResolved, now)?;
        }
        session.complete(reason, SessionEvent::SessionEnded, now)?;
        self.sessions.delete(session.id)?;
        Ok(())
    }

    fn pose_question(&self, session: &SessionState) -> Result<Question, EngineError> {
        let concept_code = session
            .concept_code
            .as_deref()
            .ok_or_else(|| EngineError::ConceptNotFound("<no active concept>".to_string()))?;
        let concept = self.curriculum.concept(concept_code)?;
        let belief = self.mastery.get(&session.learner_id, concept_code)?;
        let target = belief
            .map(|b| b.probability)
            .unwrap_or(self.config.bkt.p_init);
        self.questions.generate(&concept, target)
    }

    fn ensure_schedule(&self, learner_id: &str, concept_code: &str) -> Result<(), EngineError> {
        if self.schedules.get(learner_id, concept_code)?.is_none() {
            let schedule = ReviewSchedule::new(concept_code, self.clock.now());
            self.schedules.put(learner_id, concept_code, schedule)?;
        }
        Ok(())
    }

    fn earliest_due(&self, learner_id: &str) -> Result<Option<String>, EngineError> {
        let now = self.clock.now();
        Ok(self
            .schedules
            .list(learner_id)?
            .into_iter()
            .find(|s| s.is_due(now))
            .map(|s| s.concept_code))
    }

    /// Next concept in difficulty order whose stored belief is below the
    /// canonical mastered threshold and whose prerequisites are all at or
    /// past it.
    fn first_unmastered(&self, learner_id: &str) -> Result<Option<String>, EngineError> {
        let mut concepts = self.curriculum.concepts();
        concepts.sort_by(|a, b| {
            a.difficulty
                .partial_cmp(&b.difficulty)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.code.cmp(&b.code))
        });

        for concept in concepts {
            let probability = self
                .mastery
                .get(learner_id, &concept.code)?
                .map(|b| b.probability)
                .unwrap_or(0.0);
            if probability >= mastery::MASTERY_THRESHOLD {
                continue;
            }
            let mut supported = true;
            for prerequisite in &concept.prerequisites {
                let prereq_probability = self
                    .mastery
                    .get(learner_id, prerequisite)?
                    .map(|b| b.probability)
                    .unwrap_or(0.0);
                if prereq_probability < mastery::MASTERY_THRESHOLD {
                    supported = false;
                    break;
                }
            }
            if supported {
                return Ok(Some(concept.code));
            }
        }
        Ok(None)
    }

    /// Sustained negative emotion: consecutive confident negative signals
    /// past the debounce count.
    fn sustained_negative_emotion(&self, session: &mut SessionState) -> bool {
        let signal = self.emotions.current(&session.learner_id);
        match signal {
            Some(signal)
                if signal.state.is_negative()
                    && signal.confidence >= self.config.session.emotion_confidence_threshold =>
            {
                session.emotion = Some(signal.state);
                session.negative_emotion_run += 1;
            }
            Some(signal) => {
                session.emotion = Some(signal.state);
                session.negative_emotion_run = 0;
            }
            None => {}
        }
        session.negative_emotion_run >= self.config.session.emotion_debounce
    }
}
