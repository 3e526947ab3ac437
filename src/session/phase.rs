//! The session state machine.
//!
//! Every transition is checked against a fixed adjacency table; an illegal
//! edge fails with [`EngineError::InvalidTransition`] naming the attempted
//! `(from, to, event)` triple. The machine never coerces an illegal move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::types::EmotionalState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionPhase {
    Idle,
    Diagnostic,
    Teaching,
    Practice,
    HintRequested,
    Struggling,
    Celebrating,
    BossChallenge,
    Review,
    EmotionalCheck,
    Completed,
}

impl SessionPhase {
    pub const ALL: [SessionPhase; 11] = [
        Self::Idle,
        Self::Diagnostic,
        Self::Teaching,
        Self::Practice,
        Self::HintRequested,
        Self::Struggling,
        Self::Celebrating,
        Self::BossChallenge,
        Self::Review,
        Self::EmotionalCheck,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Diagnostic => "DIAGNOSTIC",
            Self::Teaching => "TEACHING",
            Self::Practice => "PRACTICE",
            Self::HintRequested => "HINT_REQUESTED",
            Self::Struggling => "STRUGGLING",
            Self::Celebrating => "CELEBRATING",
            Self::BossChallenge => "BOSS_CHALLENGE",
            Self::Review => "REVIEW",
            Self::EmotionalCheck => "EMOTIONAL_CHECK",
            Self::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Legal successor phases. `Completed` has none.
    pub fn allowed_transitions(&self) -> &'static [SessionPhase] {
        use SessionPhase::*;
        match self {
            Idle => &[Diagnostic, Teaching, Review, BossChallenge],
            Diagnostic => &[Diagnostic, Completed],
            Teaching => &[Practice, EmotionalCheck, Completed],
            Practice => &[
                HintRequested,
                Struggling,
                Celebrating,
                Teaching,
                EmotionalCheck,
                Completed,
            ],
            HintRequested => &[Practice, Struggling, EmotionalCheck],
            Struggling => &[Teaching, EmotionalCheck, Completed],
            Celebrating => &[Teaching, Practice, Review, Completed],
            BossChallenge => &[Celebrating, Struggling, Completed],
            Review => &[Practice, Celebrating, Completed],
            EmotionalCheck => &[Teaching, Practice, Completed],
            Completed => &[],
        }
    }
}

pub fn can_transition(from: SessionPhase, to: SessionPhase) -> bool {
    from.allowed_transitions().contains(&to)
}

/// What triggered a transition. Carried in transition history and in
/// [`EngineError::InvalidTransition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEvent {
    SessionStarted,
    DiagnosticStep,
    DiagnosticFinished,
    LessonPresented,
    AnswerSubmitted,
    HintRequested,
    HintResolved,
    StruggleDetected,
    MasteryAchieved,
    EmotionFlagged,
    CheckResolved,
    ReteachStarted,
    ReviewStarted,
    ReviewPassed,
    ReviewFailed,
    ChallengeStarted,
    ChallengePassed,
    ChallengeFailed,
    NextConcept,
    SessionEnded,
}

/// Why a session reached `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionReason {
    Finished,
    DiagnosticComplete,
    ConceptsExhausted,
    EndedEarly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: SessionPhase,
    pub to: SessionPhase,
    pub event: SessionEvent,
    pub at: DateTime<Utc>,
}

const HISTORY_LIMIT: usize = 100;

/// Ephemeral per-session state. Created at session start, mutated by every
/// event, terminated at `Completed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub id: Uuid,
    pub learner_id: String,
    pub phase: SessionPhase,
    pub concept_code: Option<String>,
    pub questions_answered: i32,
    pub correct_streak: i32,
    pub miss_streak: i32,
    pub hint_count: i32,
    pub emotion: Option<EmotionalState>,
    pub negative_emotion_run: i32,
    pub completion_reason: Option<CompletionReason>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    history: Vec<TransitionRecord>,
}

impl SessionState {
    pub fn new(learner_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            learner_id: learner_id.into(),
            phase: SessionPhase::Idle,
            concept_code: None,
            questions_answered: 0,
            correct_streak: 0,
            miss_streak: 0,
            hint_count: 0,
            emotion: None,
            negative_emotion_run: 0,
            completion_reason: None,
            started_at: now,
            updated_at: now,
            history: Vec::new(),
        }
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Moves to `to` if the adjacency table allows it.
    pub fn transition(
        &mut self,
        to: SessionPhase,
        event: SessionEvent,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if !can_transition(self.phase, to) {
            return Err(EngineError::InvalidTransition {
                from: self.phase,
                to,
                event,
            });
        }

        self.history.push(TransitionRecord {
            from: self.phase,
            to,
            event,
            at: now,
        });
        if self.history.len() > HISTORY_LIMIT {
            let extra = self.history.len() - HISTORY_LIMIT;
            self.history.drain(0..extra);
        }

        self.phase = to;
        self.updated_at = now;
        Ok(())
    }

    pub fn complete(
        &mut self,
        reason: CompletionReason,
        event: SessionEvent,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.transition(SessionPhase::Completed, event, now)?;
        self.completion_reason = Some(reason);
        Ok(())
    }
}
