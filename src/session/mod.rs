//! Live tutoring session: guarded state machine plus orchestration policy.

pub mod orchestrator;
pub mod phase;

pub use orchestrator::{ChallengeGate, Orchestrator};
pub use phase::{
    can_transition, CompletionReason, SessionEvent, SessionPhase, SessionState, TransitionRecord,
};
