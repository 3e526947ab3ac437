use thiserror::Error;

use crate::session::{SessionEvent, SessionPhase};

/// Error taxonomy for the engine.
///
/// `MalformedInput` and `InvalidTransition` are contract violations and are
/// never silently corrected. `ConceptNotFound` has documented fallbacks at
/// the call sites where curriculum gaps are an expected condition.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid transition from {from:?} to {to:?} on {event:?}")]
    InvalidTransition {
        from: SessionPhase,
        to: SessionPhase,
        event: SessionEvent,
    },

    #[error("malformed input: {field} = {value}")]
    MalformedInput { field: &'static str, value: f64 },

    #[error("concept not found: {0}")]
    ConceptNotFound(String),

    #[error("storage conflict for learner {learner} key {key}")]
    StorageConflict { learner: String, key: String },
}
