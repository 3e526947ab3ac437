//! Adaptive mastery and session orchestration engine.
//!
//! The crate is a library surface with four tightly coupled pieces:
//! - `mastery` - Bayesian Knowledge Tracing belief updates
//! - `diagnostic` - adaptive placement interview
//! - `scheduler` - SM-2 style spaced repetition
//! - `session` - guarded state machine driving a live tutoring session
//!
//! Storage, curriculum, question generation, emotion signals and the clock
//! are collaborator traits in [`store`]; in-memory implementations ship with
//! the crate so the engine runs end-to-end without external services.

pub mod config;
pub mod diagnostic;
pub mod error;
pub mod mastery;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;

pub use config::EngineConfig;
pub use diagnostic::{DiagnosticEngine, DiagnosticSession, PlacementResult};
pub use error::EngineError;
pub use scheduler::{ReviewSchedule, ReviewSummary};
pub use session::{Orchestrator, SessionEvent, SessionPhase, SessionState};
pub use types::{Concept, MasteryBelief, MasteryLevel, Subject, Urgency};
