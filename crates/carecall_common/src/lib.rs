//! Shared contract types for the carecall dialogue engine.
//!
//! Everything the daemon and the telephony transport exchange lives here:
//! the entity model, match results, call sessions, turn outcomes, the
//! configuration schema, and the error taxonomy.

pub mod config;
pub mod error;
pub mod types;

pub use config::EngineConfig;
pub use error::CallError;
pub use types::{
    CallSession, DialogueState, Directive, Entity, EntityKind, Flow, MatchMethod, MatchResult,
    ScoredCandidate, SlotName, SlotValue, TerminalState, TurnOutcome,
};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
