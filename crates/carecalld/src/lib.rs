//! Carecall daemon library: the dialogue orchestration engine behind the
//! phone line.
//!
//! Turn-by-turn pipeline: transcribed utterance -> [`orchestrator`] ->
//! [`matcher`] (over the [`catalog`]) -> [`dialogue`] state machine ->
//! [`decision`] logic once a flow is complete -> response text plus a
//! call-control directive for the transport layer.

pub mod availability;
pub mod catalog;
pub mod decision;
pub mod dialogue;
pub mod llm;
pub mod matcher;
pub mod orchestrator;
pub mod prompts;
pub mod routes;
pub mod server;
pub mod session;

pub use orchestrator::TurnOrchestrator;
