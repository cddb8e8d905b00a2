//! Turn orchestrator: the seam between the transport layer and the
//! dialogue engine.
//!
//! Owns the session store and serializes turns per call. Everything below
//! this point is transport-agnostic; the HTTP routes and any future
//! telephony adapter all come through here.

use crate::availability::{AvailabilityBackend, InMemorySchedule};
use crate::catalog::EntityCatalog;
use crate::decision::DecisionLogic;
use crate::dialogue::DialogueEngine;
use crate::llm::{HttpLlmClassifier, LlmClassifier};
use crate::matcher::Matcher;
use crate::session::SessionStore;
use carecall_common::{CallError, EngineConfig, TurnOutcome};
use std::sync::Arc;
use tracing::info;

pub struct TurnOrchestrator {
    engine: DialogueEngine,
    store: SessionStore,
}

impl TurnOrchestrator {
    /// Wire the whole engine from configuration, with the built-in
    /// in-memory schedule as the availability backend.
    pub fn from_config(config: &EngineConfig) -> Result<Self, CallError> {
        let availability: Arc<dyn AvailabilityBackend> =
            Arc::new(InMemorySchedule::from_config(&config.catalog));
        let llm: Option<Arc<dyn LlmClassifier>> = HttpLlmClassifier::from_config(&config.llm)?
            .map(|c| Arc::new(c) as Arc<dyn LlmClassifier>);
        Self::with_backends(config, availability, llm)
    }

    /// Same wiring with injected backends, for deployments with a real
    /// scheduling system and for tests.
    pub fn with_backends(
        config: &EngineConfig,
        availability: Arc<dyn AvailabilityBackend>,
        llm: Option<Arc<dyn LlmClassifier>>,
    ) -> Result<Self, CallError> {
        let catalog = Arc::new(EntityCatalog::from_config(&config.catalog)?);
        if llm.is_none() {
            info!("no LLM endpoint configured, matching is fuzzy-only");
        }
        let matcher = Matcher::new(Arc::clone(&catalog), config.matching.clone(), llm);
        let decision = DecisionLogic::new(availability);
        let engine = DialogueEngine::new(catalog, matcher, decision, config.dialogue.clone());
        let store = SessionStore::new(config.session.clone());
        Ok(Self { engine, store })
    }

    /// Process one transcribed utterance for one call. Turns for the same
    /// call are serialized on the session lock.
    pub async fn handle_turn(
        &self,
        call_id: &str,
        utterance: &str,
    ) -> Result<TurnOutcome, CallError> {
        let handle = self.store.get_or_create(call_id).await;
        let mut session = handle.lock().await;

        let (response_text, directive) = self.engine.advance(&mut session, utterance).await?;
        Ok(TurnOutcome {
            response_text,
            directive,
            session: session.clone(),
        })
    }

    /// Telephony hangup notification. Unknown call ids are an error so the
    /// transport can distinguish a stale webhook from a real call.
    pub async fn end_call(&self, call_id: &str) -> Result<(), CallError> {
        if self.store.end_call(call_id).await {
            Ok(())
        } else {
            Err(CallError::UnknownCall(call_id.to_string()))
        }
    }

    pub async fn active_calls(&self) -> usize {
        self.store.active_count().await
    }

    pub async fn evict_expired_sessions(&self) -> usize {
        self.store.evict_expired().await
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.store.sweep_interval_secs()
    }
}
