//! The dialogue state machine: one call, advanced strictly forward one
//! turn at a time.
//!
//! State order is Start, CollectingProvider, CollectingIntent,
//! CollectingDetail, Confirming, then a terminal state. The two permitted
//! re-entries are the single-slot correction after a "no" at confirmation
//! and the return to detail collection when a confirmed window turns out
//! to be full. Both are bounded by the per-slot retry policy, so every
//! call terminates.

use crate::catalog::EntityCatalog;
use crate::decision::{BookingOutcome, DecisionLogic, TriageDisposition};
use crate::matcher::{match_yes_no, Matcher};
use crate::prompts;
use carecall_common::config::DialogueConfig;
use carecall_common::{
    CallError, CallSession, DialogueState, Directive, EntityKind, Flow, MatchResult, SlotName,
    SlotValue, TerminalState,
};
use std::sync::Arc;
use tracing::{debug, info};

pub struct DialogueEngine {
    catalog: Arc<EntityCatalog>,
    matcher: Matcher,
    decision: DecisionLogic,
    config: DialogueConfig,
}

impl DialogueEngine {
    pub fn new(
        catalog: Arc<EntityCatalog>,
        matcher: Matcher,
        decision: DecisionLogic,
        config: DialogueConfig,
    ) -> Self {
        Self {
            catalog,
            matcher,
            decision,
            config,
        }
    }

    /// Advance one turn. Mutates the session in place and returns the
    /// response to speak plus the call-control directive.
    pub async fn advance(
        &self,
        session: &mut CallSession,
        utterance: &str,
    ) -> Result<(String, Directive), CallError> {
        session.touch();

        if session.is_terminal() {
            return Ok((prompts::call_over(), Directive::EndCall));
        }

        if self.wants_human(utterance) {
            info!(call_id = %session.call_id, "escalation keyword detected");
            session.state = DialogueState::Terminal(TerminalState::Escalated);
            return Ok((prompts::transfer_to_human(), Directive::Escalate));
        }

        let (response, directive) = match session.state {
            DialogueState::Start => self.on_start(session, utterance).await?,
            DialogueState::CollectingProvider => {
                self.on_collecting_provider(session, utterance).await?
            }
            DialogueState::CollectingIntent => {
                self.on_collecting_intent(session, utterance).await?
            }
            DialogueState::CollectingDetail => {
                self.on_collecting_detail(session, utterance).await?
            }
            DialogueState::Confirming => self.on_confirming(session, utterance).await?,
            // Handled by the terminal guard above.
            DialogueState::Terminal(_) => (prompts::call_over(), Directive::EndCall),
        };

        debug!(
            call_id = %session.call_id,
            state = ?session.state,
            directive = ?directive,
            "turn advanced"
        );
        Ok((response, directive))
    }

    /// An empty opening turn gets the greeting; a caller who opens with a
    /// provider name skips straight past it.
    async fn on_start(
        &self,
        session: &mut CallSession,
        utterance: &str,
    ) -> Result<(String, Directive), CallError> {
        session.state = DialogueState::CollectingProvider;
        if utterance.trim().is_empty() {
            let providers = self.catalog.canonical_names(EntityKind::Provider);
            return Ok((prompts::greeting(&providers), Directive::Continue));
        }
        self.on_collecting_provider(session, utterance).await
    }

    async fn on_collecting_provider(
        &self,
        session: &mut CallSession,
        utterance: &str,
    ) -> Result<(String, Directive), CallError> {
        let result = self
            .matcher
            .match_fragment(utterance, EntityKind::Provider)
            .await;
        match result.resolved {
            Some(entity) => {
                session.fill_slot(
                    SlotName::Provider,
                    SlotValue::new(entity.canonical_name, result.confidence, result.method),
                );
                session.state = DialogueState::CollectingIntent;
                Ok((prompts::ask_intent(), Directive::Continue))
            }
            None => Ok(self.on_unresolved(session, SlotName::Provider, &result)),
        }
    }

    async fn on_collecting_intent(
        &self,
        session: &mut CallSession,
        utterance: &str,
    ) -> Result<(String, Directive), CallError> {
        let result = self
            .matcher
            .match_fragment(utterance, EntityKind::CallIntent)
            .await;
        match result.resolved {
            Some(entity) => {
                let flow = flow_for_intent(&entity.canonical_name);
                session.fill_slot(
                    SlotName::Intent,
                    SlotValue::new(entity.canonical_name, result.confidence, result.method),
                );
                session.flow = Some(flow);
                session.state = DialogueState::CollectingDetail;
                info!(call_id = %session.call_id, ?flow, "flow selected");
                Ok((self.ask_for(session, flow.detail_slots()[0]), Directive::Continue))
            }
            None => Ok(self.on_unresolved(session, SlotName::Intent, &result)),
        }
    }

    async fn on_collecting_detail(
        &self,
        session: &mut CallSession,
        utterance: &str,
    ) -> Result<(String, Directive), CallError> {
        let slot = match session.next_detail_slot() {
            Some(slot) => slot,
            // All slots filled already; only reachable through a correction
            // that was satisfied out of band, so just re-confirm.
            None => {
                session.state = DialogueState::Confirming;
                return Ok((self.confirmation_prompt(session), Directive::Continue));
            }
        };

        // A re-opened intent can switch the flow entirely.
        if slot == SlotName::Intent {
            return self.on_collecting_intent(session, utterance).await;
        }

        let kind = match slot.entity_kind() {
            Some(kind) => kind,
            None => {
                session.state = DialogueState::Confirming;
                return Ok((self.confirmation_prompt(session), Directive::Continue));
            }
        };

        let result = self.matcher.match_fragment(utterance, kind).await;
        match result.resolved {
            Some(entity) => {
                session.fill_slot(
                    slot,
                    SlotValue::new(entity.canonical_name, result.confidence, result.method),
                );
                session.correcting = None;
                match session.next_detail_slot() {
                    Some(next) => Ok((self.ask_for(session, next), Directive::Continue)),
                    None => {
                        session.state = DialogueState::Confirming;
                        Ok((self.confirmation_prompt(session), Directive::Continue))
                    }
                }
            }
            None => Ok(self.on_unresolved(session, slot, &result)),
        }
    }

    async fn on_confirming(
        &self,
        session: &mut CallSession,
        utterance: &str,
    ) -> Result<(String, Directive), CallError> {
        match match_yes_no(utterance) {
            Some(true) => self.on_confirmed(session).await,
            Some(false) => Ok(self.on_correction(session)),
            None => {
                let unresolved = MatchResult::none(Vec::new());
                Ok(self.on_unresolved(session, SlotName::ConfirmedYesNo, &unresolved))
            }
        }
    }

    /// The caller said yes; run the flow's decision logic.
    async fn on_confirmed(
        &self,
        session: &mut CallSession,
    ) -> Result<(String, Directive), CallError> {
        let flow = match session.flow {
            Some(flow) => flow,
            None => {
                // No flow can only mean corrupted state; hand off rather
                // than loop.
                session.state = DialogueState::Terminal(TerminalState::Escalated);
                return Ok((prompts::transfer_to_human(), Directive::Escalate));
            }
        };

        match flow {
            Flow::Scheduling => self.on_confirmed_scheduling(session).await,
            Flow::Triage => Ok(self.on_confirmed_triage(session)),
        }
    }

    async fn on_confirmed_scheduling(
        &self,
        session: &mut CallSession,
    ) -> Result<(String, Directive), CallError> {
        let provider = slot_value(session, SlotName::Provider);
        let window = slot_value(session, SlotName::AppointmentWindow);

        match self.decision.decide_booking(&provider, &window).await {
            BookingOutcome::Booked => {
                session.state = DialogueState::Terminal(TerminalState::Booked);
                info!(call_id = %session.call_id, provider = %provider, window = %window, "call ends booked");
                Ok((prompts::booked(&provider, &window), Directive::BookAppointment))
            }
            BookingOutcome::WindowUnavailable => {
                // Refilling the slot resets its retry counter, so the
                // booking attempts get their own counter to keep this
                // re-entry bounded.
                session.booking_attempts += 1;
                if session.booking_attempts > self.config.max_retries {
                    session.state = DialogueState::Terminal(TerminalState::Escalated);
                    return Ok((prompts::transfer_to_human(), Directive::Escalate));
                }
                session.clear_slot(SlotName::AppointmentWindow);
                session.state = DialogueState::CollectingDetail;
                Ok((prompts::window_unavailable(&window), Directive::Continue))
            }
        }
    }

    fn on_confirmed_triage(&self, session: &mut CallSession) -> (String, Directive) {
        let symptom = slot_value(session, SlotName::Symptom);
        let urgency = slot_value(session, SlotName::UrgencyLevel);

        match self.decision.decide_triage(&symptom, &urgency) {
            TriageDisposition::EscalateNow => {
                session.state = DialogueState::Terminal(TerminalState::Escalated);
                info!(call_id = %session.call_id, symptom = %symptom, "triage escalation");
                (prompts::urgent_escalation(), Directive::Escalate)
            }
            TriageDisposition::ScheduleVisit => {
                // Hand the call back to scheduling with the provider kept.
                session.flow = Some(Flow::Scheduling);
                session.state = DialogueState::CollectingDetail;
                let windows = self.catalog.canonical_names(EntityKind::TimeSlot);
                (prompts::routine_followup(&windows), Directive::Continue)
            }
            TriageDisposition::SelfCare => {
                session.state = DialogueState::Terminal(TerminalState::Completed);
                (prompts::self_care_advice(&symptom), Directive::EndCall)
            }
        }
    }

    /// A "no" at confirmation re-opens the most recently filled slot, once
    /// per round trip. Repeated corrections burn the confirmation retry
    /// budget and end in a human handoff.
    fn on_correction(&self, session: &mut CallSession) -> (String, Directive) {
        let attempts = session.bump_retry(SlotName::ConfirmedYesNo);
        if attempts > self.config.max_retries {
            session.state = DialogueState::Terminal(TerminalState::Escalated);
            return (prompts::transfer_to_human(), Directive::Escalate);
        }

        match session.last_filled_slot() {
            Some(slot) => {
                session.clear_slot(slot);
                session.correcting = Some(slot);
                session.state = DialogueState::CollectingDetail;
                (prompts::correct_slot(slot), Directive::Continue)
            }
            None => {
                session.state = DialogueState::Terminal(TerminalState::Escalated);
                (prompts::transfer_to_human(), Directive::Escalate)
            }
        }
    }

    /// Shared failure path for every slot: clarify or re-prompt while the
    /// retry budget lasts, then hand off to a human.
    fn on_unresolved(
        &self,
        session: &mut CallSession,
        slot: SlotName,
        result: &MatchResult,
    ) -> (String, Directive) {
        let attempts = session.bump_retry(slot);
        if attempts > self.config.max_retries {
            info!(
                call_id = %session.call_id,
                slot = %slot,
                attempts,
                "retry budget exhausted, escalating"
            );
            session.state = DialogueState::Terminal(TerminalState::Escalated);
            return (prompts::transfer_to_human(), Directive::Escalate);
        }

        let response = if result.candidates.is_empty() {
            prompts::reprompt(slot)
        } else {
            prompts::clarify_candidates(&result.candidates)
        };
        (response, Directive::Continue)
    }

    fn ask_for(&self, session: &CallSession, slot: SlotName) -> String {
        match slot {
            SlotName::Provider => {
                let providers = self.catalog.canonical_names(EntityKind::Provider);
                prompts::ask_provider(&providers)
            }
            SlotName::Intent => prompts::ask_intent(),
            SlotName::AppointmentWindow => {
                let windows = self.catalog.canonical_names(EntityKind::TimeSlot);
                prompts::ask_window(&windows)
            }
            SlotName::Symptom => prompts::ask_symptom(),
            SlotName::UrgencyLevel => prompts::ask_urgency(),
            SlotName::ConfirmedYesNo => self.confirmation_prompt(session),
        }
    }

    fn confirmation_prompt(&self, session: &CallSession) -> String {
        match session.flow {
            Some(Flow::Triage) => prompts::confirm_triage(
                &slot_value(session, SlotName::Symptom),
                &slot_value(session, SlotName::UrgencyLevel),
            ),
            _ => prompts::confirm_scheduling(
                &slot_value(session, SlotName::Provider),
                &slot_value(session, SlotName::AppointmentWindow),
            ),
        }
    }

    fn wants_human(&self, utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        self.config
            .escalation_keywords
            .iter()
            .any(|keyword| lower.contains(keyword.as_str()))
    }
}

fn slot_value(session: &CallSession, slot: SlotName) -> String {
    session
        .slot(slot)
        .map(|v| v.value.clone())
        .unwrap_or_default()
}

/// Map a resolved intent entity to a flow. Intent names are clinic-authored
/// config text, so the mapping is keyword-driven rather than exact.
fn flow_for_intent(canonical: &str) -> Flow {
    let lower = canonical.to_lowercase();
    let scheduling_markers = ["schedul", "appointment", "book", "visit"];
    if scheduling_markers.iter().any(|m| lower.contains(m)) {
        Flow::Scheduling
    } else {
        Flow::Triage
    }
}
