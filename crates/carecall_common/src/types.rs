//! Core data model: entities, match results, call sessions, turn outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The closed set of entity categories the matcher may resolve against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Provider,
    TimeSlot,
    UrgencyLevel,
    CallIntent,
    Symptom,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Provider => "provider",
            Self::TimeSlot => "time_slot",
            Self::UrgencyLevel => "urgency_level",
            Self::CallIntent => "call_intent",
            Self::Symptom => "symptom",
        };
        write!(f, "{}", s)
    }
}

/// A catalog entry. Immutable after catalog load; aliases are normalized
/// (lowercase, deduplicated) by the catalog loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub kind: EntityKind,
}

/// Which stage of the matching pipeline produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Fuzzy,
    Llm,
    None,
}

/// One fuzzy candidate with its score, kept for disambiguation prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub entity: Entity,
    pub score: f32,
}

/// Outcome of resolving one utterance fragment against the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub resolved: Option<Entity>,
    pub confidence: f32,
    pub method: MatchMethod,
    /// Top fuzzy candidates, best first. Populated when unresolved or
    /// ambiguous so the state machine can offer a choice.
    pub candidates: Vec<ScoredCandidate>,
}

impl MatchResult {
    pub fn none(candidates: Vec<ScoredCandidate>) -> Self {
        Self {
            resolved: None,
            confidence: 0.0,
            method: MatchMethod::None,
            candidates,
        }
    }
}

/// A single piece of information the conversation must collect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Provider,
    Intent,
    AppointmentWindow,
    Symptom,
    UrgencyLevel,
    ConfirmedYesNo,
}

impl SlotName {
    /// The catalog kind this slot resolves against. `ConfirmedYesNo` uses
    /// the dedicated boolean matcher instead.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            SlotName::Provider => Some(EntityKind::Provider),
            SlotName::Intent => Some(EntityKind::CallIntent),
            SlotName::AppointmentWindow => Some(EntityKind::TimeSlot),
            SlotName::Symptom => Some(EntityKind::Symptom),
            SlotName::UrgencyLevel => Some(EntityKind::UrgencyLevel),
            SlotName::ConfirmedYesNo => None,
        }
    }

    /// Caller-facing description, used in clarification prompts.
    pub fn spoken_name(&self) -> &'static str {
        match self {
            SlotName::Provider => "provider",
            SlotName::Intent => "reason for your call",
            SlotName::AppointmentWindow => "appointment time",
            SlotName::Symptom => "symptom",
            SlotName::UrgencyLevel => "urgency",
            SlotName::ConfirmedYesNo => "confirmation",
        }
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.spoken_name())
    }
}

/// The two conversation purposes, each with its own required slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Flow {
    Scheduling,
    Triage,
}

impl Flow {
    /// Required slots after the shared Provider/intent stages, in fill order.
    pub fn detail_slots(&self) -> &'static [SlotName] {
        match self {
            Flow::Scheduling => &[SlotName::AppointmentWindow],
            Flow::Triage => &[SlotName::Symptom, SlotName::UrgencyLevel],
        }
    }
}

/// Terminal conversation outcomes. No transitions leave these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Booked,
    Escalated,
    Completed,
    Abandoned,
}

/// Dialogue states, advanced strictly forward through the flow graph.
/// The only re-entries are the single-slot correction from `Confirming`
/// and the "window unavailable, pick another" return to `CollectingDetail`,
/// both bounded by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    Start,
    CollectingProvider,
    CollectingIntent,
    CollectingDetail,
    Confirming,
    Terminal(TerminalState),
}

impl DialogueState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DialogueState::Terminal(_))
    }
}

/// A filled slot: the resolved canonical value plus how we got it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotValue {
    pub value: String,
    pub confidence: f32,
    pub method: MatchMethod,
}

impl SlotValue {
    pub fn new(value: impl Into<String>, confidence: f32, method: MatchMethod) -> Self {
        Self {
            value: value.into(),
            confidence,
            method,
        }
    }
}

/// Per-call conversation state. One per active phone call, created on the
/// first turn and evicted after a terminal state plus the retention window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub call_id: String,
    pub state: DialogueState,
    pub flow: Option<Flow>,
    pub filled_slots: HashMap<SlotName, SlotValue>,
    pub retry_counts: HashMap<SlotName, u32>,
    /// Slots in the order they were filled, for the correction re-entry.
    pub fill_order: Vec<SlotName>,
    /// Slot re-opened by a "no" at confirmation, if any.
    pub correcting: Option<SlotName>,
    /// Confirmed bookings rejected by the availability backend. Unlike the
    /// per-slot retry counters this is never reset by a refill, so a caller
    /// who keeps confirming full windows cannot loop forever.
    #[serde(default)]
    pub booking_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(call_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            call_id: call_id.into(),
            state: DialogueState::Start,
            flow: None,
            filled_slots: HashMap::new(),
            retry_counts: HashMap::new(),
            fill_order: Vec::new(),
            correcting: None,
            booking_attempts: 0,
            created_at: now,
            last_updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Store a resolved value and reset the slot's retry counter.
    pub fn fill_slot(&mut self, slot: SlotName, value: SlotValue) {
        self.filled_slots.insert(slot, value);
        self.retry_counts.remove(&slot);
        self.fill_order.retain(|s| *s != slot);
        self.fill_order.push(slot);
    }

    pub fn slot(&self, slot: SlotName) -> Option<&SlotValue> {
        self.filled_slots.get(&slot)
    }

    pub fn clear_slot(&mut self, slot: SlotName) {
        self.filled_slots.remove(&slot);
        self.fill_order.retain(|s| *s != slot);
    }

    /// The most recently filled slot, which is the only one a caller may
    /// correct from the confirmation stage.
    pub fn last_filled_slot(&self) -> Option<SlotName> {
        self.fill_order.last().copied()
    }

    /// Increment and return the retry counter for a slot.
    pub fn bump_retry(&mut self, slot: SlotName) -> u32 {
        let count = self.retry_counts.entry(slot).or_insert(0);
        *count += 1;
        *count
    }

    pub fn retry_count(&self, slot: SlotName) -> u32 {
        self.retry_counts.get(&slot).copied().unwrap_or(0)
    }

    pub fn touch(&mut self) {
        self.last_updated_at = Utc::now();
    }

    /// First unfilled slot of the active flow, honoring a pending correction.
    pub fn next_detail_slot(&self) -> Option<SlotName> {
        if let Some(slot) = self.correcting {
            return Some(slot);
        }
        let flow = self.flow?;
        flow.detail_slots()
            .iter()
            .copied()
            .find(|s| !self.filled_slots.contains_key(s))
    }
}

/// The side-effect instruction returned to the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Directive {
    /// Keep listening for the next caller utterance.
    Continue,
    /// Book the confirmed slot and wrap up the call.
    BookAppointment,
    /// Transfer the call to a human operator.
    Escalate,
    /// Hang up gracefully.
    EndCall,
}

/// What one turn produced: the utterance to synthesize, the call-control
/// directive, and the updated session to persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub response_text: String,
    pub directive: Directive,
    pub session: CallSession,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_slot_resets_retry_counter() {
        let mut session = CallSession::new("call-1");
        session.bump_retry(SlotName::Provider);
        session.bump_retry(SlotName::Provider);
        assert_eq!(session.retry_count(SlotName::Provider), 2);

        session.fill_slot(
            SlotName::Provider,
            SlotValue::new("Dr. Smith", 0.92, MatchMethod::Fuzzy),
        );
        assert_eq!(session.retry_count(SlotName::Provider), 0);
    }

    #[test]
    fn last_filled_slot_tracks_fill_order() {
        let mut session = CallSession::new("call-1");
        session.fill_slot(
            SlotName::Provider,
            SlotValue::new("Dr. Smith", 1.0, MatchMethod::Fuzzy),
        );
        session.fill_slot(
            SlotName::AppointmentWindow,
            SlotValue::new("tuesday morning", 1.0, MatchMethod::Fuzzy),
        );
        assert_eq!(session.last_filled_slot(), Some(SlotName::AppointmentWindow));

        // Refilling an earlier slot makes it the most recent again.
        session.fill_slot(
            SlotName::Provider,
            SlotValue::new("Dr. Patel", 1.0, MatchMethod::Fuzzy),
        );
        assert_eq!(session.last_filled_slot(), Some(SlotName::Provider));
    }

    #[test]
    fn next_detail_slot_follows_flow_order() {
        let mut session = CallSession::new("call-1");
        session.flow = Some(Flow::Triage);
        assert_eq!(session.next_detail_slot(), Some(SlotName::Symptom));

        session.fill_slot(
            SlotName::Symptom,
            SlotValue::new("fever", 0.9, MatchMethod::Fuzzy),
        );
        assert_eq!(session.next_detail_slot(), Some(SlotName::UrgencyLevel));
    }

    #[test]
    fn pending_correction_takes_priority() {
        let mut session = CallSession::new("call-1");
        session.flow = Some(Flow::Scheduling);
        session.correcting = Some(SlotName::Provider);
        assert_eq!(session.next_detail_slot(), Some(SlotName::Provider));
    }

    #[test]
    fn terminal_states_are_recognized() {
        assert!(DialogueState::Terminal(TerminalState::Booked).is_terminal());
        assert!(!DialogueState::Confirming.is_terminal());
    }
}
