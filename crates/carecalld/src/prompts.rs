//! Every sentence the caller can hear, in one place.
//!
//! Phrasing is deterministic: identical turns must produce identical
//! responses, so there is no seeded variety here. The transport layer feeds
//! these strings to text-to-speech verbatim.

use carecall_common::{ScoredCandidate, SlotName};

pub fn greeting(provider_names: &[&str]) -> String {
    format!(
        "Thank you for calling the clinic. Which provider would you like to see? We have {}.",
        join_options(provider_names)
    )
}

pub fn ask_provider(provider_names: &[&str]) -> String {
    format!(
        "Which provider would you like to see? We have {}.",
        join_options(provider_names)
    )
}

pub fn ask_intent() -> String {
    "Are you calling to schedule an appointment, or do you need advice about a medical concern?"
        .to_string()
}

pub fn ask_window(window_names: &[&str]) -> String {
    format!(
        "What time works for you? I can offer {}.",
        join_options(window_names)
    )
}

pub fn ask_symptom() -> String {
    "I'm sorry to hear you're not feeling well. Can you describe your main symptom?".to_string()
}

pub fn ask_urgency() -> String {
    "How urgent does it feel? Would you say it is high, moderate, or low?".to_string()
}

/// Disambiguation prompt built from fuzzy candidates, e.g.
/// "Did you mean Dr. Smith or Dr. Smythe?".
pub fn clarify_candidates(candidates: &[ScoredCandidate]) -> String {
    let names: Vec<&str> = candidates
        .iter()
        .map(|c| c.entity.canonical_name.as_str())
        .collect();
    format!("Sorry, did you mean {}?", join_options(&names))
}

pub fn reprompt(slot: SlotName) -> String {
    match slot {
        SlotName::Provider => {
            "Sorry, I didn't catch that. Which provider would you like to see?".to_string()
        }
        SlotName::Intent => {
            "Sorry, I didn't catch that. Are you calling to schedule an appointment, or do you need medical advice?"
                .to_string()
        }
        SlotName::AppointmentWindow => {
            "Sorry, I didn't catch that. What time would you like to come in?".to_string()
        }
        SlotName::Symptom => {
            "Sorry, I didn't catch that. Could you describe your main symptom again?".to_string()
        }
        SlotName::UrgencyLevel => {
            "Sorry, I didn't catch that. Is it high, moderate, or low urgency?".to_string()
        }
        SlotName::ConfirmedYesNo => "Sorry, was that a yes or a no?".to_string(),
    }
}

pub fn confirm_scheduling(provider: &str, window: &str) -> String {
    format!(
        "To confirm: an appointment with {} on {}. Is that right?",
        provider, window
    )
}

pub fn confirm_triage(symptom: &str, urgency: &str) -> String {
    format!(
        "To confirm: you're experiencing {} and it feels {} urgency. Is that right?",
        symptom, urgency
    )
}

pub fn booked(provider: &str, window: &str) -> String {
    format!(
        "You're booked with {} on {}. You'll receive a confirmation shortly. Goodbye.",
        provider, window
    )
}

pub fn window_unavailable(window: &str) -> String {
    format!(
        "I'm sorry, {} is no longer available. What other time works for you?",
        window
    )
}

pub fn correct_slot(slot: SlotName) -> String {
    match slot {
        SlotName::Provider => "No problem. Which provider should it be instead?".to_string(),
        SlotName::Intent => {
            "No problem. Are you scheduling an appointment, or do you need medical advice?"
                .to_string()
        }
        SlotName::AppointmentWindow => "No problem. What time should it be instead?".to_string(),
        SlotName::Symptom => "No problem. What is your main symptom then?".to_string(),
        SlotName::UrgencyLevel => {
            "No problem. How urgent would you say it is then?".to_string()
        }
        SlotName::ConfirmedYesNo => "No problem. Let's go over that again.".to_string(),
    }
}

pub fn transfer_to_human() -> String {
    "Let me connect you with a member of our staff. Please hold.".to_string()
}

pub fn urgent_escalation() -> String {
    "That sounds like it needs prompt attention. I'm connecting you with our nursing staff right away. Please hold."
        .to_string()
}

pub fn routine_followup(window_names: &[&str]) -> String {
    format!(
        "That doesn't sound urgent, but a routine visit would be a good idea. What time works for you? I can offer {}.",
        join_options(window_names)
    )
}

pub fn self_care_advice(symptom: &str) -> String {
    format!(
        "For {}, rest and fluids are usually enough. If it gets worse or lasts more than a few days, please call us back. Take care. Goodbye.",
        symptom
    )
}

pub fn call_over() -> String {
    "This call has already been completed. Goodbye.".to_string()
}

fn join_options(names: &[&str]) -> String {
    match names {
        [] => String::new(),
        [only] => (*only).to_string(),
        [head @ .., last] => format!("{} or {}", head.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_are_joined_naturally() {
        assert_eq!(join_options(&["A"]), "A");
        assert_eq!(join_options(&["A", "B"]), "A or B");
        assert_eq!(join_options(&["A", "B", "C"]), "A, B or C");
    }
}
