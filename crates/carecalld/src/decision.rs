//! Post-confirmation decision logic: what happens once a flow's slots are
//! complete and the caller has said yes.
//!
//! Scheduling consults the availability backend; triage runs a fixed
//! symptom and urgency table. The table is deliberately conservative:
//! anything that reads as cardiac or respiratory goes to a human no matter
//! what urgency the caller reported.

use crate::availability::AvailabilityBackend;
use once_cell::sync::Lazy;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of a confirmed scheduling flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked,
    /// The window filled up between selection and confirmation.
    WindowUnavailable,
}

/// Outcome of a confirmed triage flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageDisposition {
    /// Transfer to nursing staff immediately.
    EscalateNow,
    /// Not urgent, but worth an appointment; hand back to scheduling.
    ScheduleVisit,
    /// Self-care advice and a graceful goodbye.
    SelfCare,
}

/// Symptoms that always escalate, regardless of reported urgency.
static ALWAYS_ESCALATE_SYMPTOMS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["chest pain", "difficulty breathing", "shortness of breath"]
        .into_iter()
        .collect()
});

pub struct DecisionLogic {
    availability: Arc<dyn AvailabilityBackend>,
}

impl DecisionLogic {
    pub fn new(availability: Arc<dyn AvailabilityBackend>) -> Self {
        Self { availability }
    }

    /// Book the confirmed window, re-checking availability at commit time.
    /// Backend failures read as "unavailable": the caller gets the re-prompt
    /// path instead of a raw error.
    pub async fn decide_booking(&self, provider: &str, window: &str) -> BookingOutcome {
        let available = match self.availability.check_availability(window).await {
            Ok(available) => available,
            Err(e) => {
                warn!(window, error = %e, "availability check failed");
                false
            }
        };
        if !available {
            warn!(provider, window, "confirmed window no longer available");
            return BookingOutcome::WindowUnavailable;
        }
        match self.availability.book(provider, window).await {
            Ok(()) => BookingOutcome::Booked,
            // Lost the race for the last opening, or the backend fell over.
            Err(e) => {
                warn!(provider, window, error = %e, "booking failed");
                BookingOutcome::WindowUnavailable
            }
        }
    }

    /// Map a confirmed symptom and urgency to a disposition.
    pub fn decide_triage(&self, symptom: &str, urgency: &str) -> TriageDisposition {
        let symptom_lower = symptom.to_lowercase();
        if ALWAYS_ESCALATE_SYMPTOMS
            .iter()
            .any(|pinned| symptom_lower.contains(pinned))
        {
            info!(symptom, "symptom pinned to escalation");
            return TriageDisposition::EscalateNow;
        }

        match urgency.to_lowercase().as_str() {
            "high" => TriageDisposition::EscalateNow,
            "moderate" => TriageDisposition::ScheduleVisit,
            _ => TriageDisposition::SelfCare,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use carecall_common::CallError;

    struct FixedAvailability {
        available: bool,
    }

    #[async_trait]
    impl AvailabilityBackend for FixedAvailability {
        async fn check_availability(&self, _window: &str) -> Result<bool, CallError> {
            Ok(self.available)
        }

        async fn book(&self, _provider: &str, _window: &str) -> Result<(), CallError> {
            if self.available {
                Ok(())
            } else {
                Err(CallError::Availability("full".into()))
            }
        }
    }

    fn logic(available: bool) -> DecisionLogic {
        DecisionLogic::new(Arc::new(FixedAvailability { available }))
    }

    #[tokio::test]
    async fn open_window_books() {
        let outcome = logic(true)
            .decide_booking("Dr. Smith", "tuesday morning")
            .await;
        assert_eq!(outcome, BookingOutcome::Booked);
    }

    #[tokio::test]
    async fn full_window_reports_unavailable() {
        let outcome = logic(false)
            .decide_booking("Dr. Smith", "tuesday morning")
            .await;
        assert_eq!(outcome, BookingOutcome::WindowUnavailable);
    }

    #[test]
    fn high_urgency_escalates() {
        assert_eq!(
            logic(true).decide_triage("fever", "high"),
            TriageDisposition::EscalateNow
        );
    }

    #[test]
    fn chest_pain_escalates_even_at_low_urgency() {
        assert_eq!(
            logic(true).decide_triage("chest pain", "low"),
            TriageDisposition::EscalateNow
        );
    }

    #[test]
    fn moderate_urgency_routes_to_scheduling() {
        assert_eq!(
            logic(true).decide_triage("sore throat", "moderate"),
            TriageDisposition::ScheduleVisit
        );
    }

    #[test]
    fn low_urgency_gets_self_care() {
        assert_eq!(
            logic(true).decide_triage("runny nose", "low"),
            TriageDisposition::SelfCare
        );
    }
}
