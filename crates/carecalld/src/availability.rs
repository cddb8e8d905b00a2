//! Appointment availability behind a trait so deployments can swap the
//! built-in schedule for a practice-management system.

use async_trait::async_trait;
use carecall_common::config::CatalogConfig;
use carecall_common::CallError;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

#[async_trait]
pub trait AvailabilityBackend: Send + Sync {
    /// Whether the named window still has a bookable opening.
    async fn check_availability(&self, window: &str) -> Result<bool, CallError>;

    /// Consume one opening in the named window. Fails when the window sold
    /// out between the availability check and the booking.
    async fn book(&self, provider: &str, window: &str) -> Result<(), CallError>;
}

/// In-memory schedule seeded from the configured window capacities.
///
/// Good enough for a single clinic line; a real deployment implements
/// [`AvailabilityBackend`] against its scheduling system instead.
pub struct InMemorySchedule {
    remaining: Mutex<HashMap<String, u32>>,
}

impl InMemorySchedule {
    pub fn from_config(config: &CatalogConfig) -> Self {
        let remaining = config
            .windows
            .iter()
            .map(|w| (w.name.to_lowercase(), w.capacity))
            .collect();
        Self {
            remaining: Mutex::new(remaining),
        }
    }
}

#[async_trait]
impl AvailabilityBackend for InMemorySchedule {
    async fn check_availability(&self, window: &str) -> Result<bool, CallError> {
        let remaining = self.remaining.lock().await;
        Ok(remaining
            .get(&window.to_lowercase())
            .map(|n| *n > 0)
            .unwrap_or(false))
    }

    async fn book(&self, provider: &str, window: &str) -> Result<(), CallError> {
        let mut remaining = self.remaining.lock().await;
        let key = window.to_lowercase();
        match remaining.get_mut(&key) {
            Some(n) if *n > 0 => {
                *n -= 1;
                info!(provider, window, remaining = *n, "appointment booked");
                Ok(())
            }
            _ => Err(CallError::Availability(format!(
                "no openings left in {}",
                window
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carecall_common::config::WindowDef;

    fn schedule(capacity: u32) -> InMemorySchedule {
        InMemorySchedule::from_config(&CatalogConfig {
            windows: vec![WindowDef {
                name: "Tuesday Morning".into(),
                aliases: vec![],
                capacity,
            }],
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn booking_consumes_capacity() {
        let schedule = schedule(1);
        assert!(schedule.check_availability("tuesday morning").await.unwrap());
        schedule.book("Dr. Smith", "tuesday morning").await.unwrap();
        assert!(!schedule.check_availability("tuesday morning").await.unwrap());
    }

    #[tokio::test]
    async fn booking_a_full_window_fails() {
        let schedule = schedule(0);
        let err = schedule.book("Dr. Smith", "Tuesday Morning").await;
        assert!(matches!(err, Err(CallError::Availability(_))));
    }

    #[tokio::test]
    async fn unknown_window_is_unavailable() {
        let schedule = schedule(3);
        assert!(!schedule.check_availability("friday evening").await.unwrap());
    }
}
