//! In-memory session store, one entry per phone call.
//!
//! Concurrency model: a read-write map from call id to a per-call mutex.
//! Turns for different calls run in parallel; turns for the same call are
//! serialized on that call's lock, so a webhook retry can never interleave
//! with the turn it duplicates.

use carecall_common::config::SessionConfig;
use carecall_common::{CallSession, DialogueState, TerminalState};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<CallSession>>>>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Fetch the session for a call, creating it on the first turn.
    pub async fn get_or_create(&self, call_id: &str) -> Arc<Mutex<CallSession>> {
        {
            let sessions = self.sessions.read().await;
            if let Some(session) = sessions.get(call_id) {
                return Arc::clone(session);
            }
        }

        let mut sessions = self.sessions.write().await;
        // Re-check under the write lock; another turn may have won the race.
        Arc::clone(
            sessions
                .entry(call_id.to_string())
                .or_insert_with(|| {
                    debug!(call_id, "new call session");
                    Arc::new(Mutex::new(CallSession::new(call_id)))
                }),
        )
    }

    pub async fn get(&self, call_id: &str) -> Option<Arc<Mutex<CallSession>>> {
        self.sessions.read().await.get(call_id).map(Arc::clone)
    }

    /// Telephony signaled hangup. A call that was still mid-conversation
    /// becomes Abandoned; completed calls keep their terminal state.
    pub async fn end_call(&self, call_id: &str) -> bool {
        let handle = match self.get(call_id).await {
            Some(handle) => handle,
            None => return false,
        };
        let mut session = handle.lock().await;
        if !session.is_terminal() {
            session.state = DialogueState::Terminal(TerminalState::Abandoned);
            session.touch();
            info!(call_id, "call abandoned by caller");
        }
        true
    }

    /// Drop sessions whose last activity is older than the retention
    /// window. Terminal and stalled calls alike; a stalled call past
    /// retention is as over as a finished one.
    pub async fn evict_expired(&self) -> usize {
        let cutoff = Utc::now() - chrono::Duration::seconds(self.config.retention_secs as i64);

        // Snapshot the handles first. Awaiting a session mutex while
        // holding the map lock would let one slow turn stall every other
        // call's turns behind a queued writer.
        let snapshot: Vec<(String, Arc<Mutex<CallSession>>)> = self
            .sessions
            .read()
            .await
            .iter()
            .map(|(call_id, handle)| (call_id.clone(), Arc::clone(handle)))
            .collect();

        let mut expired = Vec::new();
        for (call_id, handle) in snapshot {
            // A session we cannot lock is mid-turn, hence not idle.
            if let Ok(session) = handle.try_lock() {
                if session.last_updated_at < cutoff {
                    expired.push(call_id);
                }
            }
        }
        if expired.is_empty() {
            return 0;
        }

        let mut sessions = self.sessions.write().await;
        for call_id in &expired {
            sessions.remove(call_id);
        }
        info!(evicted = expired.len(), "expired sessions swept");
        expired.len()
    }

    pub async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.config.sweep_interval_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(retention_secs: u64) -> SessionStore {
        SessionStore::new(SessionConfig {
            retention_secs,
            sweep_interval_secs: 60,
        })
    }

    #[tokio::test]
    async fn same_call_id_returns_same_session() {
        let store = store(900);
        let a = store.get_or_create("call-1").await;
        let b = store.get_or_create("call-1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.active_count().await, 1);
    }

    #[tokio::test]
    async fn hangup_marks_live_call_abandoned() {
        let store = store(900);
        store.get_or_create("call-1").await;
        assert!(store.end_call("call-1").await);

        let session = store.get("call-1").await.unwrap();
        let session = session.lock().await;
        assert_eq!(
            session.state,
            DialogueState::Terminal(TerminalState::Abandoned)
        );
    }

    #[tokio::test]
    async fn hangup_keeps_existing_terminal_state() {
        let store = store(900);
        {
            let handle = store.get_or_create("call-1").await;
            let mut session = handle.lock().await;
            session.state = DialogueState::Terminal(TerminalState::Booked);
        }
        store.end_call("call-1").await;

        let handle = store.get("call-1").await.unwrap();
        let session = handle.lock().await;
        assert_eq!(session.state, DialogueState::Terminal(TerminalState::Booked));
    }

    #[tokio::test]
    async fn ending_an_unknown_call_is_reported() {
        let store = store(900);
        assert!(!store.end_call("no-such-call").await);
    }

    #[tokio::test]
    async fn sweep_skips_sessions_that_are_mid_turn() {
        let store = store(0);
        let handle = store.get_or_create("call-1").await;
        {
            let mut session = handle.lock().await;
            session.last_updated_at = Utc::now() - chrono::Duration::seconds(5);
        }

        // While a turn holds the session lock, the sweep leaves it alone.
        let guard = handle.lock().await;
        assert_eq!(store.evict_expired().await, 0);
        assert_eq!(store.active_count().await, 1);

        drop(guard);
        assert_eq!(store.evict_expired().await, 1);
        assert_eq!(store.active_count().await, 0);
    }

    #[tokio::test]
    async fn stale_sessions_are_evicted() {
        let store = store(0);
        {
            let handle = store.get_or_create("call-1").await;
            let mut session = handle.lock().await;
            session.last_updated_at = Utc::now() - chrono::Duration::seconds(5);
        }
        assert_eq!(store.evict_expired().await, 1);
        assert_eq!(store.active_count().await, 0);
    }
}
