//! Session Store (S).
//!
//! Backed by `dashmap::DashMap`, sharded by call id. A background sweep task evicts
//! sessions past their TTL; within a single call, F is the only writer, so no extra
//! per-key locking is needed on top of the map's own sharded locks.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use crate::constants::SESSION_TTL_SECS;
use crate::domain::{CallId, CallSession};

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<DashMap<CallId, CallSession>>,
    ttl_secs: i64,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl_secs: SESSION_TTL_SECS,
        }
    }

    pub fn with_ttl_secs(ttl_secs: i64) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            ttl_secs,
        }
    }

    pub fn get(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.get(call_id).map(|entry| entry.clone())
    }

    pub fn put(&self, session: CallSession) {
        self.sessions.insert(session.id.clone(), session);
    }

    pub fn delete(&self, call_id: &str) {
        self.sessions.remove(call_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Spawn the background TTL sweep. Returns the task handle so the caller can abort it
    /// on shutdown.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let sessions = self.sessions.clone();
        let ttl_secs = self.ttl_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Utc::now();
                let expired: Vec<CallId> = sessions
                    .iter()
                    .filter(|entry| (now - entry.last_event_at).num_seconds() > ttl_secs)
                    .map(|entry| entry.id.clone())
                    .collect();
                for call_id in &expired {
                    sessions.remove(call_id);
                }
                if !expired.is_empty() {
                    info!("session sweep evicted {} expired call(s)", expired.len());
                } else {
                    debug!("session sweep: nothing to evict");
                }
            }
        })
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::Phase;

    fn sample_session(id: &str) -> CallSession {
        CallSession {
            id: id.to_string(),
            provider_id: "prov-1".to_string(),
            caller_phone: "+61491570006".to_string(),
            authenticated_employee_id: None,
            selected_occurrence_id: None,
            phase: Phase::Greeting,
            attempt_count: 0,
            transcript: Vec::new(),
            created_at: Utc::now(),
            last_event_at: Utc::now(),
            scratch: Default::default(),
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let store = SessionStore::new();
        store.put(sample_session("call-1"));
        assert!(store.get("call-1").is_some());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn delete_removes_the_session() {
        let store = SessionStore::new();
        store.put(sample_session("call-1"));
        store.delete("call-1");
        assert!(store.get("call-1").is_none());
    }

    #[tokio::test]
    async fn sweeper_evicts_expired_sessions() {
        let store = SessionStore::with_ttl_secs(0);
        let mut session = sample_session("call-1");
        session.last_event_at = Utc::now() - chrono::Duration::seconds(5);
        store.put(session);

        let handle = store.spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(store.get("call-1").is_none());
    }
}
