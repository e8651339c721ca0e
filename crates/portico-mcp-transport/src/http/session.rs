//! HTTP session table and per-session SSE replay buffers.
//!
//! Sessions are values keyed by opaque id in a table owned by the HTTP
//! transport. Each session carries a monotonically numbered event log:
//! a bounded replay window (count and bytes) plus a broadcast channel
//! for live delivery. A reconnecting client presents `Last-Event-ID`;
//! events still in the window are replayed in original order, and a
//! request older than the window yields [`ReplayOutcome::Gone`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, trace};

use portico_mcp_auth::AuthPrincipal;
use portico_mcp_core::ids::generate_session_id;

/// One server-sent event: monotonic id plus serialized message data.
#[derive(Debug, Clone)]
pub struct SseEvent {
    pub id: u64,
    pub data: String,
}

/// Result of a resume attempt.
pub enum ReplayOutcome {
    /// Replay these events, then continue live.
    Events(Vec<SseEvent>),
    /// The requested position was evicted from the window; the client
    /// must re-establish state at the protocol level.
    Gone,
}

/// Per-session state.
pub struct Session {
    pub id: String,
    pub created_at: SystemTime,
    pub last_active_at: Instant,
    pub origin: Option<String>,
    pub principal: Option<AuthPrincipal>,
    next_event_id: u64,
    replay: VecDeque<SseEvent>,
    replay_bytes: usize,
    live: broadcast::Sender<SseEvent>,
}

impl Session {
    fn new(id: String, origin: Option<String>) -> Self {
        let (live, _) = broadcast::channel(256);
        Self {
            id,
            created_at: SystemTime::now(),
            last_active_at: Instant::now(),
            origin,
            principal: None,
            next_event_id: 1,
            replay: VecDeque::new(),
            replay_bytes: 0,
            live,
        }
    }

    /// Append an event: number it, add it to the replay window
    /// (evicting the oldest entries past the limits), and broadcast to
    /// live streams.
    pub fn push_event(&mut self, data: String, max_events: usize, max_bytes: usize) -> u64 {
        let event = SseEvent {
            id: self.next_event_id,
            data,
        };
        self.next_event_id += 1;
        self.replay_bytes += event.data.len();
        self.replay.push_back(event.clone());
        while self.replay.len() > max_events || self.replay_bytes > max_bytes {
            if let Some(evicted) = self.replay.pop_front() {
                self.replay_bytes -= evicted.data.len();
            } else {
                break;
            }
        }
        let _ = self.live.send(event.clone());
        trace!(session = %self.id, event = event.id, "event appended");
        event.id
    }

    /// Resume after `last_event_id` (0 means "from the beginning").
    pub fn replay_from(&self, last_event_id: u64) -> ReplayOutcome {
        let first_available = self
            .replay
            .front()
            .map(|e| e.id)
            .unwrap_or(self.next_event_id);
        if last_event_id + 1 < first_available {
            return ReplayOutcome::Gone;
        }
        let events = self
            .replay
            .iter()
            .filter(|e| e.id > last_event_id)
            .cloned()
            .collect();
        ReplayOutcome::Events(events)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SseEvent> {
        self.live.subscribe()
    }

    pub fn touch(&mut self) {
        self.last_active_at = Instant::now();
    }
}

/// Limits for session replay windows.
#[derive(Debug, Clone, Copy)]
pub struct ReplayLimits {
    pub max_events: usize,
    pub max_bytes: usize,
}

impl Default for ReplayLimits {
    fn default() -> Self {
        Self {
            max_events: 1024,
            max_bytes: 1024 * 1024,
        }
    }
}

/// The session table. Per-session operations serialize on the session
/// mutex; cross-session operations share no lock beyond the map.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
    limits: ReplayLimits,
    idle_timeout: Duration,
}

impl SessionStore {
    pub fn new(limits: ReplayLimits, idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            limits,
            idle_timeout,
        }
    }

    /// Create a session with a server-assigned id.
    pub async fn create(&self, origin: Option<String>) -> String {
        let id = generate_session_id();
        let session = Session::new(id.clone(), origin);
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(session)));
        debug!(session = %id, "session created");
        id
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            debug!(session = %id, "session removed");
        }
        removed
    }

    /// Append an event to a session's stream.
    pub async fn push_event(&self, id: &str, data: String) -> Option<u64> {
        let session = self.get(id).await?;
        let mut session = session.lock().await;
        session.touch();
        Some(session.push_event(data, self.limits.max_events, self.limits.max_bytes))
    }

    /// Drop sessions idle longer than the configured timeout.
    pub async fn sweep_idle(&self) -> usize {
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                let session = session.lock().await;
                if session.last_active_at.elapsed() > self.idle_timeout {
                    expired.push(id.clone());
                }
            }
        }
        let mut sessions = self.sessions.write().await;
        for id in &expired {
            sessions.remove(id);
            debug!(session = %id, "idle session swept");
        }
        expired.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits(max_events: usize, max_bytes: usize) -> ReplayLimits {
        ReplayLimits {
            max_events,
            max_bytes,
        }
    }

    #[tokio::test]
    async fn create_and_remove() {
        let store = SessionStore::new(ReplayLimits::default(), Duration::from_secs(300));
        let id = store.create(None).await;
        assert!(store.get(&id).await.is_some());
        assert!(store.remove(&id).await);
        assert!(!store.remove(&id).await);
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn event_ids_are_monotonic() {
        let store = SessionStore::new(ReplayLimits::default(), Duration::from_secs(300));
        let id = store.create(None).await;
        let a = store.push_event(&id, "one".to_string()).await.unwrap();
        let b = store.push_event(&id, "two".to_string()).await.unwrap();
        assert_eq!(a + 1, b);
    }

    #[tokio::test]
    async fn replay_returns_exactly_the_missed_events_in_order() {
        let store = SessionStore::new(ReplayLimits::default(), Duration::from_secs(300));
        let id = store.create(None).await;
        for n in 1..=5 {
            store.push_event(&id, format!("event-{n}")).await.unwrap();
        }
        let session = store.get(&id).await.unwrap();
        let session = session.lock().await;
        match session.replay_from(2) {
            ReplayOutcome::Events(events) => {
                let ids: Vec<u64> = events.iter().map(|e| e.id).collect();
                assert_eq!(ids, vec![3, 4, 5]);
                assert_eq!(events[0].data, "event-3");
            }
            ReplayOutcome::Gone => panic!("events should still be buffered"),
        }
    }

    #[tokio::test]
    async fn eviction_by_count_makes_old_ids_gone() {
        let store = SessionStore::new(limits(3, usize::MAX), Duration::from_secs(300));
        let id = store.create(None).await;
        for n in 1..=6 {
            store.push_event(&id, format!("event-{n}")).await.unwrap();
        }
        let session = store.get(&id).await.unwrap();
        let session = session.lock().await;
        // Events 1..=3 were evicted; resuming from 1 cannot replay 2.
        assert!(matches!(session.replay_from(1), ReplayOutcome::Gone));
        // Resuming from 3 can replay 4..=6.
        match session.replay_from(3) {
            ReplayOutcome::Events(events) => {
                assert_eq!(events.iter().map(|e| e.id).collect::<Vec<_>>(), vec![4, 5, 6]);
            }
            ReplayOutcome::Gone => panic!("4..=6 should be available"),
        }
    }

    #[tokio::test]
    async fn eviction_by_bytes() {
        let store = SessionStore::new(limits(usize::MAX, 10), Duration::from_secs(300));
        let id = store.create(None).await;
        store.push_event(&id, "aaaaaaaa".to_string()).await.unwrap(); // 8 bytes
        store.push_event(&id, "bbbbbbbb".to_string()).await.unwrap(); // evicts the first
        let session = store.get(&id).await.unwrap();
        let session = session.lock().await;
        assert!(matches!(session.replay_from(0), ReplayOutcome::Gone));
    }

    #[tokio::test]
    async fn up_to_date_client_gets_empty_replay() {
        let store = SessionStore::new(ReplayLimits::default(), Duration::from_secs(300));
        let id = store.create(None).await;
        store.push_event(&id, "one".to_string()).await.unwrap();
        let session = store.get(&id).await.unwrap();
        let session = session.lock().await;
        match session.replay_from(1) {
            ReplayOutcome::Events(events) => assert!(events.is_empty()),
            ReplayOutcome::Gone => panic!("current position is never gone"),
        }
    }

    #[tokio::test]
    async fn idle_sweep() {
        let store = SessionStore::new(ReplayLimits::default(), Duration::from_millis(10));
        let id = store.create(None).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.sweep_idle().await, 1);
        assert!(store.get(&id).await.is_none());
    }

    #[tokio::test]
    async fn live_subscription_receives_new_events() {
        let store = SessionStore::new(ReplayLimits::default(), Duration::from_secs(300));
        let id = store.create(None).await;
        let session = store.get(&id).await.unwrap();
        let mut receiver = session.lock().await.subscribe();
        store.push_event(&id, "live".to_string()).await.unwrap();
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.data, "live");
    }
}
