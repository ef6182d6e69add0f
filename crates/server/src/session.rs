//! Session management
//!
//! Maps client-supplied stream ids to live decoding sessions. Each session
//! binds one stream handle and an activity timestamp; a background reaper
//! evicts sessions idle past the configured threshold and returns their
//! handles to the pool.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{watch, OwnedMutexGuard};
use w2lserve_config::SessionConfig;
use w2lserve_engine::StreamHandle;

use crate::pool::HandlePool;

/// Session state
pub struct Session {
    /// Client-supplied stream id
    pub client_id: String,
    /// Stream handle inside the engine
    pub handle: StreamHandle,
    /// Last activity
    last_active: RwLock<Instant>,
    /// Cleared when the session is evicted
    active: RwLock<bool>,
    /// Serializes engine calls for this handle. The engine keeps per-handle
    /// state across calls; two concurrent calls on one handle corrupt it.
    decode_lock: Arc<tokio::sync::Mutex<()>>,
}

impl Session {
    fn new(client_id: impl Into<String>, handle: StreamHandle) -> Self {
        Self {
            client_id: client_id.into(),
            handle,
            last_active: RwLock::new(Instant::now()),
            active: RwLock::new(true),
            decode_lock: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    /// Update last activity. `Instant` is monotonic, so the timestamp never
    /// moves backwards.
    pub fn touch(&self) {
        *self.last_active.write() = Instant::now();
    }

    /// Last activity timestamp
    pub fn last_active(&self) -> Instant {
        *self.last_active.read()
    }

    /// Was this session's last activity strictly before `cutoff`?
    pub fn idle_since(&self, cutoff: Instant) -> bool {
        *self.last_active.read() < cutoff
    }

    /// Is the session still registered?
    pub fn is_active(&self) -> bool {
        *self.active.read()
    }

    fn close(&self) {
        *self.active.write() = false;
    }

    /// Acquire the per-handle decode lock, waiting for any in-flight call.
    ///
    /// After acquisition the caller must re-check [`Session::is_active`]:
    /// the reaper may have evicted the session in the meantime, in which
    /// case the handle is no longer this session's to use.
    pub async fn begin_decode(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.decode_lock).lock_owned().await
    }

    fn try_begin_decode(&self) -> Option<OwnedMutexGuard<()>> {
        Arc::clone(&self.decode_lock).try_lock_owned().ok()
    }
}

struct RegistryInner {
    sessions: HashMap<String, Arc<Session>>,
    pool: HandlePool,
}

/// Session registry
///
/// Owns the handle pool: one mutex covers the id map and the pool, so
/// get-or-create is atomic for concurrent first requests with the same id —
/// no duplicate sessions and no leaked handles.
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    idle_timeout: Duration,
    reap_interval: Duration,
}

impl SessionRegistry {
    /// Create a registry with the configured lifecycle parameters
    pub fn new(config: &SessionConfig) -> Self {
        Self::with_timeouts(
            Duration::from_secs(config.idle_timeout_secs),
            Duration::from_secs(config.reap_interval_secs),
        )
    }

    /// Create a registry with explicit timeouts
    pub fn with_timeouts(idle_timeout: Duration, reap_interval: Duration) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                sessions: HashMap::new(),
                pool: HandlePool::new(),
            }),
            idle_timeout,
            reap_interval,
        }
    }

    /// Return the live session for `client_id`, refreshing its activity, or
    /// create one with a freshly allocated handle.
    pub fn get_or_create(&self, client_id: &str) -> Arc<Session> {
        let mut inner = self.inner.lock();

        if let Some(session) = inner.sessions.get(client_id) {
            session.touch();
            return Arc::clone(session);
        }

        let handle = inner.pool.allocate();
        let session = Arc::new(Session::new(client_id, handle));
        inner.sessions.insert(client_id.to_string(), Arc::clone(&session));

        tracing::debug!(client_id, handle, "created session");

        session
    }

    /// Look up a session without touching it
    pub fn get(&self, client_id: &str) -> Option<Arc<Session>> {
        self.inner.lock().sessions.get(client_id).cloned()
    }

    /// Remove every session whose last activity is strictly older than
    /// `cutoff` and whose decode lock is uncontended, returning its handle
    /// to the pool. Sessions with a decode in flight are skipped this pass;
    /// a handle is never released while a call using it is outstanding.
    pub fn evict_idle_since(&self, cutoff: Instant) -> Vec<Arc<Session>> {
        let mut inner = self.inner.lock();

        let expired: Vec<String> = inner
            .sessions
            .iter()
            .filter(|(_, session)| session.idle_since(cutoff))
            .map(|(id, _)| id.clone())
            .collect();

        let mut evicted = Vec::new();
        for id in expired {
            let Some(session) = inner.sessions.get(&id).cloned() else {
                continue;
            };
            let Some(_decode_guard) = session.try_begin_decode() else {
                continue;
            };
            // Holding the decode lock: no call is in flight and none can
            // start on this session once `active` is cleared.
            inner.sessions.remove(&id);
            session.close();
            inner.pool.release(session.handle);
            tracing::debug!(client_id = %id, handle = session.handle, "evicted idle session");
            evicted.push(session);
        }

        evicted
    }

    /// Live session count
    pub fn count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    /// Start the background reaper task.
    ///
    /// Runs on a fixed interval decoupled from request traffic; passes are
    /// serialized by construction (a single task, sequential awaits).
    /// Returns a shutdown sender that stops the task.
    pub fn start_reaper(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.reap_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(cutoff) = Instant::now().checked_sub(registry.idle_timeout) else {
                            continue;
                        };
                        let evicted = registry.evict_idle_since(cutoff);
                        if !evicted.is_empty() {
                            tracing::info!(
                                "reaped {} idle sessions ({} remaining)",
                                evicted.len(),
                                registry.count()
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session reaper shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_registry() -> SessionRegistry {
        SessionRegistry::with_timeouts(Duration::from_secs(30), Duration::from_secs(5))
    }

    #[test]
    fn test_get_or_create_assigns_first_handle() {
        let registry = test_registry();
        let session = registry.get_or_create("alice");

        assert_eq!(session.handle, 0);
        assert_eq!(session.client_id, "alice");
        assert!(session.is_active());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_get_or_create_reuses_session() {
        let registry = test_registry();
        let first = registry.get_or_create("alice");
        let before = first.last_active();

        let second = registry.get_or_create("alice");
        assert_eq!(second.handle, first.handle);
        assert_eq!(registry.count(), 1);
        assert!(second.last_active() >= before);
    }

    #[test]
    fn test_distinct_ids_get_distinct_handles() {
        let registry = test_registry();
        let alice = registry.get_or_create("alice");
        let bob = registry.get_or_create("bob");

        assert_ne!(alice.handle, bob.handle);
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn test_concurrent_get_or_create_single_session() {
        let registry = Arc::new(test_registry());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || registry.get_or_create("alice").handle)
            })
            .collect();

        let observed: Vec<StreamHandle> =
            handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(registry.count(), 1);
        assert!(observed.iter().all(|&h| h == observed[0]));
    }

    #[test]
    fn test_touch_is_monotonic() {
        let registry = test_registry();
        let session = registry.get_or_create("alice");

        let mut previous = session.last_active();
        for _ in 0..10 {
            session.touch();
            let current = session.last_active();
            assert!(current >= previous);
            previous = current;
        }
    }

    #[test]
    fn test_evicts_idle_sessions_only() {
        let registry = test_registry();
        let idle = registry.get_or_create("idle");

        // A cutoff strictly after `idle`'s timestamp makes it eligible;
        // `fresh` is created after the cutoff and stays.
        std::thread::sleep(Duration::from_millis(5));
        let cutoff = Instant::now();
        let fresh = registry.get_or_create("fresh");
        fresh.touch();

        let evicted = registry.evict_idle_since(cutoff);
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].client_id, "idle");
        assert!(!idle.is_active());
        assert_eq!(registry.count(), 1);
        assert!(registry.get("fresh").is_some());
    }

    #[test]
    fn test_evicted_handle_is_reallocatable() {
        let registry = test_registry();
        let alice = registry.get_or_create("alice");
        let handle = alice.handle;

        // A future cutoff makes every quiescent session eligible
        let evicted = registry.evict_idle_since(Instant::now() + Duration::from_secs(1));
        assert_eq!(evicted.len(), 1);

        // bob may now receive alice's old handle
        let bob = registry.get_or_create("bob");
        assert_eq!(bob.handle, handle);
    }

    #[tokio::test]
    async fn test_busy_session_is_not_evicted() {
        let registry = test_registry();
        let session = registry.get_or_create("alice");

        let cutoff = Instant::now() + Duration::from_secs(1);
        let guard = session.begin_decode().await;
        let evicted = registry.evict_idle_since(cutoff);
        assert!(evicted.is_empty());
        assert!(session.is_active());
        assert_eq!(registry.count(), 1);

        drop(guard);
        let evicted = registry.evict_idle_since(cutoff);
        assert_eq!(evicted.len(), 1);
    }

    #[tokio::test]
    async fn test_reaper_task_evicts() {
        let registry = Arc::new(SessionRegistry::with_timeouts(
            Duration::from_millis(20),
            Duration::from_millis(10),
        ));
        registry.get_or_create("alice");

        let shutdown = registry.start_reaper();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.count(), 0);

        let _ = shutdown.send(true);
    }
}
