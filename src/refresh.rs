use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Registry of refreshes currently in flight, keyed by cache key.
///
/// At most one refresh runs per key: the caller that claims the slot does
/// the work while concurrent callers either serve what they have or wait
/// for the winner. The tracker is shared state owned by the gateway, not a
/// process-wide global, so independent gateways never contend.
#[derive(Default)]
pub struct RefreshTracker {
    in_flight: Mutex<HashMap<String, Arc<Notify>>>,
}

impl RefreshTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the refresh slot for a key.
    ///
    /// Returns `None` when another refresh already holds it. The returned
    /// guard releases the slot and wakes waiters when dropped, including
    /// on panic or cancellation.
    pub fn begin(self: &Arc<Self>, key: &str) -> Option<RefreshGuard> {
        let mut map = self.lock_map();
        if map.contains_key(key) {
            return None;
        }
        map.insert(key.to_string(), Arc::new(Notify::new()));
        Some(RefreshGuard {
            tracker: Arc::clone(self),
            key: key.to_string(),
        })
    }

    /// Wait until the in-flight refresh for a key settles.
    ///
    /// Returns true when the slot is free, either immediately or within
    /// the timeout; false when the wait timed out.
    pub async fn wait_for(&self, key: &str, timeout: Duration) -> bool {
        let notify = {
            let map = self.lock_map();
            match map.get(key) {
                Some(notify) => Arc::clone(notify),
                None => return true,
            }
        };
        let notified = notify.notified();
        tokio::pin!(notified);
        // Register interest before re-checking, so a guard dropped between
        // the check and the await still wakes this waiter.
        notified.as_mut().enable();
        if !self.is_in_flight(key) {
            return true;
        }
        tokio::time::timeout(timeout, notified).await.is_ok()
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock_map().contains_key(key)
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock_map().len()
    }

    fn lock_map(&self) -> MutexGuard<'_, HashMap<String, Arc<Notify>>> {
        // Held only for map access, never across an await.
        self.in_flight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Exclusive claim on one key's refresh slot.
pub struct RefreshGuard {
    tracker: Arc<RefreshTracker>,
    key: String,
}

impl RefreshGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        let mut map = self.tracker.lock_map();
        if let Some(notify) = map.remove(&self.key) {
            notify.notify_waiters();
        }
    }
}
