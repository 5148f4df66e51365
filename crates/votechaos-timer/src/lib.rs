//! Round deadlines for VoteChaos.
//!
//! [`RoundTimers`] holds at most one pending one-shot deadline per key
//! (a room code). Scheduling a deadline for a key that already has one
//! aborts the old one first, so a room can never have two timers in flight.
//!
//! A timer does not resolve anything itself. When it fires it runs the
//! caller's `on_expire` future, which the room engine uses to enqueue a
//! `TimerExpired` command on the room's own serialized queue:
//!
//! ```ignore
//! timers.schedule(code.clone(), round_length, move |token| async move {
//!     let _ = handle.timer_expired(token).await;
//! });
//! ```
//!
//! Every scheduled deadline gets a fresh [`TimerToken`]. The engine can
//! compare the token carried by an expiry against the one it armed and
//! ignore anything stale.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

// ---------------------------------------------------------------------------
// TimerToken
// ---------------------------------------------------------------------------

/// Identifies one scheduled deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

impl TimerToken {
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// RoundTimers
// ---------------------------------------------------------------------------

struct Pending {
    token: TimerToken,
    handle: JoinHandle<()>,
}

/// One pending deadline per key. Cheap to clone; clones share the same table.
pub struct RoundTimers<K> {
    pending: Arc<Mutex<HashMap<K, Pending>>>,
    next_token: Arc<AtomicU64>,
}

impl<K> Clone for RoundTimers<K> {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
            next_token: Arc::clone(&self.next_token),
        }
    }
}

impl<K> Default for RoundTimers<K> {
    fn default() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_token: Arc::new(AtomicU64::new(1)),
        }
    }
}

impl<K> RoundTimers<K>
where
    K: Eq + Hash + Clone + fmt::Display + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a deadline `after` from now for `key`, replacing any existing one.
    ///
    /// When the deadline elapses the entry is removed from the table and
    /// `on_expire` runs on its own task. A replaced or cancelled timer never
    /// runs its callback.
    pub fn schedule<F, Fut>(&self, key: K, after: Duration, on_expire: F) -> TimerToken
    where
        F: FnOnce(TimerToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = TimerToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let deadline = Instant::now() + after;

        // The table lock is held across spawn + insert so the task cannot
        // look itself up before its entry exists.
        let mut pending = self.lock();
        if let Some(old) = pending.remove(&key) {
            old.handle.abort();
            debug!(key = %key, replaced = %old.token, "replaced round timer");
        }

        let table = Arc::clone(&self.pending);
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            let still_current = {
                let mut table = table.lock().unwrap_or_else(PoisonError::into_inner);
                match table.get(&task_key) {
                    Some(entry) if entry.token == token => {
                        table.remove(&task_key);
                        true
                    }
                    _ => false,
                }
            };
            if still_current {
                trace!(key = %task_key, %token, "round timer fired");
                on_expire(token).await;
            }
        });

        pending.insert(
            key.clone(),
            Pending { token, handle },
        );
        debug!(key = %key, %token, after_ms = after.as_millis() as u64, "armed round timer");
        token
    }

    /// Cancels the pending deadline for `key`. Returns `true` if one existed.
    pub fn cancel(&self, key: &K) -> bool {
        match self.lock().remove(key) {
            Some(old) => {
                old.handle.abort();
                debug!(key = %key, token = %old.token, "cancelled round timer");
                true
            }
            None => false,
        }
    }

    /// Cancels the deadline for `key` only if it is still `token`.
    ///
    /// Used after a resolution so that a timer armed by a later round is
    /// left alone.
    pub fn clear(&self, key: &K, token: TimerToken) -> bool {
        let mut pending = self.lock();
        match pending.get(key) {
            Some(entry) if entry.token == token => {
                if let Some(old) = pending.remove(key) {
                    old.handle.abort();
                }
                true
            }
            _ => false,
        }
    }

    /// The token of the pending deadline for `key`, if any.
    pub fn current(&self, key: &K) -> Option<TimerToken> {
        self.lock().get(key).map(|p| p.token)
    }

    /// Returns `true` if `key` has a pending deadline.
    pub fn is_pending(&self, key: &K) -> bool {
        self.lock().contains_key(key)
    }

    /// Number of pending deadlines.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Aborts every pending deadline.
    pub fn cancel_all(&self) {
        let mut pending = self.lock();
        for (_, entry) in pending.drain() {
            entry.handle.abort();
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, Pending>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
