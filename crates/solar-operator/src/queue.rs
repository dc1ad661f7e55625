//! Work queue of resource keys.
//!
//! Guarantees the controller relies on:
//! - a key is handed to at most one worker at a time; adding it while it is being processed
//!   parks it until that worker calls [`WorkQueue::done`],
//! - adding a key that is already waiting is a no-op,
//! - failed keys come back after a per-key exponential delay.
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use crate::telemetry::QUEUE_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff { pub base: Duration, pub max: Duration }

impl Default for Backoff {
    fn default() -> Self { Self { base: Duration::from_millis(5), max: Duration::from_secs(1000) } }
}

impl Backoff {
    /// Delay before retry number `failures` (1-based).
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.saturating_sub(1).min(31);
        self.base.saturating_mul(1u32 << exp).min(self.max)
    }
}

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    dirty: HashSet<String>,
    processing: HashSet<String>,
    failures: HashMap<String, u32>,
    shutting_down: bool,
}

pub struct WorkQueue {
    state: Mutex<State>,
    notify: Notify,
    backoff: Backoff,
}

impl WorkQueue {
    pub fn new(backoff: Backoff) -> Arc<Self> {
        Arc::new(Self { state: Mutex::new(State::default()), notify: Notify::new(), backoff })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent even if a holder panicked; nothing is held across an await.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, key: impl Into<String>) {
        let key = key.into();
        let mut st = self.lock();
        if st.shutting_down || st.dirty.contains(&key) { return; }
        st.dirty.insert(key.clone());
        if st.processing.contains(&key) { return; }
        st.queue.push_back(key);
        QUEUE_DEPTH.set(st.queue.len() as i64);
        drop(st);
        self.notify.notify_one();
    }

    /// Re-adds `key` after its backoff delay; each call grows the delay until [`WorkQueue::forget`].
    pub fn add_rate_limited(self: &Arc<Self>, key: impl Into<String>) -> Duration {
        let key = key.into();
        let delay = {
            let mut st = self.lock();
            let n = st.failures.entry(key.clone()).or_insert(0);
            *n = n.saturating_add(1);
            self.backoff.delay(*n)
        };
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
        delay
    }

    pub fn forget(&self, key: &str) { self.lock().failures.remove(key); }

    pub fn failures(&self, key: &str) -> u32 { self.lock().failures.get(key).copied().unwrap_or(0) }

    pub fn len(&self) -> usize { self.lock().queue.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Waits for the next key. `None` once the queue is shut down.
    pub async fn get(&self) -> Option<String> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut st = self.lock();
                if st.shutting_down { return None; }
                if let Some(key) = st.queue.pop_front() {
                    st.dirty.remove(&key);
                    st.processing.insert(key.clone());
                    QUEUE_DEPTH.set(st.queue.len() as i64);
                    let more = !st.queue.is_empty();
                    drop(st);
                    if more { self.notify.notify_one(); }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Marks `key` as finished; a re-add that arrived meanwhile is queued now.
    pub fn done(&self, key: &str) {
        let mut st = self.lock();
        st.processing.remove(key);
        if st.dirty.contains(key) && !st.shutting_down {
            st.queue.push_back(key.to_string());
            QUEUE_DEPTH.set(st.queue.len() as i64);
            drop(st);
            self.notify.notify_one();
        }
    }

    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.notify.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool { self.lock().shutting_down }
}
