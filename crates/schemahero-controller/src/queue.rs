use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use schemahero_core::models::ObjectRef;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(300);

/// Delay before retry number `failures` (zero based).
pub(crate) fn retry_delay(failures: u32) -> Duration {
    BACKOFF_BASE
        .checked_mul(1u32 << failures.min(16))
        .unwrap_or(BACKOFF_CAP)
        .min(BACKOFF_CAP)
}

#[derive(Default)]
struct State {
    queue: VecDeque<ObjectRef>,
    queued: HashSet<ObjectRef>,
    active: HashSet<ObjectRef>,
    /// Keys added again while being reconciled.
    dirty: HashSet<ObjectRef>,
    failures: HashMap<ObjectRef, u32>,
    shut_down: bool,
}

/// Deduplicating work queue. A key handed out by [`WorkQueue::get`] is not
/// handed out again until [`WorkQueue::done`] is called for it, so reconciles
/// of one key never overlap.
#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<State>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn add(&self, key: ObjectRef) {
        let mut state = self.state();
        if state.shut_down {
            return;
        }
        if state.active.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Add `key` once `delay` has passed.
    pub fn add_after(self: &Arc<Self>, key: ObjectRef, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key. `None` once the queue is shut down.
    pub async fn get(&self) -> Option<ObjectRef> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state();
                if state.shut_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.active.insert(key.clone());
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    /// Finish processing `key`, requeueing it if it was added meanwhile.
    pub fn done(&self, key: &ObjectRef) {
        let mut state = self.state();
        state.active.remove(key);
        if state.dirty.remove(key) && !state.shut_down && state.queued.insert(key.clone()) {
            state.queue.push_back(key.clone());
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Record a failure of `key` and return how long to wait before retrying:
    /// one second doubled per consecutive failure, capped at five minutes.
    pub fn backoff(&self, key: &ObjectRef) -> Duration {
        let mut state = self.state();
        let failures = state.failures.entry(key.clone()).or_insert(0);
        let delay = retry_delay(*failures);
        *failures = failures.saturating_add(1);
        delay
    }

    /// Reset the failure count of `key`.
    pub fn forget(&self, key: &ObjectRef) {
        self.state().failures.remove(key);
    }

    pub fn len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shut_down(&self) {
        self.state().shut_down = true;
        self.notify.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ObjectRef {
        ObjectRef::new("default", name)
    }

    #[tokio::test]
    async fn test_duplicate_adds_collapse() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        queue.add(key("a"));
        queue.add(key("b"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().await, Some(key("a")));
        assert_eq!(queue.get().await, Some(key("b")));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_active_key_is_held_until_done() {
        let queue = WorkQueue::new();
        queue.add(key("a"));
        let a = queue.get().await.unwrap();
        queue.add(key("a"));
        assert!(queue.is_empty());
        queue.done(&a);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some(key("a")));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let queue = WorkQueue::new();
        let k = key("a");
        let delays: Vec<u64> = (0..4).map(|_| queue.backoff(&k).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8]);
        for _ in 0..20 {
            queue.backoff(&k);
        }
        assert_eq!(queue.backoff(&k), Duration::from_secs(300));
        queue.forget(&k);
        assert_eq!(queue.backoff(&k), Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_add_after_waits() {
        let queue = WorkQueue::new();
        queue.add_after(key("a"), Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(queue.is_empty());
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_shut_down_releases_waiters() {
        let queue = WorkQueue::new();
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        };
        tokio::task::yield_now().await;
        queue.shut_down();
        assert_eq!(waiter.await.unwrap(), None);
    }
}
