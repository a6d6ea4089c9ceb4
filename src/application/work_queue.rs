//! Deduplicating work queue for object keys.
//!
//! A key sits in the queue at most once. A key that changes while a worker
//! holds it is marked dirty and goes back on the queue when the worker calls
//! [`WorkQueue::done`], so two workers never process the same key at once.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

use crate::domain::models::{ObjectKey, RawObject};

#[derive(Default)]
struct QueueState {
    queue: VecDeque<ObjectKey>,
    queued: HashSet<ObjectKey>,
    processing: HashSet<ObjectKey>,
    dirty: HashSet<ObjectKey>,
    /// Last stored state of deleted objects awaiting cleanup.
    tombstones: HashMap<ObjectKey, RawObject>,
    shut_down: bool,
}

#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // Nothing panics while holding the lock; recover the data if it ever did.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add(&self, key: ObjectKey) {
        let mut state = self.lock();
        if state.shut_down {
            return;
        }
        if state.processing.contains(&key) {
            state.dirty.insert(key);
            return;
        }
        if state.queued.insert(key.clone()) {
            state.queue.push_back(key);
            drop(state);
            self.notify.notify_one();
        }
    }

    /// Re-add `key` after `delay`.
    pub fn add_after(self: &Arc<Self>, key: ObjectKey, delay: Duration) {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key and mark it as processing.
    pub async fn next(&self) -> ObjectKey {
        loop {
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    state.processing.insert(key.clone());
                    let more = !state.queue.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return key;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Release `key`; re-queue it if it changed while it was being processed.
    pub fn done(&self, key: &ObjectKey) {
        let requeue = {
            let mut state = self.lock();
            state.processing.remove(key);
            state.dirty.remove(key)
        };
        if requeue {
            self.add(key.clone());
        }
    }

    pub fn set_tombstone(&self, object: RawObject) {
        self.lock().tombstones.insert(object.key(), object);
    }

    pub fn tombstone(&self, key: &ObjectKey) -> Option<RawObject> {
        self.lock().tombstones.get(key).cloned()
    }

    pub fn clear_tombstone(&self, key: &ObjectKey) {
        self.lock().tombstones.remove(key);
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop accepting keys. Keys already queued are dropped.
    pub fn shut_down(&self) {
        let mut state = self.lock();
        state.shut_down = true;
        state.queue.clear();
        state.queued.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::Kind;

    fn key(name: &str) -> ObjectKey {
        ObjectKey::new(Kind::Thread, "default", name)
    }

    #[tokio::test]
    async fn test_duplicate_adds_collapse() {
        let queue = WorkQueue::new();
        queue.add(key("t1a"));
        queue.add(key("t1a"));
        queue.add(key("t1b"));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.next().await, key("t1a"));
        assert_eq!(queue.next().await, key("t1b"));
    }

    #[tokio::test]
    async fn test_change_during_processing_requeues_after_done() {
        let queue = WorkQueue::new();
        queue.add(key("t1a"));
        let held = queue.next().await;

        queue.add(key("t1a"));
        assert!(queue.is_empty());

        queue.done(&held);
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_done_without_change_does_not_requeue() {
        let queue = WorkQueue::new();
        queue.add(key("t1a"));
        let held = queue.next().await;
        queue.done(&held);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_shut_down_drops_new_keys() {
        let queue = WorkQueue::new();
        queue.shut_down();
        queue.add(key("t1a"));
        assert!(queue.is_empty());
    }
}
