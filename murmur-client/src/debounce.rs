use std::{collections::HashMap, fmt::Debug, future::Future, hash::Hash, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::task::JoinHandle;

struct Timer {
    ticket: u64,
    handle: JoinHandle<()>,
}

struct Timers<K> {
    next_ticket: u64,
    pending: HashMap<K, Timer>,
}

/// Per-key trailing-edge debouncer: only the last action scheduled for a key within the quiet
/// period runs.
///
/// Must be used from within a tokio runtime. Dropping the debouncer cancels every pending timer.
pub struct Debouncer<K> {
    timers: Arc<Mutex<Timers<K>>>,
}

impl<K> Default for Debouncer<K> {
    fn default() -> Debouncer<K> {
        Debouncer {
            timers: Arc::new(Mutex::new(Timers {
                next_ticket: 0,
                pending: HashMap::new(),
            })),
        }
    }
}

impl<K> Debouncer<K>
where
    K: Clone + Debug + Eq + Hash + Send + 'static,
{
    pub fn new() -> Debouncer<K> {
        Debouncer::default()
    }

    /// Run `action` after `delay`, unless another action is scheduled for `key` before then.
    /// Any timer already pending for `key` is cancelled.
    pub fn schedule<F>(&self, key: K, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut timers = self.timers.lock();
        let ticket = timers.next_ticket;
        timers.next_ticket += 1;
        let shared = self.timers.clone();
        let own_key = key.clone();
        // The lock is held until the timer is registered, so the task cannot observe the map
        // before its own entry is in it
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = shared.lock();
                match timers.pending.get(&own_key) {
                    Some(t) if t.ticket == ticket => {
                        timers.pending.remove(&own_key);
                    }
                    _ => return,
                }
            }
            // From here on, rescheduling the key no longer aborts this task
            action.await
        });
        if let Some(previous) = timers.pending.insert(key, Timer { ticket, handle }) {
            tracing::trace!(ticket = previous.ticket, "re-arming debounced action");
            previous.handle.abort();
        }
    }

    /// Returns whether a timer was pending
    pub fn cancel(&self, key: &K) -> bool {
        match self.timers.lock().pending.remove(key) {
            Some(t) => {
                t.handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        for (_, t) in self.timers.lock().pending.drain() {
            t.handle.abort();
        }
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.timers.lock().pending.contains_key(key)
    }

    pub fn pending_count(&self) -> usize {
        self.timers.lock().pending.len()
    }
}

impl<K> Drop for Debouncer<K> {
    fn drop(&mut self) {
        for (_, t) in self.timers.lock().pending.drain() {
            t.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const DELAY: Duration = Duration::from_millis(800);

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_into_last_action() {
        let d = Debouncer::new();
        let last = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let last = last.clone();
            d.schedule("home", DELAY, async move { last.lock().push(i) });
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        assert!(d.is_pending(&"home"));
        tokio::time::sleep(DELAY).await;
        assert_eq!(*last.lock(), vec![2]);
        assert!(!d.is_pending(&"home"));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_independent() {
        let d = Debouncer::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b", "a"] {
            let runs = runs.clone();
            d.schedule(key, DELAY, async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(d.pending_count(), 2);
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_actions_never_run() {
        let d = Debouncer::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b"] {
            let runs = runs.clone();
            d.schedule(key, DELAY, async move {
                runs.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(d.cancel(&"a"));
        assert!(!d.cancel(&"a"));
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let runs2 = runs.clone();
        d.schedule("c", DELAY, async move {
            runs2.fetch_add(1, Ordering::SeqCst);
        });
        drop(d);
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rescheduling_does_not_abort_running_action() {
        let d = Debouncer::new();
        let done = Arc::new(AtomicUsize::new(0));
        let first = done.clone();
        d.schedule("a", DELAY, async move {
            // a slow fetch
            tokio::time::sleep(Duration::from_secs(5)).await;
            first.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(DELAY + Duration::from_millis(100)).await;
        assert!(!d.is_pending(&"a"));
        let second = done.clone();
        d.schedule("a", DELAY, async move {
            second.fetch_add(10, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(done.load(Ordering::SeqCst), 11);
    }
}
