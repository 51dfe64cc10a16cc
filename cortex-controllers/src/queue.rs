use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use rand::Rng;
use tokio::sync::{watch, Mutex};
use tokio::time::{interval, Instant};

struct Delayed<K> {
    key: K,
    ready_at: Instant,
}

struct Inner<K> {
    active: VecDeque<K>,
    in_queue: HashSet<K>,
    delayed: Vec<Delayed<K>>,
}

/// A generic per-kind reconcile queue (spec §5 "work-queue runtime with
/// per-resource-kind concurrency caps"), generalized from
/// `SchedulingQueue`'s active/backoff/unschedulable split
/// (`libscheduler/src/scheduler.rs`). `K` is usually a record name;
/// `push` dedups so a record already pending isn't queued twice, and
/// `push_after` models a jittered requeue delay.
pub struct WorkQueue<K: Eq + Hash + Clone + Send + Sync + 'static> {
    inner: Mutex<Inner<K>>,
    notify_tx: watch::Sender<usize>,
    notify_rx: Mutex<watch::Receiver<usize>>,
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> Default for WorkQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone + Send + Sync + 'static> WorkQueue<K> {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(0);
        Self {
            inner: Mutex::new(Inner {
                active: VecDeque::new(),
                in_queue: HashSet::new(),
                delayed: Vec::new(),
            }),
            notify_tx: tx,
            notify_rx: Mutex::new(rx),
        }
    }

    async fn bump(&self) {
        self.notify_tx.send_modify(|v| *v += 1);
    }

    /// Enqueues `key` immediately unless it is already pending (active
    /// or delayed).
    pub async fn push(&self, key: K) {
        let mut inner = self.inner.lock().await;
        if inner.in_queue.insert(key.clone()) {
            inner.active.push_back(key);
            drop(inner);
            self.bump().await;
        }
    }

    /// Enqueues `key` to become eligible after `delay`, deduping the
    /// same way as `push`.
    pub async fn push_after(&self, key: K, delay: StdDuration) {
        let mut inner = self.inner.lock().await;
        if inner.in_queue.insert(key.clone()) {
            inner.delayed.push(Delayed {
                key,
                ready_at: Instant::now() + delay,
            });
        }
    }

    /// Blocks until an item is ready, then frees its dedup slot so a
    /// later `push` for the same key is accepted again.
    pub async fn pop(&self) -> K {
        loop {
            {
                let mut inner = self.inner.lock().await;
                if let Some(key) = inner.active.pop_front() {
                    inner.in_queue.remove(&key);
                    return key;
                }
            }
            let mut rx = self.notify_rx.lock().await;
            rx.changed().await.expect("work queue sender dropped");
        }
    }

    /// Promotes delayed items whose deadline has passed, mirroring
    /// `SchedulingQueue::flush_backoff_completed`.
    pub async fn flush_due(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock().await;
        let (due, waiting): (Vec<_>, Vec<_>) = inner.delayed.drain(..).partition(|d| d.ready_at <= now);
        inner.delayed = waiting;
        if due.is_empty() {
            return;
        }
        for d in due {
            inner.active.push_back(d.key);
        }
        drop(inner);
        self.bump().await;
    }

    /// Spawns the background tick that promotes due items every second.
    pub fn spawn_flush_loop(self: &Arc<Self>) {
        let queue = self.clone();
        tokio::spawn(async move {
            let mut ticker = interval(StdDuration::from_secs(1));
            loop {
                ticker.tick().await;
                queue.flush_due().await;
            }
        });
    }
}

/// Applies ±`jitter_frac` jitter to `base` (spec §4.5 "tick ... ±20%",
/// §5 "requeue jitter bounds").
pub fn jittered(base: StdDuration, jitter_frac: f64) -> StdDuration {
    let mut rng = rand::rng();
    let factor = 1.0 + rng.random_range(-jitter_frac..=jitter_frac);
    StdDuration::from_secs_f64((base.as_secs_f64() * factor).max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn push_dedups_pending_keys() {
        let queue = WorkQueue::new();
        queue.push("a".to_string()).await;
        queue.push("a".to_string()).await;
        assert_eq!(queue.pop().await, "a");
        // second push was a no-op; nothing left to pop without blocking
        queue.push("b".to_string()).await;
        assert_eq!(queue.pop().await, "b");
    }

    #[tokio::test]
    async fn push_after_becomes_active_once_flushed() {
        let queue = Arc::new(WorkQueue::new());
        queue.push_after("c".to_string(), StdDuration::from_millis(1)).await;
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        queue.flush_due().await;
        assert_eq!(queue.pop().await, "c");
    }

    #[test]
    fn jittered_stays_within_bounds() {
        let base = StdDuration::from_secs(60);
        for _ in 0..50 {
            let got = jittered(base, 0.2);
            assert!(got.as_secs_f64() >= 48.0 && got.as_secs_f64() <= 72.0);
        }
    }
}
