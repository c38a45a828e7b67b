//! Concurrency-limited queue with drain notification.

mod drain;
mod state;

pub use drain::Drained;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{trace, warn};

use crate::observability::QueueCounts;
use state::{QueueEntry, QueueState, Settled};

/// Runs at most `channels` units of work at once, the rest in FIFO order.
///
/// Design intent:
/// - The queue only schedules. Whether a unit succeeded or failed is the
///   unit's own business; either way the slot is freed and the line advances.
/// - A unit that panics is settled like any other.
/// - Clones share the same slots and waiting line.
///
/// All methods return immediately. `enqueue` must be called from within a
/// Tokio runtime because started units are spawned onto it.
#[derive(Clone)]
pub struct AsyncQueue {
    state: Arc<Mutex<QueueState>>,
}

impl AsyncQueue {
    /// Create a queue with `channels` concurrent slots. 0 is treated as 1.
    pub fn new(channels: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::new(channels))),
        }
    }

    /// Admit a unit of work.
    ///
    /// `task` is invoked once a slot is free. Its output is discarded.
    pub fn enqueue<F, Fut>(&self, task: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
    {
        let start = self.lock().admit(into_entry(task));
        match start {
            Some(entry) => launch(Arc::clone(&self.state), entry),
            None => trace!("all channels busy; entry is waiting"),
        }
    }

    /// Admit a batch under a single lock.
    ///
    /// No unit of the batch can settle before the last one is admitted, so a
    /// drain observed after this call covers the whole batch.
    pub(crate) fn enqueue_all<I, F, Fut>(&self, tasks: I)
    where
        I: IntoIterator<Item = F>,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future + Send + 'static,
    {
        let started: Vec<QueueEntry> = {
            let mut state = self.lock();
            tasks
                .into_iter()
                .filter_map(|task| state.admit(into_entry(task)))
                .collect()
        };

        trace!(started = started.len(), "batch admitted");
        for entry in started {
            launch(Arc::clone(&self.state), entry);
        }
    }

    /// Subscribe to the next transition to idle (nothing active, nothing waiting).
    ///
    /// An already idle queue does not notify until work is admitted and drains
    /// again. When the caller wants "drain after this batch" on a multi-thread
    /// runtime, subscribe before enqueueing the batch: a fast unit may
    /// otherwise settle before the subscription exists.
    pub fn on_drain(&self) -> Drained {
        let (tx, rx) = oneshot::channel();
        self.lock().subscribe(tx);
        Drained::new(rx)
    }

    pub fn counts(&self) -> QueueCounts {
        self.lock().counts()
    }

    pub fn is_idle(&self) -> bool {
        let counts = self.counts();
        counts.active == 0 && counts.waiting == 0
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.state)
    }
}

fn lock(state: &Mutex<QueueState>) -> MutexGuard<'_, QueueState> {
    // Nothing panics while the guard is held, so poisoned data is still consistent.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn into_entry<F, Fut>(task: F) -> QueueEntry
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future + Send + 'static,
{
    Box::new(move || {
        Box::pin(async move {
            let _ = task().await;
        })
    })
}

/// Run an entry whose slot is already claimed, then settle it.
fn launch(state: Arc<Mutex<QueueState>>, entry: QueueEntry) {
    tokio::spawn(async move {
        // Inner task isolates panics so the slot is always released.
        if let Err(err) = tokio::spawn(async move { entry().await }).await {
            warn!(error = %err, "queued task did not complete normally");
        }

        let settled = lock(&state).settle();
        match settled {
            Settled::Next(next) => launch(state, next),
            Settled::Drained(subscribers) => {
                trace!(subscribers = subscribers.len(), "queue drained");
                for tx in subscribers {
                    // receiver may have been dropped
                    let _ = tx.send(());
                }
            }
            Settled::Busy => {}
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use rstest::rstest;
    use tokio::time::{sleep, timeout};

    fn record_after(queue: &AsyncQueue, order: &Arc<Mutex<Vec<u32>>>, n: u32, ms: u64) {
        let order = Arc::clone(order);
        queue.enqueue(move || async move {
            sleep(Duration::from_millis(ms)).await;
            order.lock().unwrap().push(n);
        });
    }

    #[tokio::test(start_paused = true)]
    async fn one_channel_runs_in_arrival_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let queue = AsyncQueue::new(1);
        let drained = queue.on_drain();

        record_after(&queue, &order, 1, 20);
        record_after(&queue, &order, 2, 10);

        drained.await;
        assert_eq!(*order.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn two_channels_interleave_by_latency() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let queue = AsyncQueue::new(2);
        let drained = queue.on_drain();

        record_after(&queue, &order, 1, 20);
        record_after(&queue, &order, 2, 10);
        record_after(&queue, &order, 3, 5);

        drained.await;
        // 3 starts when 2 frees its slot at 10ms and finishes at 15ms.
        assert_eq!(*order.lock().unwrap(), vec![2, 3, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn drains_when_task_fails() {
        let queue = AsyncQueue::new(1);
        let drained = queue.on_drain();

        queue.enqueue(|| async {
            sleep(Duration::from_millis(5)).await;
            Err::<(), _>("boom")
        });

        drained.await;
        assert!(queue.is_idle());
    }

    async fn explode() {
        panic!("task blew up");
    }

    #[tokio::test(start_paused = true)]
    async fn drains_when_task_panics() {
        let queue = AsyncQueue::new(1);
        let ran = Arc::new(AtomicUsize::new(0));
        let drained = queue.on_drain();

        queue.enqueue(explode);
        let counter = Arc::clone(&ran);
        queue.enqueue(move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drained.await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert!(queue.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn all_subscribers_see_same_drain() {
        let queue = AsyncQueue::new(2);
        let first = queue.on_drain();
        let second = queue.on_drain();

        queue.enqueue(|| sleep(Duration::from_millis(10)));
        queue.enqueue(|| sleep(Duration::from_millis(30)));

        tokio::join!(first, second);
        assert!(queue.is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_queue_does_not_notify_new_subscriber() {
        let queue = AsyncQueue::new(1);
        let drained = queue.on_drain();

        assert!(timeout(Duration::from_millis(100), drained).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_queue_resolves_subscriber() {
        let queue = AsyncQueue::new(1);
        let drained = queue.on_drain();
        drop(queue);

        assert!(timeout(Duration::from_millis(10), drained).await.is_ok());
    }

    #[tokio::test]
    async fn enqueue_all_admits_batch_before_any_unit_runs() {
        let queue = AsyncQueue::new(2);
        let drained = queue.on_drain();

        queue.enqueue_all((0..5).map(|_| || async {}));
        assert_eq!(
            queue.counts(),
            QueueCounts {
                channels: 2,
                active: 2,
                waiting: 3
            }
        );

        drained.await;
        assert!(queue.is_idle());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn batch_drain_covers_every_instant_unit() {
        for _ in 0..50 {
            let queue = AsyncQueue::new(8);
            let runs = Arc::new(AtomicUsize::new(0));
            let drained = queue.on_drain();

            queue.enqueue_all((0..64).map(|_| {
                let runs = Arc::clone(&runs);
                move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            }));

            drained.await;
            assert_eq!(runs.load(Ordering::SeqCst), 64);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn subscriber_waits_for_next_drain() {
        let queue = AsyncQueue::new(1);
        let first = queue.on_drain();
        queue.enqueue(|| sleep(Duration::from_millis(5)));
        first.await;

        let second = queue.on_drain();
        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        queue.enqueue(move || async move {
            sleep(Duration::from_millis(5)).await;
            counter.fetch_add(1, Ordering::SeqCst);
        });

        second.await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[case(1, 5)]
    #[case(2, 7)]
    #[case(3, 3)]
    #[case(4, 10)]
    #[tokio::test(start_paused = true)]
    async fn never_exceeds_channel_count(#[case] channels: usize, #[case] tasks: usize) {
        let queue = AsyncQueue::new(channels);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));
        let drained = queue.on_drain();

        for i in 0..tasks {
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            let runs = Arc::clone(&runs);
            queue.enqueue(move || async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(1 + (i as u64 % 3) * 4)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                runs.fetch_add(1, Ordering::SeqCst);
            });
            assert!(queue.counts().active <= channels);
        }

        drained.await;
        assert_eq!(peak.load(Ordering::SeqCst), channels.min(tasks));
        assert_eq!(runs.load(Ordering::SeqCst), tasks);
    }
}
