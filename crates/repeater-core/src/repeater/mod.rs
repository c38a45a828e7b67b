//! Multi-pass batch runner that retries only the jobs that failed.

pub mod builder;
pub mod interval;

pub use builder::RepeaterBuilder;
pub use interval::{ExponentialBackoff, FixedDelay, IntervalStrategy, LinearDelay, NoDelay};

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::domain::{AlwaysRetry, Decision, FailurePolicy, Job, JobStatus, Outcomes, RunId, decide};
use crate::error::RepeaterError;
use crate::observability::JobCounts;
use crate::queue::AsyncQueue;
use crate::task::BoxTask;

/// Result delivered to every completion subscriber.
pub type Completion<T, E> = Result<Outcomes<T, E>, RepeaterError>;

/// Runs a fixed list of tasks in passes until none is left to retry.
///
/// Pass 1 runs every task through a queue limited to `channels` concurrent
/// invocations. Each later pass runs only the jobs that failed on the previous
/// one, after the interval strategy's delay. The run ends when:
/// - no job is left to retry: subscribers get the outcomes, in task order
/// - `max_runs` passes ran and some jobs still fail:
///   subscribers get [`RepeaterError::MaxAttemptsExceeded`]
///
/// A failure the [`FailurePolicy`] accepts ends that job with its error as the
/// outcome; it is not retried.
///
/// ```ignore
/// let repeater = Repeater::builder(tasks)
///     .channels(4)
///     .max_runs(5)
///     .build()?;
/// repeater.start();
/// let outcomes = repeater.on_complete().await?;
/// ```
pub struct Repeater<T, E> {
    shared: Arc<Shared<T, E>>,
}

struct Shared<T, E> {
    id: RunId,
    queue: AsyncQueue,
    jobs: Mutex<Vec<Job<T, E>>>,
    interval: Arc<dyn IntervalStrategy>,
    policy: Arc<dyn FailurePolicy<E>>,
    max_runs: Option<u32>,
    pass: AtomicU32,
    started: AtomicBool,
    done: watch::Sender<Option<Completion<T, E>>>,
}

impl<T, E> Repeater<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Repeater with the default options: one channel, no delay, every
    /// failure retried, unlimited passes.
    pub fn new(tasks: impl IntoIterator<Item = BoxTask<T, E>>) -> Self {
        Self::from_parts(
            tasks.into_iter().collect(),
            1,
            Arc::new(interval::NoDelay),
            Arc::new(AlwaysRetry),
            None,
        )
    }

    pub fn builder(tasks: impl IntoIterator<Item = BoxTask<T, E>>) -> RepeaterBuilder<T, E> {
        RepeaterBuilder::new(tasks)
    }

    pub(crate) fn from_parts(
        tasks: Vec<BoxTask<T, E>>,
        channels: usize,
        interval: Arc<dyn IntervalStrategy>,
        policy: Arc<dyn FailurePolicy<E>>,
        max_runs: Option<u32>,
    ) -> Self {
        let jobs = tasks
            .into_iter()
            .enumerate()
            .map(|(id, task)| Job::new(id, task))
            .collect();
        let (done, _) = watch::channel(None);

        Self {
            shared: Arc::new(Shared {
                id: RunId::generate(),
                queue: AsyncQueue::new(channels),
                jobs: Mutex::new(jobs),
                interval,
                policy,
                max_runs,
                pass: AtomicU32::new(0),
                started: AtomicBool::new(false),
                done,
            }),
        }
    }

    /// Start pass 1. Only the first call has an effect.
    ///
    /// Returns immediately; the passes run on the current Tokio runtime.
    /// Called outside a runtime, the run ends with [`RepeaterError::NoRuntime`].
    pub fn start(&self) {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            debug!(run_id = %self.shared.id, "start ignored; already started");
            return;
        }

        match Handle::try_current() {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                let span = info_span!("repeater", run_id = %shared.id);
                handle.spawn(async move { shared.run_passes().await }.instrument(span));
            }
            Err(_) => {
                error!(run_id = %self.shared.id, "start called outside a Tokio runtime");
                self.shared.finish(Err(RepeaterError::NoRuntime));
            }
        }
    }

    /// Wait for the run's result.
    ///
    /// The result is decided once. Subscribers registered before or after
    /// that point all observe it.
    pub fn on_complete(&self) -> impl Future<Output = Completion<T, E>> + Send + 'static {
        let mut rx = self.shared.done.subscribe();
        async move {
            match rx.wait_for(Option::is_some).await {
                Ok(done) => (*done).clone().unwrap_or(Err(RepeaterError::Abandoned)),
                Err(_) => Err(RepeaterError::Abandoned),
            }
        }
    }

    pub fn id(&self) -> RunId {
        self.shared.id
    }

    /// Number of the current (or last) pass; 0 before the first one.
    pub fn pass(&self) -> u32 {
        self.shared.pass.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.shared.started.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.shared.lock_jobs().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Status of every job, in task order.
    pub fn statuses(&self) -> Vec<JobStatus> {
        self.shared.lock_jobs().iter().map(|job| job.status).collect()
    }

    /// Settled invocations of the task with this id.
    pub fn attempts(&self, id: usize) -> Option<u32> {
        self.shared.lock_jobs().get(id).map(|job| job.attempts)
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for job in self.shared.lock_jobs().iter() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }
}

impl<T, E> Shared<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    async fn run_passes(self: Arc<Self>) {
        let mut batch: Vec<usize> = (0..self.lock_jobs().len()).collect();
        if batch.is_empty() {
            info!("no tasks; completing without a pass");
            self.finish_ok();
            return;
        }

        loop {
            let pass = self.pass.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(pass, jobs = batch.len(), "starting pass");

            // Subscribe before admitting: a fast task may settle right away.
            let drained = self.queue.on_drain();
            let units: Vec<_> = batch
                .into_iter()
                .filter_map(|id| {
                    let task = self.task(id)?;
                    let shared = Arc::clone(&self);
                    Some(move || async move {
                        let result = task.run().await;
                        shared.record(id, result);
                    })
                })
                .collect();
            self.queue.enqueue_all(units);
            drained.await;

            let uncompleted = self.uncompleted();
            if uncompleted.is_empty() {
                info!(pass, "all jobs completed");
                self.finish_ok();
                return;
            }

            if self.max_runs.is_some_and(|max| pass >= max) {
                warn!(pass, failed = ?uncompleted, "pass budget exhausted");
                self.finish(Err(RepeaterError::MaxAttemptsExceeded {
                    passes: pass,
                    failed: uncompleted,
                }));
                return;
            }

            let delay = self.delay_after(pass);
            debug!(
                pass,
                retrying = uncompleted.len(),
                delay_ms = saturating_millis(delay),
                "scheduling next pass"
            );
            if delay.is_zero() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(delay).await;
            }
            batch = uncompleted;
        }
    }

    fn task(&self, id: usize) -> Option<BoxTask<T, E>> {
        self.lock_jobs().get(id).map(|job| Arc::clone(&job.task))
    }

    fn record(&self, id: usize, result: Result<T, E>) {
        match result {
            Ok(value) => {
                trace!(job = id, "job succeeded");
                if let Some(job) = self.lock_jobs().get_mut(id) {
                    job.record_success(value);
                }
            }
            Err(error) => {
                // Policy runs outside the lock.
                let decision = decide(self.policy.as_ref(), &error);
                let mut jobs = self.lock_jobs();
                let Some(job) = jobs.get_mut(id) else { return };
                match decision {
                    Decision::Complete => {
                        debug!(job = job.id, "failure accepted as final");
                        job.record_accepted(error);
                    }
                    Decision::Retry => {
                        debug!(job = job.id, attempts = job.attempts + 1, "job failed; will retry");
                        job.record_failure(error);
                    }
                }
            }
        }
    }

    fn uncompleted(&self) -> Vec<usize> {
        self.lock_jobs()
            .iter()
            .filter(|job| job.needs_retry())
            .map(|job| job.id)
            .collect()
    }

    fn delay_after(&self, pass: u32) -> Duration {
        catch_unwind(AssertUnwindSafe(|| self.interval.delay_for(pass))).unwrap_or_else(|_| {
            warn!(pass, "interval strategy panicked; no delay");
            Duration::ZERO
        })
    }

    fn finish_ok(&self) {
        let results: Vec<_> = self
            .lock_jobs()
            .iter_mut()
            .filter_map(|job| job.outcome.take())
            .collect();
        self.finish(Ok(Outcomes::new(results)));
    }

    /// Store the result. Later calls are ignored.
    fn finish(&self, completion: Completion<T, E>) {
        self.done.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(completion);
            true
        });
    }

    fn lock_jobs(&self) -> MutexGuard<'_, Vec<Job<T, E>>> {
        // Nothing panics while the guard is held, so poisoned data is still consistent.
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whole milliseconds of `delay`, saturating at `u64::MAX`.
fn saturating_millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::boxed;
    use std::sync::atomic::AtomicUsize;

    fn counting_task(calls: &Arc<AtomicUsize>, value: &'static str) -> BoxTask<&'static str, ()> {
        let calls = Arc::clone(calls);
        boxed(move || {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, ()>(value)
            }
        })
    }

    #[tokio::test]
    async fn completes_all_tasks_in_order() {
        let repeater = Repeater::new(vec![
            boxed(|| async { Ok::<_, ()>("data-1") }),
            boxed(|| async { Ok::<_, ()>("data-2") }),
            boxed(|| async { Ok::<_, ()>("data-3") }),
        ]);

        repeater.start();
        let outcomes = repeater.on_complete().await.unwrap();
        assert!(outcomes.is_all_ok());
        assert_eq!(
            outcomes.values().copied().collect::<Vec<_>>(),
            vec!["data-1", "data-2", "data-3"]
        );
        assert_eq!(repeater.pass(), 1);
        assert_eq!(
            repeater.counts(),
            JobCounts {
                pending: 0,
                completed: 3,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn second_start_has_no_effect() {
        let calls = Arc::new(AtomicUsize::new(0));
        let repeater = Repeater::new(vec![counting_task(&calls, "a"), counting_task(&calls, "b")]);

        repeater.start();
        repeater.start();
        repeater.on_complete().await.unwrap();
        repeater.start();
        tokio::task::yield_now().await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(repeater.pass(), 1);
    }

    #[tokio::test]
    async fn empty_task_list_completes_immediately() {
        let repeater: Repeater<(), ()> = Repeater::new(Vec::new());
        repeater.start();

        let outcomes = repeater.on_complete().await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(repeater.pass(), 0);
    }

    #[tokio::test]
    async fn late_subscriber_gets_stored_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let repeater = Repeater::new(vec![counting_task(&calls, "x")]);
        let early = repeater.on_complete();

        repeater.start();
        let first = early.await.unwrap();
        let late = repeater.on_complete().await.unwrap();

        assert_eq!(first, late);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_before_start_is_abandoned() {
        let repeater: Repeater<(), ()> = Repeater::new(vec![boxed(|| async { Ok::<(), ()>(()) })]);
        let pending = repeater.on_complete();
        drop(repeater);

        assert_eq!(pending.await, Err(RepeaterError::Abandoned));
    }

    #[test]
    fn start_outside_runtime_reports_error() {
        let repeater: Repeater<(), ()> = Repeater::new(vec![boxed(|| async { Ok::<(), ()>(()) })]);
        repeater.start();

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let result = rt.block_on(repeater.on_complete());
        assert_eq!(result, Err(RepeaterError::NoRuntime));
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_interval_strategy_means_no_delay() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let task = boxed(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err("not yet")
                } else {
                    Ok("ready")
                }
            }
        });
        let repeater = Repeater::builder(vec![task])
            .interval_strategy(|_: u32| -> Duration { panic!("strategy bug") })
            .build()
            .unwrap();

        let started = tokio::time::Instant::now();
        repeater.start();
        let outcomes = repeater.on_complete().await.unwrap();

        assert_eq!(outcomes[0], Ok("ready"));
        assert_eq!(repeater.pass(), 2);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[test]
    fn delay_millis_saturate() {
        assert_eq!(saturating_millis(Duration::from_millis(90)), 90);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn panicking_task_is_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let repeater = Repeater::new(vec![boxed(move || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("first run explodes");
                }
                Ok::<_, ()>("recovered")
            }
        })]);

        repeater.start();
        let outcomes = repeater.on_complete().await.unwrap();
        assert_eq!(outcomes[0], Ok("recovered"));
        assert_eq!(repeater.pass(), 2);
        assert_eq!(repeater.attempts(0), Some(1));
    }
}
