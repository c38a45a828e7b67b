use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

/// A re-runnable asynchronous unit of work.
///
/// The repeater never inspects `Output` or `Error`; it only stores them and,
/// for errors, asks a [`FailurePolicy`](crate::domain::FailurePolicy) whether
/// the failure is terminal. `run` may be called once per pass, so it must be
/// callable through a shared reference.
///
/// Any `Fn() -> impl Future<Output = Result<T, E>>` closure is a task:
///
/// ```ignore
/// let fetch = || async { client.get("/status").await };
/// let repeater = Repeater::new(vec![Arc::new(fetch) as BoxTask<_, _>]);
/// ```
#[async_trait]
pub trait Task: Send + Sync {
    type Output: Send;
    type Error: Send;

    async fn run(&self) -> Result<Self::Output, Self::Error>;
}

/// Shared, type-erased task as stored by the repeater.
pub type BoxTask<T, E> = Arc<dyn Task<Output = T, Error = E>>;

#[async_trait]
impl<F, Fut, T, E> Task for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    type Output = T;
    type Error = E;

    async fn run(&self) -> Result<T, E> {
        (self)().await
    }
}

/// Erase a concrete task into a [`BoxTask`].
pub fn boxed<K>(task: K) -> BoxTask<K::Output, K::Error>
where
    K: Task + 'static,
{
    Arc::new(task)
}
