use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

/// Resolves on the next transition of an [`AsyncQueue`](super::AsyncQueue) to idle.
///
/// The subscription is registered when `on_drain` is called, not when this
/// future is first polled. It also resolves if the queue is dropped first.
#[must_use = "a drain subscription does nothing unless awaited"]
#[derive(Debug)]
pub struct Drained {
    rx: oneshot::Receiver<()>,
}

impl Drained {
    pub(crate) fn new(rx: oneshot::Receiver<()>) -> Self {
        Self { rx }
    }
}

impl Future for Drained {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.rx).poll(cx).map(|_| ())
    }
}
