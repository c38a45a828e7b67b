//! Queue bookkeeping: slot accounting, waiting line, drain subscribers.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;

use tokio::sync::oneshot;

use crate::observability::QueueCounts;

/// A not-yet-started unit of work. Invoked only once a slot is free.
pub(crate) type QueueEntry = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Mutable queue state.
///
/// Invariants:
/// - `active <= channels`
/// - `waiting` is non-empty only while `active == channels`
/// - `drain` is emptied every time `active` falls to 0 with nothing waiting
pub(crate) struct QueueState {
    channels: usize,
    active: usize,
    waiting: VecDeque<QueueEntry>,
    drain: Vec<oneshot::Sender<()>>,
}

/// What the caller must do after a settlement, outside the lock.
pub(crate) enum Settled {
    /// Start this entry in the slot that was just freed.
    Next(QueueEntry),

    /// The queue went idle; notify these subscribers.
    Drained(Vec<oneshot::Sender<()>>),

    /// Other slots are still busy.
    Busy,
}

impl QueueState {
    pub(crate) fn new(channels: usize) -> Self {
        Self {
            channels: channels.max(1),
            active: 0,
            waiting: VecDeque::new(),
            drain: Vec::new(),
        }
    }

    /// Admit an entry. Returns it back if it should start right away
    /// (the slot is already claimed).
    pub(crate) fn admit(&mut self, entry: QueueEntry) -> Option<QueueEntry> {
        if self.active < self.channels {
            self.active += 1;
            Some(entry)
        } else {
            self.waiting.push_back(entry);
            None
        }
    }

    /// Release the slot of a settled entry.
    ///
    /// A waiting entry inherits the slot, so `active` is unchanged in that case.
    pub(crate) fn settle(&mut self) -> Settled {
        self.active = self.active.saturating_sub(1);

        if let Some(next) = self.waiting.pop_front() {
            self.active += 1;
            return Settled::Next(next);
        }

        if self.active == 0 {
            Settled::Drained(std::mem::take(&mut self.drain))
        } else {
            Settled::Busy
        }
    }

    pub(crate) fn subscribe(&mut self, tx: oneshot::Sender<()>) {
        self.drain.push(tx);
    }

    pub(crate) fn counts(&self) -> QueueCounts {
        QueueCounts {
            channels: self.channels,
            active: self.active,
            waiting: self.waiting.len(),
        }
    }
}
