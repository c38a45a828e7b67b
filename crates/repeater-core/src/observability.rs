use serde::{Deserialize, Serialize};

/// Point-in-time view of an [`AsyncQueue`](crate::queue::AsyncQueue).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub channels: usize,
    pub active: usize,
    pub waiting: usize,
}

/// Job totals by status for a [`Repeater`](crate::repeater::Repeater).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.pending + self.completed + self.failed
    }
}
