//! Per-priority-class FIFO queue.
//!
//! A bounded `VecDeque` behind its own lock rather than an `mpsc` channel:
//! the dispatch loop needs `len()` for `GetDetailedStats` and must be able to
//! pick *which* class to pop from each tick, which a channel's `Receiver`
//! does not expose.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::request::Request;

pub struct ClassQueue {
    requests: Mutex<VecDeque<Request>>,
    max_depth: usize,
}

impl ClassQueue {
    pub fn new(max_depth: usize) -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            max_depth,
        }
    }

    /// Enqueue at the back. Returns the request back to the caller if the
    /// class is already at `max_depth`.
    pub fn try_push(&self, request: Request) -> Result<(), Request> {
        let mut guard = self.requests.lock();
        if guard.len() >= self.max_depth {
            return Err(request);
        }
        guard.push_back(request);
        Ok(())
    }

    pub fn pop_front(&self) -> Option<Request> {
        self.requests.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One `ClassQueue` per priority level, indexed `0..L`.
pub struct ClassQueues {
    queues: Vec<ClassQueue>,
}

impl ClassQueues {
    pub fn new(num_levels: u8, max_depth: usize) -> Self {
        Self {
            queues: (0..num_levels).map(|_| ClassQueue::new(max_depth)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn get(&self, class: usize) -> &ClassQueue {
        &self.queues[class]
    }

    pub fn depths(&self) -> Vec<usize> {
        self.queues.iter().map(|q| q.len()).collect()
    }

    pub fn non_empty_mask(&self) -> Vec<bool> {
        self.queues.iter().map(|q| !q.is_empty()).collect()
    }
}
