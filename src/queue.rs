// Mutex + condvar protected FIFOs shared between the public API and the
// fetch/worker stages. parking_lot::Mutex/Condvar play the same role a
// pthread_mutex_t/pthread_cond_t pair would in a C implementation of this
// same producer/consumer handoff.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

// One pending remote fetch, queued from the public API to the fetch stage.
#[derive(Debug, Clone)]
pub struct LoadItem {
    pub url: String,
}

// One unit of deliverable output, queued from the fetch stage (or the
// load() fast path) to the worker stage.
#[derive(Debug, Clone)]
pub struct WorkItem {
    pub url: String,
    pub bytes: Option<Vec<u8>>,
    pub request_failed: bool,
}

pub(crate) struct QueueState<T> {
    pub items: VecDeque<T>,
    pub running: bool,
}

impl<T> QueueState<T> {
    fn new() -> Self {
        Self {
            items: VecDeque::new(),
            running: true,
        }
    }
}

// A queue plus its condvar, guarding both the FIFO and the owning
// thread's running flag under one lock.
pub(crate) struct SharedQueue<T> {
    state: Mutex<QueueState<T>>,
    cond: Condvar,
}

impl<T> SharedQueue<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::new()),
            cond: Condvar::new(),
        })
    }

    pub fn push(&self, item: T) {
        let mut state = self.state.lock();
        state.items.push_back(item);
        self.cond.notify_one();
    }

    // Take every item currently queued, in FIFO order. Callers should not
    // assume anything beyond "each item is seen exactly once", there's no
    // ordering guarantee across separate drains.
    pub fn drain_all(&self) -> Vec<T> {
        let mut state = self.state.lock();
        state.items.drain(..).collect()
    }

    // Pop up to max items, used by the fetch stage to fill free transfer
    // slots.
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut state = self.state.lock();
        let n = max.min(state.items.len());
        state.items.drain(..n).collect()
    }

    // Block until either the queue is non-empty or the thread has been
    // told to stop. Returns false if the thread should stop.
    pub fn wait_while_empty_and_running(&self) -> bool {
        let mut state = self.state.lock();
        while state.items.is_empty() && state.running {
            self.cond.wait(&mut state);
        }
        state.running
    }

    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.running = false;
        self.cond.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }
}
