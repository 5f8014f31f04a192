// Kiki Companion — Scheduled Task Queue
//
// Any thread may hand a closure to the main loop. Closures run in FIFO order,
// one batch per wake: whatever is submitted while a batch drains waits for
// the next wake.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::event_group::EventGroup;
use crate::events::MainEvent;

/// One-shot work item executed on the main loop with exclusive access to `C`.
pub type Task<C> = Box<dyn FnOnce(&mut C) + Send + 'static>;

pub struct TaskQueue<C> {
    pending: Mutex<VecDeque<Task<C>>>,
    events: Arc<EventGroup>,
}

impl<C> TaskQueue<C> {
    pub fn new(events: Arc<EventGroup>) -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            events,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task<C>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a closure and wake the main loop. Fire-and-forget.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce(&mut C) + Send + 'static,
    {
        self.lock().push_back(Box::new(task));
        self.events.set(MainEvent::Schedule);
    }

    /// Swap out everything queued so far.
    pub fn take_batch(&self) -> VecDeque<Task<C>> {
        std::mem::take(&mut *self.lock())
    }

    /// Drop everything queued so far, returning how many were discarded.
    pub fn clear(&self) -> usize {
        let mut pending = self.lock();
        let n = pending.len();
        pending.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Run one task, containing a panic to this task only. Returns `false` if
/// the task panicked.
pub fn run_guarded<C>(ctx: &mut C, task: Task<C>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(|| task(ctx))) {
        Ok(()) => true,
        Err(payload) => {
            log::error!("Scheduled task panicked: {}", panic_message(payload.as_ref()));
            false
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic>"
    }
}
