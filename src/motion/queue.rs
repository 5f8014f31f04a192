// Kiki Companion — Action Queue
//
// Bounded FIFO between whoever asks for movement (voice rules, tool calls,
// the control panel) and the motion task. Producers never block for long:
// when the queue stays full the oldest request is dropped.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TryRecvError};

use super::{ActionEntry, ActionKind};
use crate::config::{ACTION_ENQUEUE_TIMEOUT_MS, ACTION_QUEUE_CAPACITY};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("action queue full")]
    Full,
    #[error("motion task is gone")]
    Disconnected,
}

/// Cancellation epoch. Every `request()` invalidates whatever was playing
/// when it was issued.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicU32>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    pub fn epoch(&self) -> u32 {
        self.0.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self, since: u32) -> bool {
        self.epoch() != since
    }
}

#[derive(Clone)]
pub struct ActionQueue {
    tx: Sender<ActionEntry>,
    rx: Receiver<ActionEntry>,
    stop: StopSignal,
    send_timeout: Duration,
}

impl ActionQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity);
        Self {
            tx,
            rx,
            stop: StopSignal::new(),
            send_timeout: Duration::from_millis(ACTION_ENQUEUE_TIMEOUT_MS),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(ACTION_QUEUE_CAPACITY)
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Enqueue, evicting the oldest entry if the queue stays full for the
    /// send timeout.
    pub fn enqueue(&self, entry: ActionEntry) -> Result<(), EnqueueError> {
        match self.tx.send_timeout(entry, self.send_timeout) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Disconnected(_)) => Err(EnqueueError::Disconnected),
            Err(SendTimeoutError::Timeout(entry)) => {
                if let Ok(dropped) = self.rx.try_recv() {
                    log::warn!(
                        "Action queue full, dropped oldest action {}",
                        dropped.action_type
                    );
                }
                self.tx.try_send(entry).map_err(|_| {
                    log::error!("Action queue still full, action {} lost", entry.action_type);
                    EnqueueError::Full
                })
            }
        }
    }

    pub fn queue(
        &self,
        action_type: i32,
        steps: i32,
        speed: i32,
        direction: i32,
        amount: i32,
    ) -> Result<(), EnqueueError> {
        self.enqueue(ActionEntry {
            action_type,
            steps,
            speed,
            direction,
            amount,
        })
    }

    pub fn queue_kind(&self, kind: ActionKind, steps: i32, speed: i32) -> Result<(), EnqueueError> {
        self.enqueue(ActionEntry::new(kind, steps, speed))
    }

    /// Cancel the running action, flush pending ones and return home.
    pub fn stop_all(&self) -> Result<(), EnqueueError> {
        self.stop.request();
        let mut flushed = 0;
        loop {
            match self.rx.try_recv() {
                Ok(_) => flushed += 1,
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        log::info!("Stop requested, {} pending actions flushed", flushed);
        self.enqueue(ActionEntry::home())
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.tx.capacity().unwrap_or(0)
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn receiver(&self) -> Receiver<ActionEntry> {
        self.rx.clone()
    }
}
