// Kiki Companion — Event Group
//
// Level-triggered wake primitive for the main loop. Producers only ever set
// bits; the single waiter clears exactly the bits it asked for, so several
// sets before a wake collapse into one observation.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::events::{EventSet, MainEvent};

#[derive(Debug, Default)]
pub struct EventGroup {
    bits: Mutex<u8>,
    changed: Condvar,
}

impl EventGroup {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, u8> {
        self.bits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, event: MainEvent) {
        self.set_all(event.into());
    }

    pub fn set_all(&self, events: EventSet) {
        if events.is_empty() {
            return;
        }
        let mut bits = self.lock();
        *bits |= events.bits();
        self.changed.notify_all();
    }

    /// Pending bits without consuming them.
    pub fn pending(&self) -> EventSet {
        EventSet::from_bits(*self.lock())
    }

    /// Consume whatever is pending in `mask` without blocking.
    pub fn take(&self, mask: EventSet) -> EventSet {
        let mut bits = self.lock();
        Self::consume(&mut bits, mask)
    }

    /// Block until any bit in `mask` is set, then clear and return them.
    pub fn wait(&self, mask: EventSet) -> EventSet {
        let mut bits = self.lock();
        loop {
            let hit = Self::consume(&mut bits, mask);
            if !hit.is_empty() {
                return hit;
            }
            bits = self
                .changed
                .wait(bits)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`, returning an
    /// empty set.
    pub fn wait_timeout(&self, mask: EventSet, timeout: Duration) -> EventSet {
        let deadline = Instant::now() + timeout;
        let mut bits = self.lock();
        loop {
            let hit = Self::consume(&mut bits, mask);
            if !hit.is_empty() {
                return hit;
            }
            let now = Instant::now();
            if now >= deadline {
                return EventSet::EMPTY;
            }
            bits = self
                .changed
                .wait_timeout(bits, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn consume(bits: &mut u8, mask: EventSet) -> EventSet {
        let hit = EventSet::from_bits(*bits).intersect(mask);
        *bits &= !hit.bits();
        hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn repeated_sets_collapse_into_one_wake() {
        let group = EventGroup::new();
        for _ in 0..5 {
            group.set(MainEvent::Schedule);
        }
        let got = group.wait(EventSet::ALL);
        assert_eq!(got, MainEvent::Schedule.into());
        assert!(group.pending().is_empty());
    }

    #[test]
    fn unmasked_bits_survive_a_wait() {
        let group = EventGroup::new();
        group.set(MainEvent::ClockTick);
        group.set(MainEvent::VadChange);
        let got = group.take(MainEvent::VadChange.into());
        assert_eq!(got, MainEvent::VadChange.into());
        assert_eq!(group.pending(), MainEvent::ClockTick.into());
    }

    #[test]
    fn waiter_wakes_on_set_from_another_thread() {
        let group = Arc::new(EventGroup::new());
        let producer = Arc::clone(&group);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.set(MainEvent::NetworkError);
        });
        let got = group.wait_timeout(EventSet::ALL, Duration::from_secs(5));
        assert!(got.contains(MainEvent::NetworkError));
        handle.join().unwrap();
    }

    #[test]
    fn wait_timeout_returns_empty() {
        let group = EventGroup::new();
        let got = group.wait_timeout(EventSet::ALL, Duration::from_millis(10));
        assert!(got.is_empty());
    }
}
