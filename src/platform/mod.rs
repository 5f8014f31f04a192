// Kiki Companion — Platform Services
//
// Chip-level services: delays, restart, heap statistics, render-loop
// suspension and the two sleep modes.

use std::time::Duration;

#[cfg(target_os = "espidf")]
pub mod esp;
pub mod sim;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupCause {
    Timer,
    Gpio,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeapStats {
    pub free_sram: usize,
    pub min_free_sram: usize,
}

pub trait Platform: Send + Sync {
    /// Block the calling task.
    fn sleep(&self, duration: Duration);
    /// Milliseconds since boot.
    fn now_ms(&self) -> u64;
    /// Hard reset. Does not return on hardware.
    fn restart(&self);
    fn heap_stats(&self) -> HeapStats;

    /// Flush a final frame and stop the render task.
    fn suspend_render(&self);
    fn resume_render(&self);

    /// Enter light sleep with a timer wakeup armed; returns why it woke.
    fn light_sleep(&self, wake_after: Duration) -> WakeupCause;
    /// Enter deep sleep. Does not return on hardware.
    fn deep_sleep(&self);
}
