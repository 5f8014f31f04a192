// Kiki Companion — Clock Task
//
// Sets the ClockTick bit once a second. The main loop does the counting.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{CLOCK_TICK_MS, STACK_CLOCK};
use crate::event_group::EventGroup;
use crate::events::MainEvent;
use crate::platform::Platform;

pub fn clock_task(events: Arc<EventGroup>, platform: Arc<dyn Platform>) {
    log::info!("Clock task started");
    let period = Duration::from_millis(CLOCK_TICK_MS);
    loop {
        platform.sleep(period);
        events.set(MainEvent::ClockTick);
    }
}

pub fn spawn(events: Arc<EventGroup>, platform: Arc<dyn Platform>) -> anyhow::Result<JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("clock".into())
        .stack_size(STACK_CLOCK)
        .spawn(move || clock_task(events, platform))?;
    Ok(handle)
}
