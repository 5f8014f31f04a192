// Kiki Companion — Main Event Loop
//
// One wait, then every pending condition in fixed priority order:
//   network error > send audio > wake word > VAD > scheduled tasks > clock

use std::time::Duration;

use super::Application;
use crate::config::*;
use crate::events::{AbortReason, EventSet, MainEvent, Sound};
use crate::scheduler::run_guarded;
use crate::state::DeviceState;

impl Application {
    /// Block forever (or until reboot), dispatching every wake.
    pub fn run(&mut self) {
        self.shared.claim_main_thread();
        log::info!("Main event loop started");
        while !self.is_halted() {
            self.run_once();
        }
        log::info!("Main event loop stopped");
    }

    pub fn run_once(&mut self) {
        let events = self.shared.events.wait(EventSet::ALL);
        self.process(events);
    }

    /// Returns `false` if nothing arrived within `timeout`.
    pub fn run_once_timeout(&mut self, timeout: Duration) -> bool {
        let events = self.shared.events.wait_timeout(EventSet::ALL, timeout);
        if events.is_empty() {
            return false;
        }
        self.process(events);
        true
    }

    /// Handle one observed set of events.
    pub fn process(&mut self, events: EventSet) {
        for event in events.iter() {
            if self.is_halted() {
                return;
            }
            match event {
                MainEvent::NetworkError => self.on_network_error(),
                MainEvent::SendAudio => self.drain_send_queue(),
                MainEvent::WakeWordDetected => self.on_wake_word_detected(),
                MainEvent::VadChange => self.on_vad_change(),
                MainEvent::Schedule => self.run_scheduled(),
                MainEvent::ClockTick => self.on_clock_tick(),
            }
        }
    }

    /// Take whatever is pending and drain the scheduled tasks once.
    pub fn process_pending(&mut self) {
        let events = self.shared.events.take(EventSet::ALL);
        self.process(events);
    }

    fn on_network_error(&mut self) {
        let message = self.handle().last_error();
        self.set_device_state(DeviceState::Idle);
        self.alert(STR_ERROR, &message, "circle_xmark", Some(Sound::Exclamation));
    }

    fn drain_send_queue(&mut self) {
        while let Some(packet) = self.audio.pop_packet_from_send_queue() {
            if !self.protocol.send_audio(packet) {
                break;
            }
        }
    }

    fn on_wake_word_detected(&mut self) {
        self.wake_body();
        match self.state {
            DeviceState::Idle => {
                let wake_word = self.audio.last_wake_word();
                log::info!("Wake word detected: {}", wake_word);
                self.audio.play_sound(Sound::Popup);
                self.audio.encode_wake_word();
                if !self.ensure_audio_channel() {
                    self.audio.enable_wake_word_detection(true);
                    return;
                }
                self.upload_wake_word(&wake_word);
                self.set_listening_mode(self.aec_mode.conversation_mode());
            }
            DeviceState::Speaking => self.abort_speaking(AbortReason::WakeWordDetected),
            DeviceState::Activating => self.set_device_state(DeviceState::Idle),
            _ => {}
        }
    }

    fn on_vad_change(&mut self) {
        if self.state == DeviceState::Listening {
            self.board.led().on_state_changed(self.state, self.audio.is_voice_detected());
        }
    }

    fn run_scheduled(&mut self) {
        let batch = self.shared.tasks.take_batch();
        let total = batch.len();
        for (done, task) in batch.into_iter().enumerate() {
            if self.is_halted() {
                log::info!("Halted, {} scheduled tasks skipped", total - done);
                return;
            }
            run_guarded(self, task);
        }
    }

    fn on_clock_tick(&mut self) {
        self.clock_ticks += 1;
        self.board.display().update_status_bar(false);
        if self.clock_ticks % HEAP_REPORT_EVERY_TICKS == 0 {
            let heap = self.platform.heap_stats();
            log::info!(
                "Free SRAM: {} bytes, minimum: {} bytes",
                heap.free_sram,
                heap.min_free_sram
            );
        }
    }
}
