// Kiki Companion — Application Handle
//
// Cloneable, thread-safe front of the application. Everything that changes
// conversation state is scheduled onto the main loop; the few reads are
// published snapshots.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use crossbeam_channel::bounded;

use super::{Application, Shared};
use crate::config::MAIN_CALL_TIMEOUT_MS;
use crate::event_group::EventGroup;
use crate::events::{AbortReason, MainEvent};
use crate::state::{AecMode, DeviceState};
use crate::tasks::sleep::SleepHost;

#[derive(Clone)]
pub struct AppHandle {
    shared: Arc<Shared>,
}

impl AppHandle {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Run `task` on the main loop at its next wake. Fire-and-forget.
    pub fn schedule<F>(&self, task: F)
    where
        F: FnOnce(&mut Application) + Send + 'static,
    {
        self.shared.tasks.schedule(task);
    }

    /// Run `task` on the main loop and wait for its result. Returns `None`
    /// when called from the main loop itself or when the loop does not get
    /// to it within the call timeout.
    pub fn call<R, F>(&self, task: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&mut Application) -> R + Send + 'static,
    {
        if self.shared.is_main_thread() {
            log::error!("Blocking call issued from the main loop, refused");
            return None;
        }
        let (tx, rx) = bounded(1);
        self.schedule(move |app| {
            let _ = tx.send(task(app));
        });
        match rx.recv_timeout(Duration::from_millis(MAIN_CALL_TIMEOUT_MS)) {
            Ok(result) => Some(result),
            Err(e) => {
                log::warn!("Main loop call not answered: {}", e);
                None
            }
        }
    }

    pub fn is_main_thread(&self) -> bool {
        self.shared.is_main_thread()
    }

    /// Published device state; for display and telemetry only.
    pub fn state(&self) -> DeviceState {
        self.shared.state.get()
    }

    pub fn events(&self) -> Arc<EventGroup> {
        Arc::clone(&self.shared.events)
    }

    pub fn is_halted(&self) -> bool {
        self.shared.is_halted()
    }

    pub fn can_enter_sleep_mode(&self) -> bool {
        self.state() == DeviceState::Idle
            && !self.shared.protocol.is_audio_channel_opened()
            && self.shared.audio.is_idle()
    }

    pub fn last_error(&self) -> String {
        self.shared
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record a transport failure and wake the main loop to show it.
    pub fn report_network_error(&self, message: &str) {
        *self.shared.last_error.lock().unwrap_or_else(PoisonError::into_inner) = message.to_owned();
        self.shared.events.set(MainEvent::NetworkError);
    }

    // -----------------------------------------------------------------------
    // Entry points for buttons, the web panel and tool calls
    // -----------------------------------------------------------------------

    pub fn toggle_chat_state(&self) {
        self.schedule(|app| app.toggle_chat_state());
    }

    pub fn start_listening(&self) {
        self.schedule(|app| app.start_listening());
    }

    pub fn stop_listening(&self) {
        self.schedule(|app| app.stop_listening());
    }

    pub fn abort_speaking(&self, reason: AbortReason) {
        self.schedule(move |app| app.abort_speaking(reason));
    }

    pub fn wake_word_invoke(&self, wake_word: &str) {
        let wake_word = wake_word.to_owned();
        self.schedule(move |app| app.wake_word_invoke(&wake_word));
    }

    pub fn send_stt_message(&self, text: &str) {
        let text = text.to_owned();
        self.schedule(move |app| {
            if !app.send_stt_message(&text) {
                log::warn!("Text input not delivered");
            }
        });
    }

    pub fn set_aec_mode(&self, mode: AecMode) {
        self.schedule(move |app| app.set_aec_mode(mode));
    }

    pub fn reboot(&self) {
        self.schedule(|app| app.reboot());
    }

    /// Sent directly when already on the main loop, otherwise scheduled.
    pub fn send_mcp_message(&self, payload: &str) {
        if self.is_main_thread() {
            self.shared.protocol.send_mcp_message(payload);
        } else {
            let payload = payload.to_owned();
            self.schedule(move |app| app.protocol.send_mcp_message(&payload));
        }
    }

    /// Returns the send result on the main loop; `true` once scheduled
    /// anywhere else.
    pub fn send_raw_text(&self, text: &str) -> bool {
        if self.is_main_thread() {
            return self.shared.protocol.send_json_text(text);
        }
        let text = text.to_owned();
        self.schedule(move |app| {
            if !app.protocol.send_json_text(&text) {
                log::warn!("Raw text send failed");
            }
        });
        true
    }
}

impl SleepHost for AppHandle {
    fn can_enter_sleep_mode(&self) -> bool {
        AppHandle::can_enter_sleep_mode(self)
    }

    fn schedule(&self, task: Box<dyn FnOnce() + Send>) {
        AppHandle::schedule(self, move |_| task());
    }

    fn is_wake_word_running(&self) -> bool {
        self.shared.audio.is_wake_word_running()
    }

    fn set_wake_word_detection(&self, enabled: bool) {
        self.shared.audio.enable_wake_word_detection(enabled);
    }
}
