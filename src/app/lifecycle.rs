// Kiki Companion — Boot & Collaborator Wiring
//
// `start` registers the audio and protocol callbacks, starts the clock and
// hands the network / version check half of boot to its own thread. That
// thread schedules `finish_boot` back onto the main loop when it is done.

use std::time::Duration;

use super::{AppHandle, Application};
use crate::audio::AudioCallbacks;
use crate::config::*;
use crate::events::{MainEvent, Sound};
use crate::ota::{Ota, OtaHost};
use crate::protocol::ProtocolCallbacks;
use crate::state::DeviceState;
use crate::tasks;

impl Application {
    pub fn start(&mut self, ota: Box<dyn Ota>) -> anyhow::Result<()> {
        self.set_device_state(DeviceState::Starting);
        let user_agent = self.board.user_agent();
        log::info!("Board {} ({})", self.board.name(), user_agent);
        self.board.display().set_chat_message("system", &user_agent);

        self.audio.initialize(self.audio_callbacks());
        self.audio.start();
        self.protocol.set_callbacks(self.protocol_callbacks());

        tasks::clock::spawn(self.handle().events(), self.platform.clone())?;
        tasks::boot::spawn(self.handle(), self.board.clone(), self.platform.clone(), ota)?;
        Ok(())
    }

    /// Last step of boot, on the main loop: open the session and go Idle.
    pub fn finish_boot(&mut self) {
        let started = self.protocol.start();
        self.set_device_state(DeviceState::Idle);
        if started {
            let display = self.board.display();
            display.show_notification(
                &format!("{}{}", STR_VERSION, self.firmware_version),
                Duration::from_millis(EMOJI_NOTICE_MS),
            );
            display.set_chat_message("system", "");
            self.audio.play_sound(Sound::Success);
        } else {
            self.alert(STR_ERROR, STR_PROTOCOL_FAILED, "circle_xmark", Some(Sound::Exclamation));
        }
    }

    pub fn audio_callbacks(&self) -> AudioCallbacks {
        let send = self.handle().events();
        let wake = self.handle().events();
        let vad = self.handle().events();
        AudioCallbacks {
            on_send_queue_available: Box::new(move || send.set(MainEvent::SendAudio)),
            on_wake_word_detected: Box::new(move |_| wake.set(MainEvent::WakeWordDetected)),
            on_vad_change: Box::new(move |_| vad.set(MainEvent::VadChange)),
        }
    }

    pub fn protocol_callbacks(&self) -> ProtocolCallbacks {
        let connected = self.handle();
        let errors = self.handle();
        let incoming = self.handle();
        let audio = self.audio.clone();
        let opened = self.handle();
        let closed = self.handle();
        let json = self.handle();
        ProtocolCallbacks {
            on_connected: Box::new(move || connected.schedule(|app| app.dismiss_alert())),
            on_network_error: Box::new(move |message| errors.report_network_error(message)),
            on_incoming_audio: Box::new(move |packet| {
                if matches!(incoming.state(), DeviceState::Speaking | DeviceState::Listening)
                    && !audio.push_packet_to_decode_queue(packet)
                {
                    log::warn!("Decode queue full, audio packet dropped");
                }
            }),
            on_audio_channel_opened: Box::new(move || {
                opened.schedule(|app| app.set_power_save_mode(false))
            }),
            on_audio_channel_closed: Box::new(move || {
                closed.schedule(|app| {
                    app.set_power_save_mode(true);
                    app.board.display().set_chat_message("system", "");
                    app.set_device_state(DeviceState::Idle);
                })
            }),
            on_incoming_json: Box::new(move |value| {
                let value = value.clone();
                json.schedule(move |app| app.handle_server_message(&value));
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Version check support
// ---------------------------------------------------------------------------

impl OtaHost for AppHandle {
    fn device_state(&self) -> DeviceState {
        self.state()
    }

    fn set_device_state(&self, state: DeviceState) {
        if self.call(move |app| app.set_device_state(state)).is_none() {
            log::warn!("State change to {} not confirmed", state);
        }
    }

    fn set_status(&self, status: &str) {
        let status = status.to_owned();
        self.schedule(move |app| app.board.display().set_status(&status));
    }

    fn set_chat_message(&self, role: &str, content: &str) {
        let (role, content) = (role.to_owned(), content.to_owned());
        self.schedule(move |app| app.board.display().set_chat_message(&role, &content));
    }

    fn alert(&self, status: &str, message: &str, emotion: &str, sound: Option<Sound>) {
        let (status, message, emotion) = (status.to_owned(), message.to_owned(), emotion.to_owned());
        self.schedule(move |app| app.alert(&status, &message, &emotion, sound));
    }

    fn play_sound(&self, sound: Sound) {
        self.schedule(move |app| app.audio.play_sound(sound));
    }

    fn close_audio_channel(&self) {
        self.call(|app| {
            if app.protocol.is_audio_channel_opened() {
                app.protocol.close_audio_channel();
            }
        });
    }

    fn set_power_save_mode(&self, enabled: bool) {
        self.schedule(move |app| app.set_power_save_mode(enabled));
    }

    fn start_audio(&self) {
        self.call(|app| app.audio.start());
    }

    fn stop_audio(&self) {
        self.call(|app| app.audio.stop());
    }

    fn reboot(&self) {
        AppHandle::reboot(self);
    }
}
