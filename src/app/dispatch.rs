// Kiki Companion — Server Message Handling
//
// Background music is a guard on every reply path: while a track is loading
// or playing, the server's speech never takes the device out of Idle.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::messages::{ServerMessage, TtsState};
use super::Application;
use crate::commands::{CommandAction, MusicAction, TranscriptRules};
use crate::config::*;
use crate::events::{AbortReason, Sound};
use crate::protocol;
use crate::state::{DeviceState, MediaActivity};

impl Application {
    /// Entry point for every JSON object the protocol delivers. Malformed
    /// messages are logged and dropped.
    pub fn handle_server_message(&mut self, value: &Value) {
        match ServerMessage::parse(value) {
            Ok(message) => self.dispatch(message),
            Err(e) => log::warn!("Ignoring server message: {}", e),
        }
    }

    fn dispatch(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Tts { state, text } => self.on_tts(state, text),
            ServerMessage::Stt { text } => self.on_stt(&text),
            ServerMessage::Llm { text, emotion } => self.on_llm(text, emotion),
            ServerMessage::Mcp { payload } => {
                if !payload.is_object() {
                    log::warn!("MCP payload is not an object");
                    return;
                }
                match &self.mcp {
                    Some(mcp) => mcp.handle_message(&payload),
                    None => log::debug!("No MCP dispatcher, payload dropped"),
                }
            }
            ServerMessage::System { command } => {
                log::info!("System command: {}", command);
                if command == "reboot" {
                    self.shared.tasks.schedule(|app| app.reboot());
                } else {
                    log::warn!("Unknown system command: {}", command);
                }
            }
            ServerMessage::Alert { status, message, emotion } => {
                self.alert(&status, &message, &emotion, Some(Sound::Vibration));
            }
            ServerMessage::Custom { payload } => {
                if payload.is_object() {
                    self.board.display().set_chat_message("system", &payload.to_string());
                } else {
                    log::warn!("Custom payload is not an object");
                }
            }
        }
    }

    fn on_tts(&mut self, state: TtsState, text: Option<String>) {
        let media = self.media_activity();
        match state {
            TtsState::Start => {
                if media.is_active() {
                    log::info!("Music active, speech start ignored");
                    return;
                }
                self.aborted = false;
                if matches!(self.state, DeviceState::Idle | DeviceState::Listening) {
                    self.set_device_state(DeviceState::Speaking);
                }
            }
            TtsState::Stop => {
                if !matches!(self.state, DeviceState::Speaking | DeviceState::Idle) {
                    return;
                }
                self.release_forced_emotion();
                if media.is_active() {
                    self.set_device_state(DeviceState::Idle);
                } else {
                    self.set_listening_mode(self.aec_mode.conversation_mode());
                }
            }
            TtsState::SentenceStart => {
                if media.is_active() {
                    return;
                }
                if let Some(text) = text {
                    log::info!("<< {}", text);
                    self.board.display().set_chat_message("assistant", &text);
                }
            }
            TtsState::Other => {}
        }
    }

    fn on_stt(&mut self, text: &str) {
        if TranscriptRules::is_placeholder(text) {
            log::debug!("Placeholder transcript ignored");
            return;
        }
        log::info!(">> {}", text);
        let outcome = self.rules.evaluate(text, self.settings.as_ref());
        for action in outcome.actions {
            self.apply_command(action, text);
        }
        if !outcome.consumed {
            self.board.display().set_chat_message("user", text);
        }
    }

    fn on_llm(&mut self, text: Option<String>, emotion: Option<String>) {
        if self.media_activity() == MediaActivity::Loading {
            log::info!("Music loading, reply dropped");
            self.set_device_state(DeviceState::Idle);
            return;
        }
        let display = self.board.display();
        if let Some(text) = text.filter(|t| is_meaningful(t)) {
            display.set_chat_message("assistant", &text);
        }
        if let Some(emotion) = emotion {
            match &self.forced_emotion {
                Some(forced) => log::debug!("Emotion {} held back, {} is pinned", emotion, forced),
                None => display.set_emotion(&emotion),
            }
        }
    }

    /// Drop the pinned emotion and bring the chat view back.
    fn release_forced_emotion(&mut self) {
        if self.forced_emotion.take().is_none() {
            return;
        }
        let display = self.board.display();
        if let Some(overlay) = display.emoji_overlay() {
            overlay.set_chat_hidden(false);
            overlay.set_overlay_mode(false);
        }
        display.set_emotion("neutral");
    }

    fn apply_command(&mut self, action: CommandAction, text: &str) {
        let display = self.board.display();
        match action {
            CommandAction::Queue(entry) => match &self.motion {
                Some(queue) => {
                    if let Err(e) = queue.enqueue(entry) {
                        log::warn!("Voice action {} not queued: {}", entry.action_type, e);
                    }
                }
                None => log::debug!("No motion queue, action {} dropped", entry.action_type),
            },
            CommandAction::StopMotion => match &self.motion {
                Some(queue) => {
                    if let Err(e) = queue.stop_all() {
                        log::warn!("Home pose not queued after stop: {}", e);
                    }
                }
                None => log::debug!("No motion queue, stop ignored"),
            },
            CommandAction::ForceEmotion { emotion, overlay } => {
                display.set_emotion(&emotion);
                if overlay {
                    if let Some(o) = display.emoji_overlay() {
                        o.set_chat_hidden(true);
                        o.set_overlay_mode(true);
                    }
                }
                self.forced_emotion = Some(emotion);
            }
            CommandAction::OpenControlPanel => {
                let url = self
                    .board
                    .control_panel()
                    .and_then(|panel| panel.start())
                    .unwrap_or_else(|| CONTROL_PANEL_FALLBACK_URL.to_owned());
                log::info!("Control panel at {}", url);
                let shown = Duration::from_millis(CONTROL_PANEL_NOTICE_MS);
                display.show_notification(&format!("🌐 {}", url), shown);
                if let Some(o) = display.emoji_overlay() {
                    o.show_qr_code(&url, shown);
                }
                self.audio.play_sound(Sound::Ding);
            }
            CommandAction::ToggleEmojiStyle => match display.emoji_overlay() {
                Some(o) => {
                    let animated = !o.is_animated_style();
                    o.set_animated_style(animated);
                    let name = if animated { "Animated" } else { "Unicode" };
                    display.show_notification(
                        &format!("🎭 Emoji: {}", name),
                        Duration::from_millis(EMOJI_NOTICE_MS),
                    );
                    display.set_emotion("happy");
                }
                None => log::debug!("Display has no emoji overlay"),
            },
            CommandAction::ShowClock => {
                if let Some(o) = display.emoji_overlay() {
                    o.toggle_clock();
                }
            }
            CommandAction::MusicControl(action) => self.send_music_control(action, text),
            CommandAction::PlaySong(song) => {
                if self.board.music().is_none() {
                    log::warn!("No music player for \"{}\"", song);
                    return;
                }
                self.abort_speaking(AbortReason::None);
                self.set_device_state(DeviceState::Idle);
                self.board
                    .display()
                    .set_chat_message("assistant", &format!("{}{}", STR_NOW_PLAYING, song));
                self.shared.tasks.schedule(move |app| app.play_song(&song));
            }
        }
    }

    fn send_music_control(&mut self, action: MusicAction, text: &str) {
        if self.protocol.is_audio_channel_opened() {
            let frame = protocol::music_control(action.as_str(), text);
            if !self.protocol.send_json_text(&frame.to_string()) {
                log::warn!("Music control {} not sent", action.as_str());
            }
        } else {
            log::info!("Channel closed, music control {} not forwarded", action.as_str());
        }
        self.board.display().show_notification(
            &format!("{} {}", action.icon(), action.as_str()),
            Duration::from_millis(MUSIC_NOTICE_MS),
        );
    }

    fn play_song(&mut self, song: &str) {
        let board = Arc::clone(&self.board);
        let Some(music) = board.music() else {
            return;
        };
        if music.activity().is_active() {
            log::info!("Music already active, \"{}\" not started", song);
            return;
        }
        self.abort_speaking(AbortReason::None);
        if !music.download_and_play(song) {
            log::warn!("Could not start \"{}\"", song);
        }
    }
}

/// Worth showing: some printable ASCII near the start, or more than a
/// couple of bytes of anything.
fn is_meaningful(text: &str) -> bool {
    text.bytes().take(100).any(|b| b.is_ascii_graphic()) || text.len() > 2
}

#[cfg(test)]
mod tests {
    use super::is_meaningful;

    #[test]
    fn meaningful_text() {
        assert!(is_meaningful("ok"));
        assert!(is_meaningful("😊"));
        assert!(!is_meaningful(" "));
        assert!(!is_meaningful(""));
    }
}
