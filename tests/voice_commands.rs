// Kiki Companion — Voice Commands Through the Message Path

mod common;

use common::Rig;
use serde_json::json;

use kiki_companion::config::{KEY_CUSTOM_EMOTION, KEY_CUSTOM_KEYWORDS, KEY_CUSTOM_POSE, NS_STORAGE};
use kiki_companion::motion::{ActionEntry, ActionKind};
use kiki_companion::platform::sim::SIM_PANEL_URL;
use kiki_companion::settings::SettingsStore;
use kiki_companion::state::DeviceState;

fn queued(rig: &Rig) -> Vec<ActionEntry> {
    rig.queue.receiver().try_iter().collect()
}

#[test]
fn placeholder_transcripts_are_not_shown() {
    let mut rig = Rig::idle();
    rig.inject(json!({"type": "stt", "text": "text_input"}));
    assert!(rig.journal.last_matching("display.chat:user:").is_none());
}

#[test]
fn plain_transcript_is_shown_as_user_chat() {
    let mut rig = Rig::idle();
    rig.inject(json!({"type": "stt", "text": "What is your name?"}));
    assert!(rig.journal.contains("display.chat:user:What is your name?"));
    assert!(queued(&rig).is_empty());
}

#[test]
fn stand_up_queues_a_pose_and_still_shows_the_text() {
    let mut rig = Rig::idle();
    rig.inject(json!({"type": "stt", "text": "Kiki, stand up!"}));
    assert_eq!(queued(&rig), vec![ActionEntry::new(ActionKind::StandUp, 1, 500)]);
    assert!(rig.journal.contains("display.chat:user:Kiki, stand up!"));
}

#[test]
fn stop_flushes_queued_motion_and_goes_home() {
    let mut rig = Rig::idle();
    let stop = rig.queue.stop_signal();
    let before = stop.epoch();
    rig.queue.queue_kind(ActionKind::Walk, 4, 300).unwrap();
    rig.queue.queue_kind(ActionKind::Dance, 2, 200).unwrap();

    rig.inject(json!({"type": "stt", "text": "Kiki, stop moving"}));
    assert!(stop.is_cancelled(before));
    assert_eq!(queued(&rig), vec![ActionEntry::home()]);
    assert!(rig.journal.contains("display.chat:user:Kiki, stop moving"));
}

#[test]
fn celebration_pins_the_face_until_speech_ends() {
    let mut rig = Rig::idle_with_channel();
    rig.inject(json!({"type": "stt", "text": "Happy birthday Kiki"}));
    assert_eq!(rig.app.forced_emotion(), Some("silly"));
    assert_eq!(
        queued(&rig),
        vec![ActionEntry::new(ActionKind::Bow, 1, 1500), ActionEntry::new(ActionKind::WagTail, 5, 100)]
    );

    rig.inject(json!({"type": "tts", "state": "start"}));
    rig.inject(json!({"type": "llm", "emotion": "sad"}));
    assert!(!rig.journal.contains("display.emotion:sad"));

    rig.inject(json!({"type": "tts", "state": "stop"}));
    assert_eq!(rig.app.forced_emotion(), None);
    rig.inject(json!({"type": "llm", "emotion": "sad"}));
    assert!(rig.journal.contains("display.emotion:sad"));
}

#[test]
fn qr_request_raises_the_overlay() {
    let mut rig = Rig::idle_with_channel();
    rig.app.set_device_state(DeviceState::Speaking);
    rig.inject(json!({"type": "stt", "text": "show qr code please"}));
    assert!(rig.journal.contains("display.emotion:winking"));
    assert!(rig.journal.contains("overlay.chat_hidden:true"));
    assert!(rig.journal.contains("overlay.mode:true"));

    rig.inject(json!({"type": "tts", "state": "stop"}));
    assert!(rig.journal.contains("overlay.chat_hidden:false"));
    assert!(rig.journal.contains("overlay.mode:false"));
}

#[test]
fn control_panel_is_opened_locally() {
    let mut rig = Rig::idle();
    rig.inject(json!({"type": "stt", "text": "open the control panel"}));
    assert!(rig.journal.contains("panel.start"));
    assert!(rig.journal.contains(&format!("display.notification:🌐 {}", SIM_PANEL_URL)));
    assert!(rig.journal.contains(&format!("overlay.qr:{}", SIM_PANEL_URL)));
    assert!(rig.journal.contains("audio.sound:ding"));
    assert!(rig.journal.last_matching("display.chat:user:").is_none());
}

#[test]
fn emoji_toggle_flips_the_style() {
    let mut rig = Rig::idle();
    rig.inject(json!({"type": "stt", "text": "switch emoji"}));
    assert!(rig.journal.contains("overlay.animated:false"));
    assert!(rig.journal.contains("display.notification:🎭 Emoji: Unicode"));
    rig.inject(json!({"type": "stt", "text": "switch emoji"}));
    assert!(rig.journal.contains("overlay.animated:true"));
}

#[test]
fn custom_keywords_come_from_settings() {
    let mut rig = Rig::idle();
    rig.settings.set_string(NS_STORAGE, KEY_CUSTOM_KEYWORDS, "pizza, Pho").unwrap();
    rig.settings.set_string(NS_STORAGE, KEY_CUSTOM_EMOTION, "loving").unwrap();
    rig.settings.set_string(NS_STORAGE, KEY_CUSTOM_POSE, "sit").unwrap();

    rig.inject(json!({"type": "stt", "text": "I made PHO today"}));
    assert!(rig.journal.contains("display.emotion:loving"));
    assert_eq!(queued(&rig), vec![ActionEntry::new(ActionKind::SitDown, 1, 1500)]);
}

#[test]
fn song_request_starts_playback_on_the_next_wake() {
    let mut rig = Rig::idle_with_channel();
    rig.app.set_device_state(DeviceState::Speaking);
    rig.inject(json!({"type": "stt", "text": "play song Yellow Submarine"}));

    assert_eq!(rig.app.device_state(), DeviceState::Idle);
    assert!(rig.journal.contains("display.chat:assistant:Now playing: Yellow Submarine"));
    assert!(!rig.journal.contains("music.play:Yellow Submarine"));

    rig.app.process_pending();
    assert!(rig.journal.contains("music.play:Yellow Submarine"));
    assert!(rig.journal.last_matching("display.chat:user:").is_none());
}

#[test]
fn music_controls_are_forwarded_over_an_open_channel() {
    let mut rig = Rig::idle_with_channel();
    rig.inject(json!({"type": "stt", "text": "next song"}));
    let sent = rig.journal.last_matching("protocol.json:").unwrap();
    let frame: serde_json::Value = serde_json::from_str(&sent["protocol.json:".len()..]).unwrap();
    assert_eq!(frame["type"], "music_control");
    assert_eq!(frame["action"], "next");
    assert_eq!(frame["text"], "next song");
    assert!(rig.journal.contains("display.notification:⏭️ next"));
}

#[test]
fn mcp_payloads_reach_the_dispatcher() {
    use std::sync::{Arc, Mutex};
    use kiki_companion::protocol::McpDispatcher;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<serde_json::Value>>);
    impl McpDispatcher for Recorder {
        fn handle_message(&self, payload: &serde_json::Value) {
            self.0.lock().unwrap().push(payload.clone());
        }
    }

    let recorder = Arc::new(Recorder::default());
    let dispatcher = recorder.clone();
    let mut rig = Rig::with(move |app| app.with_mcp(dispatcher));
    rig.inject(json!({"type": "mcp", "payload": {"jsonrpc": "2.0", "method": "tools/list", "id": 1}}));
    assert_eq!(recorder.0.lock().unwrap()[0]["method"], "tools/list");
}
