// Kiki Companion — Voice Command Rules
//
// Transcripts from the speech service are scanned for a handful of local
// commands before they reach the chat view. The rules only decide; the main
// loop carries the resulting `CommandAction`s out.
//
// Phrases are matched case-insensitively, in Vietnamese (with and without
// diacritics) and English.

use crate::config::*;
use crate::motion::{ActionEntry, ActionKind};
use crate::settings::SettingsStore;

/// Transcript texts the service sends for non-voice input.
const PLACEHOLDERS: &[&str] = &[
    "", "text_input", "web_input", "text input", "Ly Ly", "ly ly", "text", "Text",
];

const STOP_MOTION: &[&str] = &[
    "dừng lại", "dung lai", "đứng yên", "dung yen", "stop moving", "freeze", "stay still",
];

const STAND_UP: &[&str] = &["đứng lên", "đứng dậy", "dung len", "dung day", "home position"];

const QR_CODE: &[&str] = &[
    "hiện mã qr", "hien ma qr", "mã qr", "ma qr", "mã quy rờ", "ma quy ro", "quy rờ", "quy ro",
    "mã ngân hàng", "ma ngan hang", "ngân hàng", "ngan hang", "qr code", "show qr", "bank code",
];

const GOODBYE: &[&str] = &["tạm biệt", "tam biet", "bye bye", "goodbye", "see you"];

const CONTROL_PANEL: &[&str] = &[
    "bảng điều khiển", "bang dieu khien", "trang điều khiển", "trang dieu khien",
    "web control", "control panel", "mở web", "mo web",
];

const CELEBRATION: &[&str] = &[
    "sinh nhật", "sinh nhat", "happy birthday", "năm mới", "nam moi", "happy new year",
    "mừng noel", "mung noel", "merry christmas", "chúc mừng giáng sinh", "chuc mung giang sinh",
    "ngày cưới", "ngay cuoi", "happy wedding",
];

const SHOOT: &[&str] = &[
    "súng nè", "sung ne", "bắn", "ban ne", "bang bang", "bùm", "bum", "shoot", "gun",
];

const EMOJI_TOGGLE: &[&str] = &[
    "đổi biểu cảm", "doi emoji", "chuyển emoji", "chuyen emoji", "thay doi emoji",
    "đổi biểu tượng", "doi bieu tuong", "toggle emoji", "switch emoji", "change emoji",
];

const CLOCK: &[&str] = &[
    "đồng hồ", "dong ho", "mấy giờ", "may gio", "xem giờ", "xem gio", "hiện giờ", "hien gio",
    "giờ rồi", "gio roi", "bây giờ", "bay gio", "what time", "show clock",
];

const SONG_PREFIXES: &[&str] = &[
    "bật bài ", "bat bai ", "nghe bài ", "nghe bai ", "phát bài ", "phat bai ", "mở bài ",
    "mo bai ", "chơi bài ", "choi bai ", "cho nghe ", "cho tui nghe ", "cho tôi nghe ",
    "bật nhạc ", "bat nhac ", "nghe nhạc ", "nghe nhac ", "phát nhạc ", "phat nhac ",
    "phát ", "phat ", "bật ", "bat ", "nghe ", "mở ", "mo ",
    "play the song ", "play song ", "play ",
];

/// Words that follow a play verb but name a transport control, not a song.
const NOT_A_SONG: &[&str] = &[
    "nhạc", "nhac", "music", "tiếp", "tiep", "lại", "lai", "dừng", "dung", "tạm", "tam",
    "stop", "pause", "next", "previous", "skip", "âm lượng", "am luong", "volume", "tăng",
    "tang", "giảm", "giam",
];

const VOLUME: &[&str] = &["âm lượng", "am luong", "volume"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicAction {
    Next,
    Previous,
    Pause,
    Play,
    VolumeUp,
    VolumeDown,
}

impl MusicAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Previous => "previous",
            Self::Pause => "pause",
            Self::Play => "play",
            Self::VolumeUp => "volume_up",
            Self::VolumeDown => "volume_down",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Next => "⏭️",
            Self::Previous => "⏮️",
            Self::Pause => "⏸️",
            Self::Play => "▶️",
            Self::VolumeUp => "🔊",
            Self::VolumeDown => "🔉",
        }
    }

    fn detect(lower: &str) -> Option<Self> {
        if contains_any(lower, &["bài tiếp", "bai tiep", "bài kế", "bai ke", "bài sau", "bai sau", "next song", "next track", "skip"]) {
            Some(Self::Next)
        } else if contains_any(lower, &["bài trước", "bai truoc", "quay lại bài", "quay lai bai", "previous song", "previous track"]) {
            Some(Self::Previous)
        } else if contains_any(lower, &["tạm dừng", "tam dung", "dừng nhạc", "dung nhac", "tắt nhạc", "tat nhac", "pause", "stop music"]) {
            Some(Self::Pause)
        } else if contains_any(lower, &["tiếp tục", "tiep tuc", "phát tiếp", "phat tiep", "mở nhạc", "mo nhac", "chơi nhạc", "choi nhac", "resume", "play music", "continue"]) {
            Some(Self::Play)
        } else if contains_any(lower, &["tăng", "tang"]) && contains_any(lower, VOLUME) {
            Some(Self::VolumeUp)
        } else if contains_any(lower, &["giảm", "giam"]) && contains_any(lower, VOLUME) {
            Some(Self::VolumeDown)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Queue(ActionEntry),
    /// Cancel the running action, drop queued ones and return home.
    StopMotion,
    /// Show `emotion` and hold it against server emotions until the reply
    /// ends. `overlay` also hides the chat behind the full-screen face.
    ForceEmotion { emotion: String, overlay: bool },
    OpenControlPanel,
    ToggleEmojiStyle,
    ShowClock,
    MusicControl(MusicAction),
    PlaySong(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptOutcome {
    pub actions: Vec<CommandAction>,
    /// Handled locally; the transcript is not shown as a user message.
    pub consumed: bool,
}

/// User-defined trigger words with the face and pose they set off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomKeywords {
    keywords: Vec<String>,
    emotion: String,
    pose: Option<ActionKind>,
}

impl CustomKeywords {
    /// `keywords` is a comma or semicolon separated list.
    pub fn new(keywords: &str, emotion: &str, pose: &str) -> Self {
        let keywords = keywords
            .split([',', ';'])
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
            .collect();
        Self {
            keywords,
            emotion: emotion.to_owned(),
            pose: ActionKind::from_pose_name(pose),
        }
    }

    pub fn load(settings: &dyn SettingsStore) -> Self {
        let keywords = settings.get_string(NS_STORAGE, KEY_CUSTOM_KEYWORDS).unwrap_or_default();
        let emotion = settings
            .get_string(NS_STORAGE, KEY_CUSTOM_EMOTION)
            .unwrap_or_else(|| DEFAULT_CUSTOM_EMOTION.to_owned());
        let pose = settings.get_string(NS_STORAGE, KEY_CUSTOM_POSE).unwrap_or_default();
        let custom = Self::new(&keywords, &emotion, &pose);
        log::info!(
            "Custom keywords loaded: {} (emotion={}, pose={:?})",
            custom.keywords.len(),
            custom.emotion,
            custom.pose
        );
        custom
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    fn matches(&self, lower: &str) -> bool {
        self.keywords.iter().any(|k| lower.contains(k.as_str()))
    }
}

#[derive(Debug, Default)]
pub struct TranscriptRules {
    custom: Option<CustomKeywords>,
}

impl TranscriptRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_custom(custom: CustomKeywords) -> Self {
        Self { custom: Some(custom) }
    }

    /// Drop cached custom keywords; they are re-read on the next transcript.
    pub fn reload_custom(&mut self) {
        self.custom = None;
    }

    pub fn is_placeholder(text: &str) -> bool {
        PLACEHOLDERS.contains(&text)
    }

    pub fn evaluate(&mut self, text: &str, settings: &dyn SettingsStore) -> TranscriptOutcome {
        let mut out = TranscriptOutcome::default();
        let lower = text.to_lowercase();

        if contains_any(&lower, STOP_MOTION) {
            out.actions.push(CommandAction::StopMotion);
        }

        if contains_any(&lower, STAND_UP)
            || (lower.contains("stand") && (lower.contains("up") || lower.contains("straight")))
            || lower == "home"
        {
            out.actions.push(CommandAction::Queue(ActionEntry::new(ActionKind::StandUp, 1, 500)));
        }

        if contains_any(&lower, GOODBYE) {
            out.actions.push(CommandAction::Queue(ActionEntry::new(ActionKind::LieDown, 1, 2000)));
        }

        if contains_any(&lower, CONTROL_PANEL) {
            out.actions.push(CommandAction::OpenControlPanel);
            out.consumed = true;
            return out;
        }

        if contains_any(&lower, QR_CODE) {
            out.actions.push(CommandAction::ForceEmotion { emotion: "winking".into(), overlay: true });
        }

        if contains_any(&lower, CELEBRATION) {
            out.actions.push(CommandAction::ForceEmotion { emotion: "silly".into(), overlay: false });
            out.actions.push(CommandAction::Queue(ActionEntry::new(ActionKind::Bow, 1, 1500)));
            out.actions.push(CommandAction::Queue(ActionEntry::new(ActionKind::WagTail, 5, 100)));
        }

        if contains_any(&lower, SHOOT) {
            out.actions.push(CommandAction::ForceEmotion { emotion: "shocked".into(), overlay: false });
            out.actions.push(CommandAction::Queue(ActionEntry::new(ActionKind::PlayDead, 1, 5)));
        }

        let custom = self.custom.get_or_insert_with(|| CustomKeywords::load(settings));
        if custom.matches(&lower) {
            log::info!("Custom keyword matched");
            out.actions.push(CommandAction::ForceEmotion { emotion: custom.emotion.clone(), overlay: false });
            if let Some(pose) = custom.pose {
                out.actions.push(CommandAction::Queue(ActionEntry::new(pose, 1, 1500)));
            }
        }

        if contains_any(&lower, EMOJI_TOGGLE) {
            out.actions.push(CommandAction::ToggleEmojiStyle);
            out.consumed = true;
            return out;
        }

        if contains_any(&lower, CLOCK) {
            out.actions.push(CommandAction::ShowClock);
        }

        let music = MusicAction::detect(&lower);

        if let Some(song) = song_request(text, &lower) {
            out.actions.push(CommandAction::PlaySong(song));
            out.consumed = true;
            return out;
        }

        if let Some(action) = music {
            out.actions.push(CommandAction::MusicControl(action));
        }
        out
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Song name following a play verb, with the caller's original casing.
fn song_request(text: &str, lower: &str) -> Option<String> {
    // Lowercasing can change byte lengths; fall back to the lowered text then.
    let source = if text.len() == lower.len() { text } else { lower };
    let song = SONG_PREFIXES.iter().find_map(|prefix| {
        let pos = lower.find(prefix)?;
        source.get(pos + prefix.len()..).map(str::trim)
    })?;

    let lower_song = song.to_lowercase();
    if song.chars().count() <= 1 || NOT_A_SONG.iter().any(|k| lower_song.starts_with(k)) {
        return None;
    }
    Some(song.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::MemorySettings;

    fn eval(text: &str) -> TranscriptOutcome {
        TranscriptRules::new().evaluate(text, &MemorySettings::new())
    }

    #[test]
    fn stand_up_and_goodbye_queue_poses() {
        let out = eval("Stand up please");
        assert_eq!(out.actions, vec![CommandAction::Queue(ActionEntry::new(ActionKind::StandUp, 1, 500))]);
        assert!(!out.consumed);

        let out = eval("Tạm biệt nhé");
        assert_eq!(out.actions, vec![CommandAction::Queue(ActionEntry::new(ActionKind::LieDown, 1, 2000))]);
    }

    #[test]
    fn stop_comes_before_anything_queued_after_it() {
        let out = eval("Dừng lại rồi đứng lên");
        assert_eq!(
            out.actions,
            vec![
                CommandAction::StopMotion,
                CommandAction::Queue(ActionEntry::new(ActionKind::StandUp, 1, 500)),
            ]
        );
        assert!(!out.consumed);
        assert!(eval("stop music").actions.iter().all(|a| *a != CommandAction::StopMotion));
    }

    #[test]
    fn control_panel_is_handled_locally() {
        let out = eval("mở bảng điều khiển");
        assert_eq!(out.actions, vec![CommandAction::OpenControlPanel]);
        assert!(out.consumed);
    }

    #[test]
    fn celebration_forces_silly_and_bows() {
        let out = eval("Happy birthday Kiki!");
        assert_eq!(
            out.actions,
            vec![
                CommandAction::ForceEmotion { emotion: "silly".into(), overlay: false },
                CommandAction::Queue(ActionEntry::new(ActionKind::Bow, 1, 1500)),
                CommandAction::Queue(ActionEntry::new(ActionKind::WagTail, 5, 100)),
            ]
        );
    }

    #[test]
    fn song_names_keep_their_casing() {
        let out = eval("Play Bohemian Rhapsody");
        assert_eq!(out.actions, vec![CommandAction::PlaySong("Bohemian Rhapsody".into())]);
        assert!(out.consumed);
    }

    #[test]
    fn transport_words_are_not_songs() {
        let out = eval("play music");
        assert_eq!(out.actions, vec![CommandAction::MusicControl(MusicAction::Play)]);
        assert!(!out.consumed);

        let out = eval("tăng âm lượng lên");
        assert_eq!(out.actions, vec![CommandAction::MusicControl(MusicAction::VolumeUp)]);
    }

    #[test]
    fn custom_keywords_come_from_settings() {
        let settings = MemorySettings::new();
        settings.set_string(NS_STORAGE, KEY_CUSTOM_KEYWORDS, "Pizza; phở ").unwrap();
        settings.set_string(NS_STORAGE, KEY_CUSTOM_POSE, "dance").unwrap();
        let mut rules = TranscriptRules::new();
        let out = rules.evaluate("I want PIZZA", &settings);
        assert_eq!(
            out.actions,
            vec![
                CommandAction::ForceEmotion { emotion: "delicious".into(), overlay: false },
                CommandAction::Queue(ActionEntry::new(ActionKind::Dance, 1, 1500)),
            ]
        );
    }

    #[test]
    fn emoji_toggle_stops_further_rules() {
        let out = eval("switch emoji and show clock");
        assert_eq!(out.actions, vec![CommandAction::ToggleEmojiStyle]);
        assert!(out.consumed);
    }

    #[test]
    fn placeholders() {
        assert!(TranscriptRules::is_placeholder("web_input"));
        assert!(!TranscriptRules::is_placeholder("hello"));
    }
}
