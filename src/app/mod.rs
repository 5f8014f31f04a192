// Kiki Companion — Application Core
//
// `Application` owns the conversation: device state, listening mode, echo
// cancellation mode and the forced-emotion lock. It lives on the main loop
// thread and nothing else touches it. Other threads hold an `AppHandle` and
// either read published snapshots or schedule closures onto the loop.

mod dispatch;
mod handle;
mod lifecycle;
mod main_loop;
pub mod messages;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::audio::AudioService;
use crate::board::Board;
use crate::commands::TranscriptRules;
use crate::config::*;
use crate::event_group::EventGroup;
use crate::events::{AbortReason, Sound};
use crate::motion::ActionQueue;
use crate::platform::Platform;
use crate::protocol::{McpDispatcher, Protocol};
use crate::scheduler::TaskQueue;
use crate::settings::SettingsStore;
use crate::state::{
    plan_transition, AecMode, DeviceState, ListeningMode, MediaActivity, SharedState,
    TransitionContext, TransitionPlan,
};
use crate::tasks::sleep::SleepCoordinator;

pub use handle::AppHandle;
pub use messages::{MessageError, ServerMessage, TtsState};

/// Called with `(previous, next)` after every state change.
pub type StateObserver = Box<dyn Fn(DeviceState, DeviceState) + Send>;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub aec_mode: AecMode,
    pub firmware_version: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            aec_mode: AecMode::Off,
            firmware_version: env!("CARGO_PKG_VERSION").to_owned(),
        }
    }
}

/// State reachable from every thread.
pub(crate) struct Shared {
    events: Arc<EventGroup>,
    tasks: TaskQueue<Application>,
    state: SharedState,
    main_thread: Mutex<ThreadId>,
    halted: AtomicBool,
    last_error: Mutex<String>,
    audio: Arc<dyn AudioService>,
    protocol: Arc<dyn Protocol>,
}

impl Shared {
    fn is_main_thread(&self) -> bool {
        *self.main_thread.lock().unwrap_or_else(PoisonError::into_inner) == thread::current().id()
    }

    fn claim_main_thread(&self) {
        *self.main_thread.lock().unwrap_or_else(PoisonError::into_inner) = thread::current().id();
    }

    fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }
}

pub struct Application {
    shared: Arc<Shared>,
    board: Arc<dyn Board>,
    audio: Arc<dyn AudioService>,
    protocol: Arc<dyn Protocol>,
    platform: Arc<dyn Platform>,
    settings: Arc<dyn SettingsStore>,
    motion: Option<ActionQueue>,
    mcp: Option<Arc<dyn McpDispatcher>>,
    sleep: Option<Arc<SleepCoordinator>>,
    rules: TranscriptRules,
    observers: Vec<StateObserver>,
    firmware_version: String,

    state: DeviceState,
    previous_state: DeviceState,
    listening_mode: ListeningMode,
    aec_mode: AecMode,
    aborted: bool,
    clock_ticks: u32,
    /// Emotion pinned by a voice command until the reply finishes.
    forced_emotion: Option<String>,
    suppress_media_stop: bool,
}

impl Application {
    /// The constructing thread is taken as the main loop until [`run`]
    /// claims another one.
    ///
    /// [`run`]: Application::run
    pub fn new(
        board: Arc<dyn Board>,
        audio: Arc<dyn AudioService>,
        protocol: Arc<dyn Protocol>,
        platform: Arc<dyn Platform>,
        settings: Arc<dyn SettingsStore>,
        config: AppConfig,
    ) -> Self {
        let events = Arc::new(EventGroup::new());
        let shared = Arc::new(Shared {
            tasks: TaskQueue::new(Arc::clone(&events)),
            events,
            state: SharedState::new(DeviceState::Unknown),
            main_thread: Mutex::new(thread::current().id()),
            halted: AtomicBool::new(false),
            last_error: Mutex::new(String::new()),
            audio: Arc::clone(&audio),
            protocol: Arc::clone(&protocol),
        });
        Self {
            shared,
            board,
            audio,
            protocol,
            platform,
            settings,
            motion: None,
            mcp: None,
            sleep: None,
            rules: TranscriptRules::new(),
            observers: Vec::new(),
            firmware_version: config.firmware_version,
            state: DeviceState::Unknown,
            previous_state: DeviceState::Unknown,
            listening_mode: ListeningMode::AutoStop,
            aec_mode: config.aec_mode,
            aborted: false,
            clock_ticks: 0,
            forced_emotion: None,
            suppress_media_stop: false,
        }
    }

    pub fn with_motion(mut self, queue: ActionQueue) -> Self {
        self.motion = Some(queue);
        self
    }

    pub fn with_mcp(mut self, mcp: Arc<dyn McpDispatcher>) -> Self {
        self.mcp = Some(mcp);
        self
    }

    pub fn with_sleep(mut self, sleep: Arc<SleepCoordinator>) -> Self {
        self.sleep = Some(sleep);
        self
    }

    pub fn with_rules(mut self, rules: TranscriptRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn observe_state(&mut self, observer: impl Fn(DeviceState, DeviceState) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn handle(&self) -> AppHandle {
        AppHandle::new(Arc::clone(&self.shared))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn device_state(&self) -> DeviceState {
        self.state
    }

    pub fn previous_state(&self) -> DeviceState {
        self.previous_state
    }

    pub fn listening_mode(&self) -> ListeningMode {
        self.listening_mode
    }

    pub fn aec_mode(&self) -> AecMode {
        self.aec_mode
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn clock_ticks(&self) -> u32 {
        self.clock_ticks
    }

    pub fn forced_emotion(&self) -> Option<&str> {
        self.forced_emotion.as_deref()
    }

    pub fn firmware_version(&self) -> &str {
        &self.firmware_version
    }

    pub fn is_halted(&self) -> bool {
        self.shared.is_halted()
    }

    pub fn can_enter_sleep_mode(&self) -> bool {
        self.state == DeviceState::Idle
            && !self.protocol.is_audio_channel_opened()
            && self.audio.is_idle()
    }

    pub fn media_activity(&self) -> MediaActivity {
        self.board.music().map(|m| m.activity()).unwrap_or_default()
    }

    /// Keep background music running across the next transitions out of
    /// Idle.
    pub fn set_suppress_media_stop(&mut self, suppress: bool) {
        self.suppress_media_stop = suppress;
    }

    // -----------------------------------------------------------------------
    // State machine
    // -----------------------------------------------------------------------

    pub fn set_device_state(&mut self, next: DeviceState) {
        if next == self.state {
            return;
        }
        self.clock_ticks = 0;
        let prev = self.state;
        self.previous_state = prev;
        self.state = next;
        self.shared.state.publish(next);
        log::info!("STATE: {}", next);

        for observer in &self.observers {
            observer(prev, next);
        }

        let ctx = TransitionContext {
            audio_processor_running: self.audio.is_audio_processor_running(),
            listening_mode: self.listening_mode,
            afe_wake_word: self.audio.is_afe_wake_word(),
            media: self.media_activity(),
            suppress_media_stop: self.suppress_media_stop,
        };
        let plan = plan_transition(prev, next, &ctx);
        self.apply_plan(&plan);
        self.board.led().on_state_changed(next, self.audio.is_voice_detected());
    }

    fn apply_plan(&mut self, plan: &TransitionPlan) {
        if plan.stop_background_media {
            if let Some(music) = self.board.music() {
                log::info!("Conversation started, stopping background music");
                music.stop_streaming(false);
            }
        }
        let display = self.board.display();
        if let Some(status) = plan.status {
            display.set_status(status);
        }
        if let Some(emotion) = plan.emotion {
            display.set_emotion(emotion);
        }
        if plan.clear_chat {
            display.set_chat_message("system", "");
        }
        if plan.send_start_listening {
            self.protocol.send_start_listening(self.listening_mode);
        }
        if let Some(on) = plan.voice_processing {
            self.audio.enable_voice_processing(on);
        }
        if let Some(on) = plan.wake_word {
            self.audio.enable_wake_word_detection(on);
        }
        if plan.reset_decoder {
            self.audio.reset_decoder();
        }
    }

    /// Enter Listening in `mode`. Refused while background music plays.
    pub fn set_listening_mode(&mut self, mode: ListeningMode) {
        if self.media_activity().is_active() {
            log::info!("Music active, not entering listening");
            return;
        }
        self.listening_mode = mode;
        self.set_device_state(DeviceState::Listening);
    }

    /// Open the audio channel through Connecting. Falls back to Idle when
    /// the channel cannot be opened.
    fn ensure_audio_channel(&mut self) -> bool {
        if self.protocol.is_audio_channel_opened() {
            return true;
        }
        self.set_device_state(DeviceState::Connecting);
        if !self.protocol.open_audio_channel() {
            log::warn!("Failed to open audio channel");
            self.set_device_state(DeviceState::Idle);
            return false;
        }
        true
    }

    // -----------------------------------------------------------------------
    // Alerts
    // -----------------------------------------------------------------------

    pub fn alert(&mut self, status: &str, message: &str, emotion: &str, sound: Option<Sound>) {
        log::warn!("Alert {}: {} [{}]", status, message, emotion);
        let display = self.board.display();
        display.set_status(status);
        display.set_emotion(emotion);
        display.set_chat_message("system", message);
        if let Some(sound) = sound {
            self.audio.play_sound(sound);
        }
    }

    pub fn dismiss_alert(&mut self) {
        if self.state == DeviceState::Idle {
            let display = self.board.display();
            display.set_status(STR_STANDBY);
            display.set_emotion("neutral");
            display.set_chat_message("system", "");
        }
    }

    // -----------------------------------------------------------------------
    // Conversation control
    // -----------------------------------------------------------------------

    pub fn toggle_chat_state(&mut self) {
        self.wake_body();
        match self.state {
            DeviceState::Activating => self.set_device_state(DeviceState::Idle),
            DeviceState::Configuring => {
                self.audio.enable_audio_testing(true);
                self.set_device_state(DeviceState::AudioTesting);
            }
            DeviceState::AudioTesting => {
                self.audio.enable_audio_testing(false);
                self.set_device_state(DeviceState::Configuring);
            }
            DeviceState::Idle => {
                if self.ensure_audio_channel() {
                    self.set_listening_mode(self.aec_mode.conversation_mode());
                }
            }
            DeviceState::Speaking => self.abort_speaking(AbortReason::None),
            DeviceState::Listening => {
                self.protocol.close_audio_channel();
            }
            _ => {}
        }
    }

    pub fn start_listening(&mut self) {
        self.wake_body();
        match self.state {
            DeviceState::Activating => self.set_device_state(DeviceState::Idle),
            DeviceState::Configuring => {
                self.audio.enable_audio_testing(true);
                self.set_device_state(DeviceState::AudioTesting);
            }
            DeviceState::Idle => {
                if self.ensure_audio_channel() {
                    self.set_listening_mode(ListeningMode::ManualStop);
                }
            }
            DeviceState::Speaking => {
                self.abort_speaking(AbortReason::None);
                self.set_listening_mode(ListeningMode::ManualStop);
            }
            _ => {}
        }
    }

    pub fn stop_listening(&mut self) {
        match self.state {
            DeviceState::AudioTesting => {
                self.audio.enable_audio_testing(false);
                self.set_device_state(DeviceState::Configuring);
            }
            DeviceState::Listening => {
                self.protocol.send_stop_listening();
                self.set_device_state(DeviceState::Idle);
            }
            _ => {}
        }
    }

    pub fn abort_speaking(&mut self, reason: AbortReason) {
        log::info!("Abort speaking");
        self.aborted = true;
        self.protocol.send_abort_speaking(reason);
    }

    /// Text injected as if it had been spoken (web chat box).
    pub fn send_stt_message(&mut self, text: &str) -> bool {
        let text: String = if text.chars().count() > STT_TEXT_LIMIT {
            log::warn!("Text input truncated to {} characters", STT_TEXT_LIMIT);
            text.chars().take(STT_TEXT_LIMIT).collect()
        } else {
            text.to_owned()
        };
        self.board.display().set_chat_message("user", &text);

        if !self.ensure_audio_channel() {
            return false;
        }
        self.audio.enable_voice_processing(false);
        self.audio.enable_wake_word_detection(false);
        self.protocol.send_wake_word_detected(&text);
        self.protocol.send_stop_listening();
        true
    }

    /// Same as a detected wake word, but triggered by name from elsewhere.
    pub fn wake_word_invoke(&mut self, wake_word: &str) {
        self.wake_body();
        match self.state {
            DeviceState::Idle => {
                self.audio.encode_wake_word();
                if !self.ensure_audio_channel() {
                    return;
                }
                self.upload_wake_word(wake_word);
                self.set_listening_mode(self.aec_mode.conversation_mode());
            }
            DeviceState::Speaking => self.abort_speaking(AbortReason::None),
            DeviceState::Listening => {
                self.protocol.close_audio_channel();
            }
            _ => {}
        }
    }

    fn upload_wake_word(&mut self, wake_word: &str) {
        while let Some(packet) = self.audio.pop_wake_word_packet() {
            if !self.protocol.send_audio(packet) {
                break;
            }
        }
        self.protocol.send_wake_word_detected(wake_word);
    }

    pub fn set_aec_mode(&mut self, mode: AecMode) {
        self.aec_mode = mode;
        let display = self.board.display();
        let notice = Duration::from_millis(EMOJI_NOTICE_MS);
        match mode {
            AecMode::Off => {
                self.audio.enable_device_aec(false);
                display.show_notification(STR_RTC_MODE_OFF, notice);
            }
            AecMode::OnServerSide => {
                self.audio.enable_device_aec(false);
                display.show_notification(STR_RTC_MODE_ON, notice);
            }
            AecMode::OnDeviceSide => {
                self.audio.enable_device_aec(true);
                display.show_notification(STR_RTC_MODE_ON, notice);
            }
        }
        if self.protocol.is_audio_channel_opened() {
            self.protocol.close_audio_channel();
        }
    }

    /// Board power save, which also arms or disarms the sleep timer.
    pub fn set_power_save_mode(&mut self, enabled: bool) {
        self.board.set_power_save_mode(enabled);
        if let Some(sleep) = &self.sleep {
            sleep.set_enabled(enabled, self.settings.as_ref());
        }
    }

    /// User activity cancels any pending light sleep.
    fn wake_body(&self) {
        if let Some(sleep) = &self.sleep {
            sleep.wake_up();
        }
    }

    /// Close the session, stop audio and restart. Scheduled work still
    /// queued is dropped and the main loop stops dispatching.
    pub fn reboot(&mut self) {
        log::info!("Rebooting...");
        if self.protocol.is_audio_channel_opened() {
            self.protocol.close_audio_channel();
        }
        self.audio.stop();
        self.shared.halted.store(true, Ordering::Release);
        let dropped = self.shared.tasks.clear();
        if dropped > 0 {
            log::info!("{} scheduled tasks dropped for reboot", dropped);
        }
        self.platform.sleep(Duration::from_millis(REBOOT_DELAY_MS));
        self.platform.restart();
    }
}
