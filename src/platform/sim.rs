// Kiki Companion — Simulated Platform & Board
//
// Host stand-ins for every hardware collaborator. Each one writes what it
// was asked to do into a shared `Journal`, so the host binary can log it and
// tests can assert on order and counts. Time is either real or virtual; in
// virtual mode `sleep` only advances a counter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;

use super::{HeapStats, Platform, WakeupCause};
use crate::audio::{AudioCallbacks, AudioPacket, AudioService};
use crate::board::{AuxServer, BackgroundMedia, Backlight, Board, Display, EmojiOverlay, Led};
use crate::config::SERVO_NEUTRAL_DEG;
use crate::events::{AbortReason, Sound};
use crate::motion::{Joint, ServoBank};
use crate::ota::{Ota, OtaError};
use crate::protocol::{Protocol, ProtocolCallbacks};
use crate::state::{DeviceState, ListeningMode, MediaActivity};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Journal
// ---------------------------------------------------------------------------

/// Ordered record of simulated hardware calls, shared by clone.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, entry: impl Into<String>) {
        let entry = entry.into();
        log::debug!("[sim] {}", entry);
        lock(&self.0).push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        lock(&self.0).clone()
    }

    pub fn count(&self, entry: &str) -> usize {
        lock(&self.0).iter().filter(|e| *e == entry).count()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.position(entry).is_some()
    }

    /// Index of the first occurrence of `entry`.
    pub fn position(&self, entry: &str) -> Option<usize> {
        lock(&self.0).iter().position(|e| e == entry)
    }

    pub fn last_matching(&self, prefix: &str) -> Option<String> {
        lock(&self.0).iter().rev().find(|e| e.starts_with(prefix)).cloned()
    }

    pub fn clear(&self) {
        lock(&self.0).clear();
    }
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

pub struct SimPlatform {
    journal: Journal,
    virtual_clock: Option<AtomicU64>,
    started: Instant,
    wakeups: Mutex<VecDeque<WakeupCause>>,
}

impl SimPlatform {
    /// Real time: `sleep` blocks the calling thread.
    pub fn new() -> Self {
        Self {
            journal: Journal::new(),
            virtual_clock: None,
            started: Instant::now(),
            wakeups: Mutex::new(VecDeque::new()),
        }
    }

    /// Virtual time: `sleep` returns at once and advances `now_ms`.
    pub fn virtual_time() -> Self {
        Self { virtual_clock: Some(AtomicU64::new(0)), ..Self::new() }
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = journal;
        self
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Causes returned by successive light sleeps; `Timer` once exhausted.
    pub fn script_wakeups(&self, causes: impl IntoIterator<Item = WakeupCause>) {
        lock(&self.wakeups).extend(causes);
    }
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimPlatform {
    fn sleep(&self, duration: Duration) {
        match &self.virtual_clock {
            Some(clock) => {
                clock.fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
            }
            None => thread::sleep(duration),
        }
    }

    fn now_ms(&self) -> u64 {
        match &self.virtual_clock {
            Some(clock) => clock.load(Ordering::SeqCst),
            None => self.started.elapsed().as_millis() as u64,
        }
    }

    fn restart(&self) {
        self.journal.record("platform.restart");
    }

    fn heap_stats(&self) -> HeapStats {
        HeapStats { free_sram: 96 * 1024, min_free_sram: 64 * 1024 }
    }

    fn suspend_render(&self) {
        self.journal.record("render.suspend");
    }

    fn resume_render(&self) {
        self.journal.record("render.resume");
    }

    fn light_sleep(&self, wake_after: Duration) -> WakeupCause {
        self.journal.record("platform.light_sleep");
        let cause = lock(&self.wakeups).pop_front();
        match cause {
            Some(cause) => cause,
            None => {
                self.sleep(wake_after);
                WakeupCause::Timer
            }
        }
    }

    fn deep_sleep(&self) {
        self.journal.record("platform.deep_sleep");
    }
}

// ---------------------------------------------------------------------------
// Board parts
// ---------------------------------------------------------------------------

pub struct SimDisplay {
    journal: Journal,
    overlay: SimOverlay,
}

impl Display for SimDisplay {
    fn set_status(&self, status: &str) {
        self.journal.record(format!("display.status:{}", status));
    }

    fn set_emotion(&self, emotion: &str) {
        self.journal.record(format!("display.emotion:{}", emotion));
    }

    fn set_chat_message(&self, role: &str, content: &str) {
        self.journal.record(format!("display.chat:{}:{}", role, content));
    }

    fn show_notification(&self, message: &str, _duration: Duration) {
        self.journal.record(format!("display.notification:{}", message));
    }

    fn update_status_bar(&self, update_all: bool) {
        if update_all {
            self.journal.record("display.status_bar");
        }
    }

    fn set_power_save_mode(&self, on: bool) {
        self.journal.record(format!("display.power_save:{}", on));
    }

    fn pause_rendering(&self) {
        self.journal.record("display.render:paused");
    }

    fn resume_rendering(&self) {
        self.journal.record("display.render:resumed");
    }

    fn emoji_overlay(&self) -> Option<&dyn EmojiOverlay> {
        Some(&self.overlay)
    }
}

pub struct SimOverlay {
    journal: Journal,
    animated: AtomicBool,
}

impl EmojiOverlay for SimOverlay {
    fn set_overlay_mode(&self, on: bool) {
        self.journal.record(format!("overlay.mode:{}", on));
    }

    fn set_chat_hidden(&self, hidden: bool) {
        self.journal.record(format!("overlay.chat_hidden:{}", hidden));
    }

    fn show_qr_code(&self, text: &str, _duration: Duration) {
        self.journal.record(format!("overlay.qr:{}", text));
    }

    fn is_animated_style(&self) -> bool {
        self.animated.load(Ordering::SeqCst)
    }

    fn set_animated_style(&self, animated: bool) {
        self.animated.store(animated, Ordering::SeqCst);
        self.journal.record(format!("overlay.animated:{}", animated));
    }

    fn toggle_clock(&self) {
        self.journal.record("overlay.clock");
    }
}

pub struct SimLed {
    journal: Journal,
}

impl Led for SimLed {
    fn on_state_changed(&self, state: DeviceState, voice_detected: bool) {
        self.journal.record(format!("led.{}:{}", state, voice_detected));
    }
}

pub struct SimBacklight {
    journal: Journal,
}

impl Backlight for SimBacklight {
    fn set_brightness(&self, percent: u8) {
        self.journal.record(format!("backlight.brightness:{}", percent));
    }

    fn restore_brightness(&self) {
        self.journal.record("backlight.restore");
    }
}

pub struct SimMusic {
    journal: Journal,
    activity: Mutex<MediaActivity>,
}

impl SimMusic {
    pub fn set_activity(&self, activity: MediaActivity) {
        *lock(&self.activity) = activity;
    }
}

impl BackgroundMedia for SimMusic {
    fn activity(&self) -> MediaActivity {
        *lock(&self.activity)
    }

    fn stop_streaming(&self, notify_server: bool) {
        self.journal.record(format!("music.stop:{}", notify_server));
        self.set_activity(MediaActivity::Inactive);
    }

    fn download_and_play(&self, song: &str) -> bool {
        self.journal.record(format!("music.play:{}", song));
        self.set_activity(MediaActivity::Playing);
        true
    }
}

pub struct SimPanel {
    journal: Journal,
}

pub const SIM_PANEL_URL: &str = "http://192.168.1.42";

impl AuxServer for SimPanel {
    fn start(&self) -> Option<String> {
        self.journal.record("panel.start");
        Some(SIM_PANEL_URL.to_owned())
    }

    fn stop(&self) {
        self.journal.record("panel.stop");
    }
}

pub struct SimBoard {
    journal: Journal,
    display: SimDisplay,
    led: SimLed,
    backlight: SimBacklight,
    music: SimMusic,
    panel: SimPanel,
}

impl SimBoard {
    pub fn new(journal: Journal) -> Self {
        Self {
            display: SimDisplay {
                journal: journal.clone(),
                overlay: SimOverlay { journal: journal.clone(), animated: AtomicBool::new(true) },
            },
            led: SimLed { journal: journal.clone() },
            backlight: SimBacklight { journal: journal.clone() },
            music: SimMusic { journal: journal.clone(), activity: Mutex::new(MediaActivity::Inactive) },
            panel: SimPanel { journal: journal.clone() },
            journal,
        }
    }

    pub fn sim_music(&self) -> &SimMusic {
        &self.music
    }
}

impl Board for SimBoard {
    fn name(&self) -> &str {
        "kiki-sim"
    }

    fn user_agent(&self) -> String {
        format!("kiki-sim/{}", env!("CARGO_PKG_VERSION"))
    }

    fn display(&self) -> &dyn Display {
        &self.display
    }

    fn led(&self) -> &dyn Led {
        &self.led
    }

    fn backlight(&self) -> Option<&dyn Backlight> {
        Some(&self.backlight)
    }

    fn music(&self) -> Option<&dyn BackgroundMedia> {
        Some(&self.music)
    }

    fn control_panel(&self) -> Option<&dyn AuxServer> {
        Some(&self.panel)
    }

    fn set_power_save_mode(&self, enabled: bool) {
        self.journal.record(format!("board.power_save:{}", enabled));
    }

    fn start_network(&self) {
        self.journal.record("board.start_network");
    }
}

// ---------------------------------------------------------------------------
// Servos
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SimServos {
    positions: [i32; Joint::COUNT],
    attached: bool,
    writes: usize,
}

impl SimServos {
    pub fn new() -> Self {
        Self { positions: [SERVO_NEUTRAL_DEG; Joint::COUNT], attached: false, writes: 0 }
    }

    pub fn writes(&self) -> usize {
        self.writes
    }
}

impl Default for SimServos {
    fn default() -> Self {
        Self::new()
    }
}

impl ServoBank for SimServos {
    fn attach(&mut self) {
        self.attached = true;
    }

    fn detach(&mut self) {
        self.attached = false;
    }

    fn is_attached(&self) -> bool {
        self.attached
    }

    fn write(&mut self, joint: Joint, angle: i32) {
        self.positions[joint as usize] = angle.clamp(0, 180);
        self.writes += 1;
    }

    fn position(&self, joint: Joint) -> i32 {
        self.positions[joint as usize]
    }
}

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

pub struct SimAudio {
    journal: Journal,
    callbacks: Mutex<Option<AudioCallbacks>>,
    send_queue: Mutex<VecDeque<AudioPacket>>,
    decode_queue: Mutex<VecDeque<AudioPacket>>,
    decode_capacity: usize,
    wake_word_packets: Mutex<VecDeque<AudioPacket>>,
    last_wake_word: Mutex<String>,
    voice_processing: AtomicBool,
    wake_word: AtomicBool,
    voice_detected: AtomicBool,
    idle: AtomicBool,
}

impl SimAudio {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            callbacks: Mutex::new(None),
            send_queue: Mutex::new(VecDeque::new()),
            decode_queue: Mutex::new(VecDeque::new()),
            decode_capacity: 40,
            wake_word_packets: Mutex::new(VecDeque::new()),
            last_wake_word: Mutex::new(String::new()),
            voice_processing: AtomicBool::new(false),
            wake_word: AtomicBool::new(false),
            voice_detected: AtomicBool::new(false),
            idle: AtomicBool::new(true),
        }
    }

    /// Pretend the detector heard `word`; raises the wake word callback.
    pub fn trigger_wake_word(&self, word: &str) {
        *lock(&self.last_wake_word) = word.to_owned();
        lock(&self.wake_word_packets).push_back(AudioPacket::new(0, word.as_bytes().to_vec()));
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_wake_word_detected)(word);
        }
    }

    /// Queue encoded microphone audio; raises the send callback.
    pub fn push_outgoing(&self, packet: AudioPacket) {
        lock(&self.send_queue).push_back(packet);
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_send_queue_available)();
        }
    }

    pub fn set_voice_detected(&self, detected: bool) {
        self.voice_detected.store(detected, Ordering::SeqCst);
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_vad_change)(detected);
        }
    }

    pub fn set_idle(&self, idle: bool) {
        self.idle.store(idle, Ordering::SeqCst);
    }

    pub fn pending_send(&self) -> usize {
        lock(&self.send_queue).len()
    }

    pub fn decoded(&self) -> usize {
        lock(&self.decode_queue).len()
    }
}

impl AudioService for SimAudio {
    fn initialize(&self, callbacks: AudioCallbacks) {
        *lock(&self.callbacks) = Some(callbacks);
        self.journal.record("audio.initialize");
    }

    fn start(&self) {
        self.journal.record("audio.start");
    }

    fn stop(&self) {
        self.journal.record("audio.stop");
    }

    fn push_packet_to_decode_queue(&self, packet: AudioPacket) -> bool {
        let mut queue = lock(&self.decode_queue);
        if queue.len() >= self.decode_capacity {
            return false;
        }
        queue.push_back(packet);
        true
    }

    fn pop_packet_from_send_queue(&self) -> Option<AudioPacket> {
        lock(&self.send_queue).pop_front()
    }

    fn enable_voice_processing(&self, enable: bool) {
        self.voice_processing.store(enable, Ordering::SeqCst);
        self.journal.record(format!("audio.voice_processing:{}", enable));
    }

    fn enable_wake_word_detection(&self, enable: bool) {
        self.wake_word.store(enable, Ordering::SeqCst);
        self.journal.record(format!("audio.wake_word:{}", enable));
    }

    fn enable_device_aec(&self, enable: bool) {
        self.journal.record(format!("audio.aec:{}", enable));
    }

    fn enable_audio_testing(&self, enable: bool) {
        self.journal.record(format!("audio.testing:{}", enable));
    }

    fn is_audio_processor_running(&self) -> bool {
        self.voice_processing.load(Ordering::SeqCst)
    }

    fn is_wake_word_running(&self) -> bool {
        self.wake_word.load(Ordering::SeqCst)
    }

    fn is_afe_wake_word(&self) -> bool {
        false
    }

    fn is_voice_detected(&self) -> bool {
        self.voice_detected.load(Ordering::SeqCst)
    }

    fn is_idle(&self) -> bool {
        self.idle.load(Ordering::SeqCst)
    }

    fn play_sound(&self, sound: Sound) {
        self.journal.record(format!("audio.sound:{}", sound.name()));
    }

    fn reset_decoder(&self) {
        lock(&self.decode_queue).clear();
        self.journal.record("audio.reset_decoder");
    }

    fn encode_wake_word(&self) {
        self.journal.record("audio.encode_wake_word");
    }

    fn pop_wake_word_packet(&self) -> Option<AudioPacket> {
        lock(&self.wake_word_packets).pop_front()
    }

    fn last_wake_word(&self) -> String {
        lock(&self.last_wake_word).clone()
    }
}

// ---------------------------------------------------------------------------
// Protocol
// ---------------------------------------------------------------------------

pub struct SimProtocol {
    journal: Journal,
    callbacks: Mutex<Option<ProtocolCallbacks>>,
    channel_open: AtomicBool,
    open_succeeds: AtomicBool,
    /// Audio packets accepted before sends start failing.
    audio_budget: AtomicUsize,
}

impl SimProtocol {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            callbacks: Mutex::new(None),
            channel_open: AtomicBool::new(false),
            open_succeeds: AtomicBool::new(true),
            audio_budget: AtomicUsize::new(usize::MAX),
        }
    }

    pub fn set_open_succeeds(&self, succeeds: bool) {
        self.open_succeeds.store(succeeds, Ordering::SeqCst);
    }

    pub fn set_audio_budget(&self, packets: usize) {
        self.audio_budget.store(packets, Ordering::SeqCst);
    }

    pub fn inject_json(&self, value: &Value) {
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_incoming_json)(value);
        }
    }

    pub fn inject_network_error(&self, message: &str) {
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_network_error)(message);
        }
    }

    pub fn inject_audio(&self, packet: AudioPacket) {
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_incoming_audio)(packet);
        }
    }

    pub fn inject_connected(&self) {
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_connected)();
        }
    }
}

impl Protocol for SimProtocol {
    fn set_callbacks(&self, callbacks: ProtocolCallbacks) {
        *lock(&self.callbacks) = Some(callbacks);
    }

    fn start(&self) -> bool {
        self.journal.record("protocol.start");
        true
    }

    fn open_audio_channel(&self) -> bool {
        self.journal.record("protocol.open");
        if !self.open_succeeds.load(Ordering::SeqCst) {
            return false;
        }
        self.channel_open.store(true, Ordering::SeqCst);
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_audio_channel_opened)();
        }
        true
    }

    fn close_audio_channel(&self) -> bool {
        if !self.channel_open.swap(false, Ordering::SeqCst) {
            return false;
        }
        self.journal.record("protocol.close");
        if let Some(cb) = lock(&self.callbacks).as_ref() {
            (cb.on_audio_channel_closed)();
        }
        true
    }

    fn is_audio_channel_opened(&self) -> bool {
        self.channel_open.load(Ordering::SeqCst)
    }

    fn send_audio(&self, _packet: AudioPacket) -> bool {
        let sent = self
            .audio_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if sent {
            self.journal.record("protocol.audio");
        }
        sent
    }

    fn send_wake_word_detected(&self, wake_word: &str) {
        self.journal.record(format!("protocol.detect:{}", wake_word));
    }

    fn send_start_listening(&self, mode: ListeningMode) {
        self.journal.record(format!("protocol.listen_start:{}", mode.as_str()));
    }

    fn send_stop_listening(&self) {
        self.journal.record("protocol.listen_stop");
    }

    fn send_abort_speaking(&self, reason: AbortReason) {
        self.journal.record(format!("protocol.abort:{}", reason.as_str().unwrap_or("none")));
    }

    fn send_mcp_message(&self, payload: &str) {
        self.journal.record(format!("protocol.mcp:{}", payload));
    }

    fn send_json_text(&self, text: &str) -> bool {
        self.journal.record(format!("protocol.json:{}", text));
        self.channel_open.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Version server
// ---------------------------------------------------------------------------

/// Scripted version server. Unscripted checks and activations succeed.
pub struct SimOta {
    journal: Journal,
    checks: VecDeque<Result<(), OtaError>>,
    activations: VecDeque<Result<(), OtaError>>,
    offered: Option<String>,
    activation_code: Option<String>,
    upgrade_result: Result<(), OtaError>,
}

impl SimOta {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            checks: VecDeque::new(),
            activations: VecDeque::new(),
            offered: None,
            activation_code: None,
            upgrade_result: Ok(()),
        }
    }

    pub fn with_checks(mut self, results: impl IntoIterator<Item = Result<(), OtaError>>) -> Self {
        self.checks.extend(results);
        self
    }

    pub fn offering(mut self, version: &str) -> Self {
        self.offered = Some(version.to_owned());
        self
    }

    pub fn with_upgrade_result(mut self, result: Result<(), OtaError>) -> Self {
        self.upgrade_result = result;
        self
    }

    pub fn with_activation(
        mut self,
        code: &str,
        results: impl IntoIterator<Item = Result<(), OtaError>>,
    ) -> Self {
        self.activation_code = Some(code.to_owned());
        self.activations.extend(results);
        self
    }
}

impl Ota for SimOta {
    fn check_version(&mut self) -> Result<(), OtaError> {
        self.journal.record("ota.check");
        self.checks.pop_front().unwrap_or(Ok(()))
    }

    fn check_version_url(&self) -> String {
        "http://sim.local/ota/".to_owned()
    }

    fn has_new_version(&self) -> bool {
        self.offered.is_some()
    }

    fn firmware_version(&self) -> String {
        self.offered.clone().unwrap_or_else(|| self.current_version())
    }

    fn current_version(&self) -> String {
        env!("CARGO_PKG_VERSION").to_owned()
    }

    fn mark_current_version_valid(&mut self) {
        self.journal.record("ota.mark_valid");
    }

    fn has_activation_code(&self) -> bool {
        self.activation_code.is_some()
    }

    fn has_activation_challenge(&self) -> bool {
        false
    }

    fn activation_code(&self) -> String {
        self.activation_code.clone().unwrap_or_default()
    }

    fn activation_message(&self) -> String {
        format!("Enter code {} in the app", self.activation_code())
    }

    fn activate(&mut self) -> Result<(), OtaError> {
        self.journal.record("ota.activate");
        let result = self.activations.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.activation_code = None;
        }
        result
    }

    fn upgrade(&mut self, progress: &mut dyn FnMut(u32, usize)) -> Result<(), OtaError> {
        self.journal.record("ota.upgrade");
        for percent in [25, 50, 75, 100] {
            progress(percent, 64 * 1024);
        }
        self.upgrade_result.clone()
    }
}
