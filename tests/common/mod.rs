// Kiki Companion — Test Rig
//
// An `Application` wired to the recording simulator parts, driven by hand
// through `process_pending` instead of the real main loop thread.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use serde_json::Value;

use kiki_companion::app::{AppConfig, AppHandle, Application};
use kiki_companion::audio::AudioService;
use kiki_companion::motion::ActionQueue;
use kiki_companion::platform::sim::{Journal, SimAudio, SimBoard, SimPlatform, SimProtocol};
use kiki_companion::protocol::Protocol;
use kiki_companion::settings::MemorySettings;
use kiki_companion::state::{DeviceState, MediaActivity};

pub struct Rig {
    pub app: Application,
    pub handle: AppHandle,
    pub journal: Journal,
    pub board: Arc<SimBoard>,
    pub audio: Arc<SimAudio>,
    pub protocol: Arc<SimProtocol>,
    pub platform: Arc<SimPlatform>,
    pub settings: Arc<MemorySettings>,
    pub queue: ActionQueue,
    pub transitions: Arc<Mutex<Vec<(DeviceState, DeviceState)>>>,
}

impl Rig {
    /// Callbacks registered, motion queue attached, nothing spawned.
    pub fn new() -> Self {
        Self::with(|app| app)
    }

    /// Like [`Rig::new`], with extra builder steps applied to the app.
    pub fn with(customize: impl FnOnce(Application) -> Application) -> Self {
        let journal = Journal::new();
        let board = Arc::new(SimBoard::new(journal.clone()));
        let audio = Arc::new(SimAudio::new(journal.clone()));
        let protocol = Arc::new(SimProtocol::new(journal.clone()));
        let platform = Arc::new(SimPlatform::virtual_time().with_journal(journal.clone()));
        let settings = Arc::new(MemorySettings::new());
        let queue = ActionQueue::new(10);

        let app = Application::new(
            board.clone(),
            audio.clone(),
            protocol.clone(),
            platform.clone(),
            settings.clone(),
            AppConfig::default(),
        )
        .with_motion(queue.clone());
        let mut app = customize(app);

        audio.initialize(app.audio_callbacks());
        protocol.set_callbacks(app.protocol_callbacks());

        let transitions = Arc::new(Mutex::new(Vec::new()));
        let seen = transitions.clone();
        app.observe_state(move |prev, next| seen.lock().unwrap().push((prev, next)));

        let handle = app.handle();
        Self { app, handle, journal, board, audio, protocol, platform, settings, queue, transitions }
    }

    /// Rig already sitting in Idle with a clean journal.
    pub fn idle() -> Self {
        let mut rig = Self::new();
        rig.app.set_device_state(DeviceState::Idle);
        rig.reset_records();
        rig
    }

    /// Idle with the audio channel open, as after a finished exchange.
    pub fn idle_with_channel() -> Self {
        let mut rig = Self::idle();
        assert!(rig.protocol.open_audio_channel());
        rig.settle();
        rig.reset_records();
        rig
    }

    pub fn reset_records(&self) {
        self.journal.clear();
        self.transitions.lock().unwrap().clear();
    }

    /// Process whatever is pending until nothing is left.
    pub fn settle(&mut self) {
        for _ in 0..8 {
            if self.app.is_halted() {
                return;
            }
            self.app.process_pending();
        }
    }

    pub fn inject(&mut self, value: Value) {
        self.protocol.inject_json(&value);
        self.app.process_pending();
    }

    pub fn set_music(&self, activity: MediaActivity) {
        self.board.sim_music().set_activity(activity);
    }

    pub fn states(&self) -> Vec<DeviceState> {
        self.transitions.lock().unwrap().iter().map(|(_, next)| *next).collect()
    }

    pub fn position(&self, entry: &str) -> usize {
        self.journal
            .position(entry)
            .unwrap_or_else(|| panic!("`{}` not in journal: {:?}", entry, self.journal.entries()))
    }
}
