// Kiki Companion — Firmware Entry Point
//
// Startup:
//   1. Logging (EspLogger on target, tracing-subscriber on the host).
//   2. Settings, platform, board and servo bank.
//   3. Application, sleep coordinator and motion executor wired together.
//   4. Motion and sleep timer threads spawned.
//   5. Application::start (clock + boot threads), then the main loop.
//
// The host build runs the same core against the simulated board and reads
// test commands from stdin.

use std::sync::Arc;

use kiki_companion::app::{AppConfig, AppHandle, Application};
use kiki_companion::audio::AudioService;
use kiki_companion::board::Board;
use kiki_companion::motion::{ActionQueue, ServoBank};
use kiki_companion::ota::Ota;
use kiki_companion::platform::Platform;
use kiki_companion::protocol::Protocol;
use kiki_companion::settings::SettingsStore;
use kiki_companion::tasks::motion::{MotionExecutor, MotionStatus};
use kiki_companion::tasks::sleep::{SleepConfig, SleepCoordinator};
use kiki_companion::tasks;

struct Parts {
    board: Arc<dyn Board>,
    audio: Arc<dyn AudioService>,
    protocol: Arc<dyn Protocol>,
    platform: Arc<dyn Platform>,
    settings: Arc<dyn SettingsStore>,
    servos: Box<dyn ServoBank>,
    ota: Box<dyn Ota>,
}

/// Wire the core, spawn the helper threads and run the main loop. Returns
/// only after a reboot request halts the loop. `on_ready` gets a handle and
/// the action queue before the loop starts.
fn run(
    parts: Parts,
    on_ready: impl FnOnce(AppHandle, ActionQueue) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let Parts { board, audio, protocol, platform, settings, servos, ota } = parts;

    let queue = ActionQueue::with_default_capacity();
    let app = Application::new(
        board.clone(),
        audio,
        protocol,
        platform.clone(),
        settings.clone(),
        AppConfig::default(),
    );
    let handle = app.handle();

    let sleep = Arc::new(
        SleepCoordinator::new(
            Arc::new(handle.clone()),
            board.clone(),
            platform.clone(),
            SleepConfig::default(),
        )
        .with_board_hooks(),
    );
    let mut app = app.with_sleep(sleep.clone()).with_motion(queue.clone());

    let reporter = handle.clone();
    let executor = MotionExecutor::new(
        &queue,
        servos,
        board,
        platform.clone(),
        MotionStatus::load(settings.as_ref()),
    )
    .with_reporter(Box::new(move |done| {
        reporter.send_mcp_message(&done.to_notification().to_string());
    }));
    tasks::motion::spawn(&queue, executor)?;
    tasks::sleep::spawn_timer(&sleep, platform)?;

    on_ready(handle, queue)?;
    app.start(ota)?;
    app.run();
    Ok(())
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    use esp_idf_hal::gpio::AnyOutputPin;
    use esp_idf_hal::ledc::config::TimerConfig;
    use esp_idf_hal::ledc::{LedcDriver, LedcTimerDriver, Resolution};
    use esp_idf_hal::prelude::*;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;

    use kiki_companion::config::*;
    use kiki_companion::drivers::servo::LedcServoBank;
    use kiki_companion::motion::Calibration;
    use kiki_companion::platform::esp::{EspPlatform, NvsSettings};
    use kiki_companion::platform::sim::{Journal, SimAudio, SimBoard, SimOta, SimProtocol};

    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();
    log::info!("Kiki companion firmware starting…");

    let peripherals = Peripherals::take()?;
    let settings = Arc::new(NvsSettings::new(EspDefaultNvsPartition::take()?));

    // ---- Servos (LEDC, one 50 Hz timer for all five channels) -------------
    let ledc = peripherals.ledc;
    let timer = LedcTimerDriver::new(
        ledc.timer0,
        &TimerConfig::default()
            .frequency(SERVO_PWM_HZ.Hz().into())
            .resolution(Resolution::Bits14),
    )?;
    // SAFETY: the timer drives the servos for the life of the firmware.
    let timer = &*Box::leak(Box::new(timer));
    // SAFETY: each servo pin is claimed only here.
    let pin = |n: i32| unsafe { AnyOutputPin::new(n) };
    let channels = [
        LedcDriver::new(ledc.channel0, timer, pin(PIN_SERVO_LF))?,
        LedcDriver::new(ledc.channel1, timer, pin(PIN_SERVO_RF))?,
        LedcDriver::new(ledc.channel2, timer, pin(PIN_SERVO_LB))?,
        LedcDriver::new(ledc.channel3, timer, pin(PIN_SERVO_RB))?,
        LedcDriver::new(ledc.channel4, timer, pin(PIN_SERVO_TAIL))?,
    ];
    let servos = LedcServoBank::new(channels, Calibration::load(settings.as_ref(), NS_TRIMS));

    // Codec, transport, display and updater drivers are board packages of
    // their own; until one is linked the logging stand-ins keep the core
    // running so motion and sleep can be exercised on the bench.
    let journal = Journal::new();
    let board: Arc<dyn Board> = Arc::new(SimBoard::new(journal.clone()));
    let (pause, resume) = (board.clone(), board.clone());
    let platform = EspPlatform::new().with_render_hooks(
        move || pause.display().pause_rendering(),
        move || resume.display().resume_rendering(),
    );
    run(Parts {
        board,
        audio: Arc::new(SimAudio::new(journal.clone())),
        protocol: Arc::new(SimProtocol::new(journal.clone())),
        platform: Arc::new(platform),
        settings,
        servos: Box::new(servos),
        ota: Box::new(SimOta::new(journal)),
    }, |_, _| Ok(()))?;

    // Reboot was requested; esp_restart does not return on hardware.
    loop {
        std::thread::park();
    }
}

// ---------------------------------------------------------------------------
// Host simulator
// ---------------------------------------------------------------------------

#[cfg(not(target_os = "espidf"))]
fn main() -> anyhow::Result<()> {
    use kiki_companion::platform::sim::{Journal, SimAudio, SimBoard, SimOta, SimPlatform, SimProtocol, SimServos};
    use kiki_companion::settings::MemorySettings;
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();
    log::info!("Kiki companion simulator starting…");

    let journal = Journal::new();
    let audio = Arc::new(SimAudio::new(journal.clone()));
    let protocol = Arc::new(SimProtocol::new(journal.clone()));
    let console = console::Console { audio: audio.clone(), protocol: protocol.clone() };

    run(
        Parts {
            board: Arc::new(SimBoard::new(journal.clone())),
            audio,
            protocol,
            platform: Arc::new(SimPlatform::new().with_journal(journal.clone())),
            settings: Arc::new(MemorySettings::new()),
            servos: Box::new(SimServos::new()),
            ota: Box::new(SimOta::new(journal)),
        },
        |handle, queue| console.spawn(handle, queue).map(drop),
    )
}

#[cfg(not(target_os = "espidf"))]
mod console {
    //! Line commands on stdin standing in for the microphone and server.

    use std::io::BufRead;
    use std::sync::Arc;
    use std::thread::{self, JoinHandle};

    use serde_json::{json, Value};

    use kiki_companion::app::AppHandle;
    use kiki_companion::motion::{ActionEntry, ActionQueue};
    use kiki_companion::platform::sim::{SimAudio, SimProtocol};

    pub struct Console {
        pub audio: Arc<SimAudio>,
        pub protocol: Arc<SimProtocol>,
    }

    const HELP: &str = "commands: wake [word] | chat | listen | stop | say <text> | \
                        tts start|stop|<sentence> | llm <emotion> | json <object> | \
                        act <tag> [steps] [speed] | error <message> | reboot";

    impl Console {
        pub fn spawn(self, handle: AppHandle, queue: ActionQueue) -> anyhow::Result<JoinHandle<()>> {
            let task = thread::Builder::new()
                .name("console".into())
                .spawn(move || {
                    log::info!("{}", HELP);
                    for line in std::io::stdin().lock().lines() {
                        match line {
                            Ok(line) => execute(&self, line.trim(), &handle, &queue),
                            Err(e) => {
                                log::warn!("stdin closed: {}", e);
                                break;
                            }
                        }
                    }
                })?;
            Ok(task)
        }
    }

    fn execute(sim: &Console, line: &str, handle: &AppHandle, queue: &ActionQueue) {
        let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
        match cmd {
            "" => {}
            "wake" => sim.audio.trigger_wake_word(if rest.is_empty() { "hi kiki" } else { rest }),
            "chat" => handle.toggle_chat_state(),
            "listen" => handle.start_listening(),
            "stop" => handle.stop_listening(),
            "say" => sim.protocol.inject_json(&json!({ "type": "stt", "text": rest })),
            "tts" => {
                let frame = match rest {
                    "start" | "stop" => json!({ "type": "tts", "state": rest }),
                    text => json!({ "type": "tts", "state": "sentence_start", "text": text }),
                };
                sim.protocol.inject_json(&frame);
            }
            "llm" => sim.protocol.inject_json(&json!({ "type": "llm", "emotion": rest })),
            "json" => match serde_json::from_str::<Value>(rest) {
                Ok(value) => sim.protocol.inject_json(&value),
                Err(e) => log::warn!("Bad JSON: {}", e),
            },
            "act" => {
                let mut args = rest.split_whitespace().map(str::parse::<i32>);
                let mut next = |default| args.next().and_then(Result::ok).unwrap_or(default);
                let entry = ActionEntry {
                    action_type: next(0),
                    steps: next(1),
                    speed: next(1000),
                    ..Default::default()
                };
                if let Err(e) = queue.enqueue(entry) {
                    log::warn!("Action not queued: {}", e);
                }
            }
            "error" => sim.protocol.inject_network_error(rest),
            "reboot" => handle.reboot(),
            _ => log::info!("{}", HELP),
        }
    }
}
