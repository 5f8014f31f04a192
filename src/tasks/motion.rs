// Kiki Companion — Motion Task
//
// Sole consumer of the action queue. Plays one choreography at a time and,
// when nothing arrives for the idle timeout, puts the body to rest: lie down,
// display off, control panel stopped, servos detached. That rest state is
// tracked here only; the conversation state machine never sees it.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde_json::{json, Value};

use crate::board::Board;
use crate::config::*;
use crate::motion::gestures::choreograph;
use crate::motion::{
    ActionEntry, ActionKind, ActionQueue, Choreography, Interpolator, Playback, ServoBank, StopSignal,
};
use crate::platform::Platform;
use crate::scheduler::panic_message;
use crate::settings::{SettingsError, SettingsStore};

// ---------------------------------------------------------------------------
// Shared status
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct StatusInner {
    in_progress: AtomicBool,
    power_save: AtomicBool,
    idle_ms: AtomicU64,
    idle_timeout_ms: AtomicU64,
}

/// Read side of the motion task's state, safe to clone into any task.
#[derive(Debug, Clone)]
pub struct MotionStatus(Arc<StatusInner>);

impl MotionStatus {
    pub fn new(idle_timeout_min: u32) -> Self {
        Self(Arc::new(StatusInner {
            in_progress: AtomicBool::new(false),
            power_save: AtomicBool::new(false),
            idle_ms: AtomicU64::new(0),
            idle_timeout_ms: AtomicU64::new(minutes_to_ms(idle_timeout_min)),
        }))
    }

    /// Idle timeout from `otto/idle_timeout`, falling back to the default.
    pub fn load(settings: &dyn SettingsStore) -> Self {
        let minutes = settings
            .get_int(NS_MOTION, KEY_IDLE_TIMEOUT)
            .filter(|m| *m > 0)
            .map(|m| m as u32)
            .unwrap_or(MOTION_IDLE_TIMEOUT_MIN);
        log::info!("Motion idle timeout: {} min", minutes);
        Self::new(minutes)
    }

    pub fn is_action_in_progress(&self) -> bool {
        self.0.in_progress.load(Ordering::Acquire)
    }

    pub fn is_power_saving(&self) -> bool {
        self.0.power_save.load(Ordering::Acquire)
    }

    pub fn idle_ms(&self) -> u64 {
        self.0.idle_ms.load(Ordering::Relaxed)
    }

    pub fn idle_timeout_ms(&self) -> u64 {
        self.0.idle_timeout_ms.load(Ordering::Relaxed)
    }

    /// Change and persist the idle timeout. Zero is bumped to one minute.
    pub fn set_idle_timeout(
        &self,
        minutes: u32,
        settings: &dyn SettingsStore,
    ) -> Result<(), SettingsError> {
        let minutes = minutes.max(1);
        self.0.idle_timeout_ms.store(minutes_to_ms(minutes), Ordering::Relaxed);
        log::info!("Motion idle timeout set to {} min", minutes);
        settings.set_int(NS_MOTION, KEY_IDLE_TIMEOUT, minutes as i32)
    }

    fn begin(&self) {
        self.0.idle_ms.store(0, Ordering::Relaxed);
        self.0.in_progress.store(true, Ordering::Release);
    }

    fn finish(&self) {
        self.0.in_progress.store(false, Ordering::Release);
    }

    fn add_idle(&self, elapsed_ms: u64) -> u64 {
        self.0.idle_ms.fetch_add(elapsed_ms, Ordering::Relaxed) + elapsed_ms
    }
}

fn minutes_to_ms(minutes: u32) -> u64 {
    minutes as u64 * 60_000
}

// ---------------------------------------------------------------------------
// Completion report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionCompletion {
    pub action: ActionKind,
    pub outcome: Playback,
}

impl ActionCompletion {
    /// JSON-RPC notification forwarded upstream over MCP.
    pub fn to_notification(&self) -> Value {
        json!({
            "jsonrpc": "2.0",
            "method": "notifications/action_completed",
            "params": {
                "action_type": self.action as i32,
                "action": self.action.name(),
                "status": match self.outcome {
                    Playback::Completed => "completed",
                    Playback::Cancelled => "cancelled",
                },
            },
        })
    }
}

pub type CompletionReporter = Box<dyn Fn(&ActionCompletion) + Send>;

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct MotionExecutor {
    rx: Receiver<ActionEntry>,
    stop: StopSignal,
    servos: Box<dyn ServoBank>,
    board: Arc<dyn Board>,
    platform: Arc<dyn Platform>,
    status: MotionStatus,
    reporter: Option<CompletionReporter>,
    poll: Duration,
}

impl MotionExecutor {
    pub fn new(
        queue: &ActionQueue,
        servos: Box<dyn ServoBank>,
        board: Arc<dyn Board>,
        platform: Arc<dyn Platform>,
        status: MotionStatus,
    ) -> Self {
        Self {
            rx: queue.receiver(),
            stop: queue.stop_signal(),
            servos,
            board,
            platform,
            status,
            reporter: None,
            poll: Duration::from_millis(MOTION_POLL_INTERVAL_MS),
        }
    }

    pub fn with_reporter(mut self, reporter: CompletionReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn status(&self) -> MotionStatus {
        self.status.clone()
    }

    pub fn servos(&self) -> &dyn ServoBank {
        self.servos.as_ref()
    }

    /// Wait one poll interval for an action. Returns `false` once every
    /// producer is gone.
    pub fn poll_once(&mut self) -> bool {
        match self.rx.recv_timeout(self.poll) {
            Ok(entry) => {
                self.handle_guarded(entry);
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                self.on_idle_tick(self.poll.as_millis() as u64);
                true
            }
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    /// [`handle_entry`] with a panic contained to the one action.
    ///
    /// [`handle_entry`]: MotionExecutor::handle_entry
    pub fn handle_guarded(&mut self, entry: ActionEntry) -> Option<ActionCompletion> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.handle_entry(entry))) {
            Ok(done) => done,
            Err(payload) => {
                log::error!(
                    "Action {} panicked: {}",
                    entry.action_type,
                    panic_message(payload.as_ref())
                );
                self.status.finish();
                None
            }
        }
    }

    pub fn handle_entry(&mut self, entry: ActionEntry) -> Option<ActionCompletion> {
        self.status.begin();
        if self.status.is_power_saving() {
            self.leave_power_save();
        }

        let (Some(kind), Some(choreo)) = (entry.kind(), choreograph(&entry)) else {
            log::warn!("Unknown action type {}, skipped", entry.action_type);
            self.status.finish();
            return None;
        };

        let played = entry.clamped();
        if played != entry {
            log::warn!(
                "Action {}: steps {} speed {} clamped to {} / {}",
                kind.name(),
                entry.steps,
                entry.speed,
                played.steps,
                played.speed
            );
        }
        log::info!(
            "Action {}: steps={} speed={} dir={}",
            kind.name(),
            played.steps,
            played.speed,
            played.direction
        );
        let board = Arc::clone(&self.board);
        let display = board.display();
        if let Some(mood) = choreo.mood {
            display.set_emotion(mood.during);
        }
        let outcome = self.play(&choreo);
        if let Some(mood) = choreo.mood {
            display.set_emotion(mood.after);
        }
        self.status.finish();
        log::info!("Action {} {:?}", kind.name(), outcome);

        let completion = ActionCompletion { action: kind, outcome };
        if let Some(report) = &self.reporter {
            report(&completion);
        }
        self.platform.sleep(Duration::from_millis(MOTION_SETTLE_MS));
        Some(completion)
    }

    /// Account for `elapsed_ms` without an action. Returns `true` on the tick
    /// that enters power save.
    pub fn on_idle_tick(&mut self, elapsed_ms: u64) -> bool {
        if self.status.is_power_saving() {
            return false;
        }
        let idle = self.status.add_idle(elapsed_ms);
        let timeout = self.status.idle_timeout_ms();
        if idle % MOTION_IDLE_LOG_EVERY_MS < elapsed_ms {
            log::info!(
                "Idle for {} min ({:.1}% of {} min timeout)",
                idle / 60_000,
                idle as f32 * 100.0 / timeout.max(1) as f32,
                timeout / 60_000
            );
        }
        if idle >= timeout {
            self.enter_power_save();
            return true;
        }
        false
    }

    fn play(&mut self, choreo: &Choreography) -> Playback {
        let epoch = self.stop.epoch();
        let stop = self.stop.clone();
        let cancelled = move || stop.is_cancelled(epoch);
        Interpolator::new(self.servos.as_mut(), self.platform.as_ref(), &cancelled).play(choreo)
    }

    fn enter_power_save(&mut self) {
        log::info!(
            "Idle timeout reached ({} min), entering power save",
            self.status.idle_timeout_ms() / 60_000
        );
        self.status.0.power_save.store(true, Ordering::Release);

        if let Some(rest) = choreograph(&ActionEntry::new(ActionKind::LieDown, 1, 1500)) {
            self.play(&rest);
        }
        self.platform.sleep(Duration::from_millis(500));

        self.board.display().set_power_save_mode(true);
        if let Some(backlight) = self.board.backlight() {
            backlight.set_brightness(0);
        }
        if let Some(panel) = self.board.control_panel() {
            panel.stop();
        }
        self.servos.detach();
        log::info!("Servos detached, power save active");
    }

    fn leave_power_save(&mut self) {
        log::info!("Waking from power save");
        self.board.display().set_power_save_mode(false);
        if let Some(backlight) = self.board.backlight() {
            backlight.restore_brightness();
        }
        if let Some(panel) = self.board.control_panel() {
            panel.start();
        }
        self.servos.attach();
        self.platform.sleep(Duration::from_millis(MOTION_WAKE_SETTLE_MS));
        self.status.0.power_save.store(false, Ordering::Release);
    }
}

pub fn motion_task(mut executor: MotionExecutor) {
    log::info!("Motion task started");
    executor.servos.attach();
    while executor.poll_once() {}
    log::warn!("Action queue closed, motion task exiting");
}

/// Queue the initial home pose and start the motion thread.
pub fn spawn(queue: &ActionQueue, executor: MotionExecutor) -> anyhow::Result<JoinHandle<()>> {
    if let Err(e) = queue.enqueue(ActionEntry::home()) {
        log::warn!("Initial home action not queued: {}", e);
    }
    let handle = thread::Builder::new()
        .name("motion".into())
        .stack_size(STACK_MOTION)
        .spawn(move || motion_task(executor))?;
    Ok(handle)
}
