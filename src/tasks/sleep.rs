// Kiki Companion — Sleep Coordinator
//
// A 1 s timer counts consecutive sleep-eligible seconds. Crossing the light
// sleep threshold hands off to the main loop, which parks wake-word
// detection and starts a dedicated light-sleep thread. That thread naps in
// fixed intervals with the render loop suspended and exits on any wakeup
// that is not its own timer, or when `wake_up()` pulls it out.
//
//   Inactive → LightSleepPending → LightSleeping → Inactive
//   (ticks ≥ deep threshold) → deep sleep, no return

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::board::Board;
use crate::config::*;
use crate::platform::{Platform, WakeupCause};
use crate::settings::SettingsStore;

/// What the coordinator needs from the rest of the firmware.
pub trait SleepHost: Send + Sync {
    /// Idle, audio channel closed, audio pipeline idle.
    fn can_enter_sleep_mode(&self) -> bool;
    /// Run `task` on the main loop.
    fn schedule(&self, task: Box<dyn FnOnce() + Send>);
    fn is_wake_word_running(&self) -> bool;
    fn set_wake_word_detection(&self, enabled: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepConfig {
    pub light_after_s: Option<u32>,
    pub deep_after_s: Option<u32>,
    pub wake_interval: Duration,
}

impl SleepConfig {
    /// Thresholds in seconds; `-1` disables a stage.
    pub fn new(light_after_s: i32, deep_after_s: i32) -> Self {
        Self {
            light_after_s: u32::try_from(light_after_s).ok(),
            deep_after_s: u32::try_from(deep_after_s).ok(),
            wake_interval: Duration::from_secs(LIGHT_SLEEP_WAKE_INTERVAL_S),
        }
    }
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self::new(LIGHT_SLEEP_AFTER_S, DEEP_SLEEP_AFTER_S)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPhase {
    Inactive,
    LightSleepPending,
    LightSleeping,
}

type Callback = Box<dyn Fn() + Send + Sync>;

struct SleepState {
    enabled: bool,
    ticks: u32,
    phase: SleepPhase,
    wake_word_suspended: bool,
    task: Option<JoinHandle<()>>,
}

pub struct SleepCoordinator {
    host: Arc<dyn SleepHost>,
    board: Arc<dyn Board>,
    platform: Arc<dyn Platform>,
    config: SleepConfig,
    state: Mutex<SleepState>,
    on_enter_light: Option<Callback>,
    on_exit_light: Option<Callback>,
    on_enter_deep: Option<Callback>,
}

impl SleepCoordinator {
    pub fn new(
        host: Arc<dyn SleepHost>,
        board: Arc<dyn Board>,
        platform: Arc<dyn Platform>,
        config: SleepConfig,
    ) -> Self {
        Self {
            host,
            board,
            platform,
            config,
            state: Mutex::new(SleepState {
                enabled: false,
                ticks: 0,
                phase: SleepPhase::Inactive,
                wake_word_suspended: false,
                task: None,
            }),
            on_enter_light: None,
            on_exit_light: None,
            on_enter_deep: None,
        }
    }

    pub fn on_enter_light_sleep(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_enter_light = Some(Box::new(f));
        self
    }

    pub fn on_exit_light_sleep(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_exit_light = Some(Box::new(f));
        self
    }

    pub fn on_enter_deep_sleep(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_enter_deep = Some(Box::new(f));
        self
    }

    /// Backlight off while napping and back on at exit; display and
    /// backlight off before deep sleep.
    pub fn with_board_hooks(self) -> Self {
        let (enter, exit, deep) = (
            Arc::clone(&self.board),
            Arc::clone(&self.board),
            Arc::clone(&self.board),
        );
        self.on_enter_light_sleep(move || {
            if let Some(backlight) = enter.backlight() {
                backlight.set_brightness(0);
            }
        })
        .on_exit_light_sleep(move || {
            if let Some(backlight) = exit.backlight() {
                backlight.restore_brightness();
            }
        })
        .on_enter_deep_sleep(move || {
            deep.display().set_power_save_mode(true);
            if let Some(backlight) = deep.backlight() {
                backlight.set_brightness(0);
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, SleepState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn phase(&self) -> SleepPhase {
        self.lock().phase
    }

    pub fn ticks(&self) -> u32 {
        self.lock().ticks
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().enabled
    }

    /// Enabling is refused when `wifi/sleep_mode` is false. Disabling wakes.
    pub fn set_enabled(&self, enabled: bool, settings: &dyn SettingsStore) {
        let mut st = self.lock();
        if enabled && !st.enabled {
            if !settings.get_bool(NS_WIFI, KEY_SLEEP_MODE).unwrap_or(true) {
                log::info!("Sleep timer disabled by settings");
                return;
            }
            st.ticks = 0;
            st.enabled = true;
            log::info!("Sleep timer enabled");
        } else if !enabled && st.enabled {
            st.enabled = false;
            drop(st);
            self.wake_up();
            log::info!("Sleep timer disabled");
        }
    }

    /// One timer period. Runs on the sleep timer thread.
    pub fn check_timer(self: &Arc<Self>) {
        let mut st = self.lock();
        if !st.enabled {
            return;
        }
        if !self.host.can_enter_sleep_mode() {
            st.ticks = 0;
            return;
        }
        st.ticks += 1;
        let ticks = st.ticks;

        if self.config.light_after_s.is_some_and(|t| ticks >= t)
            && st.phase == SleepPhase::Inactive
        {
            st.phase = SleepPhase::LightSleepPending;
            drop(st);
            let this = Arc::clone(self);
            self.host.schedule(Box::new(move || this.begin_light_sleep()));
        } else {
            drop(st);
        }

        if self.config.deep_after_s.is_some_and(|t| ticks >= t) {
            log::info!("Idle for {} s, entering deep sleep", ticks);
            if let Some(cb) = &self.on_enter_deep {
                cb();
            }
            self.platform.deep_sleep();
        }
    }

    /// Main-loop half of the handoff.
    fn begin_light_sleep(self: &Arc<Self>) {
        if self.phase() != SleepPhase::LightSleepPending {
            return;
        }
        if let Some(cb) = &self.on_enter_light {
            cb();
        }
        let suspended = self.host.is_wake_word_running();
        if suspended {
            self.host.set_wake_word_detection(false);
            self.platform.sleep(Duration::from_millis(WAKE_WORD_RELEASE_MS));
        }

        let mut st = self.lock();
        if st.phase != SleepPhase::LightSleepPending {
            // woken while the wake word was being released
            drop(st);
            if suspended {
                self.host.set_wake_word_detection(true);
            }
            return;
        }
        st.wake_word_suspended = suspended;
        if st.task.as_ref().is_some_and(|t| !t.is_finished()) {
            log::debug!("Light sleep task already running");
            st.phase = SleepPhase::LightSleeping;
            return;
        }

        st.phase = SleepPhase::LightSleeping;
        let this = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("light_sleep".into())
            .stack_size(STACK_LIGHT_SLEEP)
            .spawn(move || this.light_sleep_loop());
        match spawned {
            Ok(handle) => {
                st.task = Some(handle);
                log::info!("Light sleep task started");
            }
            Err(e) => {
                log::error!("Failed to start light sleep task: {}", e);
                st.phase = SleepPhase::Inactive;
                st.wake_word_suspended = false;
                drop(st);
                if suspended {
                    self.host.set_wake_word_detection(true);
                }
            }
        }
    }

    fn light_sleep_loop(&self) {
        while self.phase() == SleepPhase::LightSleeping {
            self.board.display().update_status_bar(true);
            self.platform.suspend_render();
            let cause = self.platform.light_sleep(self.config.wake_interval);
            self.platform.resume_render();
            log::info!("Woke from light sleep: {:?}", cause);
            if cause != WakeupCause::Timer {
                break;
            }
        }
        self.leave_light_sleep();
    }

    /// Cancel any pending or active light sleep. Safe from any thread and
    /// safe to repeat.
    pub fn wake_up(&self) {
        self.leave_light_sleep();
    }

    fn leave_light_sleep(&self) {
        let restore = {
            let mut st = self.lock();
            st.ticks = 0;
            match st.phase {
                SleepPhase::LightSleeping => {
                    st.phase = SleepPhase::Inactive;
                    Some(std::mem::take(&mut st.wake_word_suspended))
                }
                SleepPhase::LightSleepPending => {
                    st.phase = SleepPhase::Inactive;
                    None
                }
                SleepPhase::Inactive => None,
            }
        };
        if let Some(wake_word) = restore {
            log::info!("Exited light sleep");
            if let Some(cb) = &self.on_exit_light {
                cb();
            }
            if wake_word {
                self.host.set_wake_word_detection(true);
            }
        }
    }

    /// Block until the light-sleep thread, if any, has exited.
    pub fn join_light_sleep_task(&self) {
        let task = self.lock().task.take();
        if let Some(task) = task {
            if task.join().is_err() {
                log::error!("Light sleep task panicked");
            }
        }
    }
}

pub fn sleep_timer_task(coordinator: Arc<SleepCoordinator>, platform: Arc<dyn Platform>) {
    log::info!("Sleep timer task started");
    loop {
        platform.sleep(Duration::from_millis(SLEEP_TICK_MS));
        coordinator.check_timer();
    }
}

pub fn spawn_timer(
    coordinator: &Arc<SleepCoordinator>,
    platform: Arc<dyn Platform>,
) -> anyhow::Result<JoinHandle<()>> {
    let coordinator = Arc::clone(coordinator);
    let handle = thread::Builder::new()
        .name("sleep_timer".into())
        .stack_size(STACK_SLEEP_TIMER)
        .spawn(move || sleep_timer_task(coordinator, platform))?;
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::sim::{Journal, SimBoard, SimPlatform};
    use crate::settings::MemorySettings;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct FakeHost {
        eligible: AtomicBool,
        wake_word: AtomicBool,
        scheduled: Mutex<Vec<Box<dyn FnOnce() + Send>>>,
    }

    impl FakeHost {
        fn run_scheduled(&self) {
            let tasks = std::mem::take(&mut *self.scheduled.lock().unwrap());
            for t in tasks {
                t();
            }
        }
    }

    impl SleepHost for FakeHost {
        fn can_enter_sleep_mode(&self) -> bool {
            self.eligible.load(Ordering::SeqCst)
        }
        fn schedule(&self, task: Box<dyn FnOnce() + Send>) {
            self.scheduled.lock().unwrap().push(task);
        }
        fn is_wake_word_running(&self) -> bool {
            self.wake_word.load(Ordering::SeqCst)
        }
        fn set_wake_word_detection(&self, enabled: bool) {
            self.wake_word.store(enabled, Ordering::SeqCst);
        }
    }

    struct Rig {
        host: Arc<FakeHost>,
        platform: Arc<SimPlatform>,
        coord: Arc<SleepCoordinator>,
        exits: Arc<AtomicUsize>,
    }

    fn rig(light: i32, deep: i32) -> Rig {
        let host = Arc::new(FakeHost::default());
        host.eligible.store(true, Ordering::SeqCst);
        host.wake_word.store(true, Ordering::SeqCst);
        let platform = Arc::new(SimPlatform::virtual_time());
        let exits = Arc::new(AtomicUsize::new(0));
        let counter = exits.clone();
        let coord = SleepCoordinator::new(
            host.clone(),
            Arc::new(SimBoard::new(Journal::new())),
            platform.clone(),
            SleepConfig::new(light, deep),
        )
        .on_exit_light_sleep(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let coord = Arc::new(coord);
        coord.set_enabled(true, &MemorySettings::new());
        Rig { host, platform, coord, exits }
    }

    #[test]
    fn ineligible_tick_resets_the_count() {
        let r = rig(3, -1);
        r.coord.check_timer();
        r.coord.check_timer();
        r.host.eligible.store(false, Ordering::SeqCst);
        r.coord.check_timer();
        assert_eq!(r.coord.ticks(), 0);
        r.host.eligible.store(true, Ordering::SeqCst);
        r.coord.check_timer();
        r.coord.check_timer();
        assert_eq!(r.coord.phase(), SleepPhase::Inactive);
        r.coord.check_timer();
        assert_eq!(r.coord.phase(), SleepPhase::LightSleepPending);
        assert_eq!(r.host.scheduled.lock().unwrap().len(), 1);
    }

    #[test]
    fn light_sleep_ends_on_non_timer_wakeup() {
        let r = rig(1, -1);
        r.platform.script_wakeups([WakeupCause::Timer, WakeupCause::Timer, WakeupCause::Gpio]);
        r.coord.check_timer();
        r.host.run_scheduled();
        r.coord.join_light_sleep_task();

        assert_eq!(r.coord.phase(), SleepPhase::Inactive);
        assert_eq!(r.exits.load(Ordering::SeqCst), 1);
        assert!(r.host.is_wake_word_running());
        assert_eq!(r.platform.journal().count("platform.light_sleep"), 3);
        assert_eq!(r.platform.journal().count("render.resume"), 3);
    }

    #[test]
    fn wake_up_is_idempotent() {
        let r = rig(1, -1);
        r.platform.script_wakeups([WakeupCause::Other]);
        r.coord.check_timer();
        r.host.run_scheduled();
        r.coord.wake_up();
        r.coord.wake_up();
        r.coord.join_light_sleep_task();
        r.coord.wake_up();
        assert_eq!(r.exits.load(Ordering::SeqCst), 1);
        assert_eq!(r.coord.ticks(), 0);
    }

    #[test]
    fn wake_before_handoff_cancels_it() {
        let r = rig(1, -1);
        r.coord.check_timer();
        r.coord.wake_up();
        r.host.run_scheduled();
        assert_eq!(r.coord.phase(), SleepPhase::Inactive);
        assert_eq!(r.platform.journal().count("platform.light_sleep"), 0);
        assert_eq!(r.exits.load(Ordering::SeqCst), 0);
        assert!(r.host.is_wake_word_running());
    }

    #[test]
    fn deep_sleep_after_threshold() {
        let r = rig(-1, 2);
        r.coord.check_timer();
        assert_eq!(r.platform.journal().count("platform.deep_sleep"), 0);
        r.coord.check_timer();
        assert_eq!(r.platform.journal().count("platform.deep_sleep"), 1);
    }

    #[test]
    fn board_hooks_dim_around_light_sleep_and_blank_before_deep_sleep() {
        let journal = Journal::new();
        let host = Arc::new(FakeHost::default());
        host.eligible.store(true, Ordering::SeqCst);
        let platform = Arc::new(SimPlatform::virtual_time().with_journal(journal.clone()));
        let coord = Arc::new(
            SleepCoordinator::new(
                host.clone(),
                Arc::new(SimBoard::new(journal.clone())),
                platform.clone(),
                SleepConfig::new(1, 2),
            )
            .with_board_hooks(),
        );
        coord.set_enabled(true, &MemorySettings::new());
        platform.script_wakeups([WakeupCause::Gpio]);

        coord.check_timer();
        host.run_scheduled();
        coord.join_light_sleep_task();
        let dim = journal.position("backlight.brightness:0").unwrap();
        assert!(dim < journal.position("platform.light_sleep").unwrap());
        assert!(journal.position("platform.light_sleep").unwrap() < journal.position("backlight.restore").unwrap());

        journal.clear();
        coord.check_timer();
        coord.check_timer();
        let blank = journal.position("display.power_save:true").unwrap();
        assert!(blank < journal.position("platform.deep_sleep").unwrap());
        assert!(journal.contains("backlight.brightness:0"));
    }

    #[test]
    fn settings_can_veto_enabling() {
        let settings = MemorySettings::new();
        settings.set_bool(NS_WIFI, KEY_SLEEP_MODE, false).unwrap();
        let coord = SleepCoordinator::new(
            Arc::new(FakeHost::default()),
            Arc::new(SimBoard::new(Journal::new())),
            Arc::new(SimPlatform::virtual_time()),
            SleepConfig::default(),
        );
        coord.set_enabled(true, &settings);
        assert!(!coord.is_enabled());
    }
}
