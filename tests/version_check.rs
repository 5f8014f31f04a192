// Kiki Companion — Version Check, Activation & Upgrade

use std::sync::Mutex;

use kiki_companion::events::Sound;
use kiki_companion::ota::{check_new_version, OtaError, OtaHost, VersionCheckOutcome};
use kiki_companion::platform::sim::{Journal, SimOta, SimPlatform};
use kiki_companion::platform::Platform;
use kiki_companion::state::DeviceState;

/// Records what the version check asks of the application.
struct FakeHost {
    state: Mutex<DeviceState>,
    calls: Journal,
    /// Pretend the user pressed the chat button after this many alerts.
    idle_after_alerts: Option<usize>,
}

impl FakeHost {
    fn new(calls: Journal) -> Self {
        Self { state: Mutex::new(DeviceState::Starting), calls, idle_after_alerts: None }
    }
}

impl OtaHost for FakeHost {
    fn device_state(&self) -> DeviceState {
        *self.state.lock().unwrap()
    }
    fn set_device_state(&self, state: DeviceState) {
        *self.state.lock().unwrap() = state;
        self.calls.record(format!("state:{}", state));
    }
    fn set_status(&self, status: &str) {
        self.calls.record(format!("status:{}", status));
    }
    fn set_chat_message(&self, role: &str, content: &str) {
        self.calls.record(format!("chat:{}:{}", role, content));
    }
    fn alert(&self, status: &str, _message: &str, emotion: &str, _sound: Option<Sound>) {
        self.calls.record(format!("alert:{}:{}", status, emotion));
        if let Some(n) = self.idle_after_alerts {
            if self.calls.entries().iter().filter(|e| e.starts_with("alert:")).count() >= n {
                *self.state.lock().unwrap() = DeviceState::Idle;
            }
        }
    }
    fn play_sound(&self, sound: Sound) {
        self.calls.record(format!("sound:{}", sound.name()));
    }
    fn close_audio_channel(&self) {
        self.calls.record("close");
    }
    fn set_power_save_mode(&self, enabled: bool) {
        self.calls.record(format!("power_save:{}", enabled));
    }
    fn start_audio(&self) {
        self.calls.record("audio.start");
    }
    fn stop_audio(&self) {
        self.calls.record("audio.stop");
    }
    fn reboot(&self) {
        self.calls.record("reboot");
    }
}

#[test]
fn failures_back_off_then_recover() {
    let journal = Journal::new();
    let host = FakeHost::new(journal.clone());
    let platform = SimPlatform::virtual_time();
    let mut ota = SimOta::new(journal.clone()).with_checks([
        Err(OtaError::Timeout),
        Err(OtaError::Failed(-1)),
        Err(OtaError::Timeout),
    ]);

    assert_eq!(check_new_version(&mut ota, &host, &platform), VersionCheckOutcome::Ready);
    assert_eq!(journal.count("ota.check"), 4);
    assert_eq!(journal.count("ota.mark_valid"), 1);
    // 10 + 20 + 40 seconds of waiting
    assert_eq!(platform.now_ms(), 70_000);
}

#[test]
fn gives_up_after_ten_failures() {
    let journal = Journal::new();
    let host = FakeHost::new(journal.clone());
    let platform = SimPlatform::virtual_time();
    let mut ota = SimOta::new(journal.clone()).with_checks((0..10).map(|_| Err(OtaError::Timeout)));

    assert_eq!(check_new_version(&mut ota, &host, &platform), VersionCheckOutcome::GaveUp);
    assert_eq!(journal.count("ota.check"), 10);
    assert_eq!(journal.count("alert:Error:cloud_slash"), 9);
    assert_eq!(journal.count("ota.mark_valid"), 0);
}

#[test]
fn going_idle_cuts_the_wait_short() {
    let journal = Journal::new();
    let mut host = FakeHost::new(journal.clone());
    host.idle_after_alerts = Some(1);
    let platform = SimPlatform::virtual_time();
    let mut ota = SimOta::new(journal.clone()).with_checks([Err(OtaError::Timeout)]);

    assert_eq!(check_new_version(&mut ota, &host, &platform), VersionCheckOutcome::Ready);
    assert_eq!(platform.now_ms(), 1000);
}

#[test]
fn activation_code_is_read_out_and_retried() {
    let journal = Journal::new();
    let host = FakeHost::new(journal.clone());
    let platform = SimPlatform::virtual_time();
    let mut ota = SimOta::new(journal.clone())
        .with_activation("407", [Err(OtaError::Timeout), Err(OtaError::Other("denied".into())), Ok(())]);

    assert_eq!(check_new_version(&mut ota, &host, &platform), VersionCheckOutcome::Ready);
    assert_eq!(journal.count("ota.activate"), 3);
    assert!(journal.contains("alert:Activation:link"));
    let digits: Vec<_> = journal.entries().into_iter().filter(|e| e.starts_with("sound:digit_")).collect();
    assert_eq!(digits, vec!["sound:digit_4", "sound:digit_0", "sound:digit_7"]);
    // 3 s after the timeout, 10 s after the refusal
    assert_eq!(platform.now_ms(), 13_000);
}

#[test]
fn successful_upgrade_reboots() {
    let journal = Journal::new();
    let host = FakeHost::new(journal.clone());
    let platform = SimPlatform::virtual_time();
    let mut ota = SimOta::new(journal.clone()).offering("9.9.9");

    assert_eq!(check_new_version(&mut ota, &host, &platform), VersionCheckOutcome::Upgraded);
    let entries = journal.entries();
    let at = |e: &str| entries.iter().position(|x| x == e).unwrap();
    assert!(at("close") < at("state:upgrading"));
    assert!(at("audio.stop") < at("ota.upgrade"));
    assert!(journal.contains("chat:system:New version: 9.9.9"));
    assert!(journal.contains("chat:system:100% 64KB/s"));
    assert_eq!(journal.count("reboot"), 1);
    assert_eq!(journal.count("ota.mark_valid"), 0);
}

#[test]
fn failed_upgrade_restores_audio_and_carries_on() {
    let journal = Journal::new();
    let host = FakeHost::new(journal.clone());
    let platform = SimPlatform::virtual_time();
    let mut ota = SimOta::new(journal.clone())
        .offering("9.9.9")
        .with_upgrade_result(Err(OtaError::Failed(5)));

    assert_eq!(check_new_version(&mut ota, &host, &platform), VersionCheckOutcome::Ready);
    assert_eq!(journal.count("audio.start"), 1);
    assert!(journal.contains("power_save:true"));
    assert!(journal.contains("alert:Error:circle_xmark"));
    assert_eq!(journal.count("reboot"), 0);
    assert_eq!(journal.count("ota.mark_valid"), 1);
}
