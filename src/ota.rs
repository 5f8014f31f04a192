// Kiki Companion — Version Check, Activation & Firmware Upgrade
//
// Runs on the boot thread, never on the main loop: every step that touches
// conversation state goes through `OtaHost`, which forwards to the main loop.

use std::time::Duration;

use crate::config::*;
use crate::events::Sound;
use crate::platform::Platform;
use crate::state::DeviceState;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum OtaError {
    #[error("server did not answer in time")]
    Timeout,
    #[error("request failed with code {0}")]
    Failed(i32),
    #[error("{0}")]
    Other(String),
}

/// Version server client. Implementations keep the last check's answer.
pub trait Ota: Send {
    fn check_version(&mut self) -> Result<(), OtaError>;
    fn check_version_url(&self) -> String;
    fn has_new_version(&self) -> bool;
    /// Version offered by the server.
    fn firmware_version(&self) -> String;
    /// Version of the running image.
    fn current_version(&self) -> String;
    fn mark_current_version_valid(&mut self);

    fn has_activation_code(&self) -> bool;
    fn has_activation_challenge(&self) -> bool;
    fn activation_code(&self) -> String;
    fn activation_message(&self) -> String;
    fn activate(&mut self) -> Result<(), OtaError>;

    /// Download and flash the offered image. `progress` gets percent and
    /// bytes per second.
    fn upgrade(&mut self, progress: &mut dyn FnMut(u32, usize)) -> Result<(), OtaError>;
}

/// Main-loop operations the version check needs.
pub trait OtaHost: Send + Sync {
    fn device_state(&self) -> DeviceState;
    fn set_device_state(&self, state: DeviceState);
    fn set_status(&self, status: &str);
    fn set_chat_message(&self, role: &str, content: &str);
    fn alert(&self, status: &str, message: &str, emotion: &str, sound: Option<Sound>);
    fn play_sound(&self, sound: Sound);
    fn close_audio_channel(&self);
    fn set_power_save_mode(&self, enabled: bool);
    fn start_audio(&self);
    fn stop_audio(&self);
    fn reboot(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionCheckOutcome {
    /// Running version accepted (and activated, if the server asked).
    Ready,
    /// Too many consecutive check failures.
    GaveUp,
    /// New image flashed; the device is rebooting.
    Upgraded,
}

/// Doubling delay with a cap on consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBackoff {
    failures: u32,
    delay_s: u32,
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self { failures: 0, delay_s: VERSION_CHECK_INITIAL_DELAY_S }
    }
}

impl RetryBackoff {
    /// Record a failure. Returns the delay to wait, or `None` once the retry
    /// budget is spent.
    pub fn fail(&mut self) -> Option<u32> {
        self.failures += 1;
        if self.failures >= VERSION_CHECK_MAX_RETRY {
            return None;
        }
        let delay = self.delay_s;
        self.delay_s = self.delay_s.saturating_mul(2);
        Some(delay)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Sleep in one-second slices, stopping early once the device is Idle.
fn wait_unless_idle(host: &dyn OtaHost, platform: &dyn Platform, seconds: u32) {
    for _ in 0..seconds {
        platform.sleep(Duration::from_secs(1));
        if host.device_state() == DeviceState::Idle {
            break;
        }
    }
}

pub fn check_new_version(
    ota: &mut dyn Ota,
    host: &dyn OtaHost,
    platform: &dyn Platform,
) -> VersionCheckOutcome {
    let mut backoff = RetryBackoff::default();
    loop {
        host.set_device_state(DeviceState::Activating);
        host.set_status(STR_CHECKING_NEW_VERSION);

        if let Err(e) = ota.check_version() {
            let Some(delay) = backoff.fail() else {
                log::error!("Too many version check failures, giving up");
                return VersionCheckOutcome::GaveUp;
            };
            let message = format!(
                "{} {} s ({}, url={})",
                STR_CHECK_NEW_VERSION_FAILED,
                delay,
                e,
                ota.check_version_url()
            );
            host.alert(STR_ERROR, &message, "cloud_slash", Some(Sound::Exclamation));
            log::warn!(
                "Version check failed, retry {}/{} in {} s",
                backoff.failures(),
                VERSION_CHECK_MAX_RETRY,
                delay
            );
            wait_unless_idle(host, platform, delay);
            continue;
        }
        backoff.reset();

        if ota.has_new_version() && upgrade_firmware(ota, host, platform) {
            return VersionCheckOutcome::Upgraded;
        }

        ota.mark_current_version_valid();
        if !ota.has_activation_code() && !ota.has_activation_challenge() {
            return VersionCheckOutcome::Ready;
        }

        host.set_status(STR_ACTIVATION);
        if ota.has_activation_code() {
            show_activation_code(host, &ota.activation_code(), &ota.activation_message());
        }

        for attempt in 1..=ACTIVATION_ATTEMPTS {
            log::info!("Activating, attempt {}/{}", attempt, ACTIVATION_ATTEMPTS);
            match ota.activate() {
                Ok(()) => return VersionCheckOutcome::Ready,
                Err(OtaError::Timeout) => {
                    platform.sleep(Duration::from_millis(ACTIVATION_TIMEOUT_RETRY_MS))
                }
                Err(e) => {
                    log::warn!("Activation failed: {}", e);
                    platform.sleep(Duration::from_millis(ACTIVATION_ERROR_RETRY_MS));
                }
            }
            if host.device_state() == DeviceState::Idle {
                break;
            }
        }
    }
}

fn show_activation_code(host: &dyn OtaHost, code: &str, message: &str) {
    host.alert(STR_ACTIVATION, message, "link", Some(Sound::Activation));
    for sound in code.chars().filter_map(Sound::from_digit) {
        host.play_sound(sound);
    }
}

/// Returns `true` if the new image was flashed (the device is rebooting).
/// A failed upgrade puts audio and power save back the way they were.
pub fn upgrade_firmware(ota: &mut dyn Ota, host: &dyn OtaHost, platform: &dyn Platform) -> bool {
    let version = ota.firmware_version();
    log::info!("Upgrading firmware {} -> {}", ota.current_version(), version);

    host.close_audio_channel();
    host.alert(STR_OTA_UPGRADE, STR_UPGRADING, "download", Some(Sound::Upgrade));
    platform.sleep(Duration::from_millis(UPGRADE_ALERT_MS));

    host.set_device_state(DeviceState::Upgrading);
    host.set_chat_message("system", &format!("{}{}", STR_NEW_VERSION, version));
    host.set_power_save_mode(false);
    host.stop_audio();
    platform.sleep(Duration::from_millis(UPGRADE_SETTLE_MS));

    let mut progress = |percent: u32, speed: usize| {
        host.set_chat_message("system", &format!("{}% {}KB/s", percent, speed / 1024));
    };
    match ota.upgrade(&mut progress) {
        Ok(()) => {
            log::info!("Firmware upgrade done, rebooting");
            host.set_chat_message("system", STR_UPGRADE_DONE);
            platform.sleep(Duration::from_millis(UPGRADE_SETTLE_MS));
            host.reboot();
            true
        }
        Err(e) => {
            log::error!("Firmware upgrade failed: {}", e);
            host.start_audio();
            host.set_power_save_mode(true);
            host.alert(STR_ERROR, STR_UPGRADE_FAILED, "circle_xmark", Some(Sound::Exclamation));
            platform.sleep(Duration::from_millis(UPGRADE_FAILED_PAUSE_MS));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_gives_up_on_the_tenth_failure() {
        let mut b = RetryBackoff::default();
        let delays: Vec<_> = (0..9).map(|_| b.fail().unwrap()).collect();
        assert_eq!(delays[..4], [10, 20, 40, 80]);
        assert_eq!(b.fail(), None);
    }

    #[test]
    fn reset_restores_the_initial_delay() {
        let mut b = RetryBackoff::default();
        b.fail();
        b.fail();
        b.reset();
        assert_eq!(b.failures(), 0);
        assert_eq!(b.fail(), Some(10));
    }
}
