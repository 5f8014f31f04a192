// Kiki Companion — ESP-IDF Platform
//
// Chip services over the raw IDF calls, plus the NVS-backed settings store.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

use super::{HeapStats, Platform, WakeupCause};
use crate::settings::{SettingsError, SettingsStore};

type RenderHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
pub struct EspPlatform {
    suspend_render: Option<RenderHook>,
    resume_render: Option<RenderHook>,
}

impl EspPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks into the display driver's render task.
    pub fn with_render_hooks(
        mut self,
        suspend: impl Fn() + Send + Sync + 'static,
        resume: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.suspend_render = Some(Arc::new(suspend));
        self.resume_render = Some(Arc::new(resume));
        self
    }
}

impl Platform for EspPlatform {
    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }

    fn now_ms(&self) -> u64 {
        unsafe { (esp_idf_sys::esp_timer_get_time() / 1000) as u64 }
    }

    fn restart(&self) {
        unsafe { esp_idf_sys::esp_restart() };
    }

    fn heap_stats(&self) -> HeapStats {
        let caps = esp_idf_sys::MALLOC_CAP_INTERNAL;
        unsafe {
            HeapStats {
                free_sram: esp_idf_sys::heap_caps_get_free_size(caps),
                min_free_sram: esp_idf_sys::heap_caps_get_minimum_free_size(caps),
            }
        }
    }

    fn suspend_render(&self) {
        if let Some(hook) = &self.suspend_render {
            hook();
        }
    }

    fn resume_render(&self) {
        if let Some(hook) = &self.resume_render {
            hook();
        }
    }

    fn light_sleep(&self, wake_after: Duration) -> WakeupCause {
        unsafe {
            esp_idf_sys::esp_sleep_enable_timer_wakeup(wake_after.as_micros() as u64);
            esp_idf_sys::esp_light_sleep_start();
            match esp_idf_sys::esp_sleep_get_wakeup_cause() {
                esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_TIMER => WakeupCause::Timer,
                esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_GPIO
                | esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT0
                | esp_idf_sys::esp_sleep_source_t_ESP_SLEEP_WAKEUP_EXT1 => WakeupCause::Gpio,
                _ => WakeupCause::Other,
            }
        }
    }

    fn deep_sleep(&self) {
        unsafe { esp_idf_sys::esp_deep_sleep_start() };
    }
}

// ---------------------------------------------------------------------------
// NVS settings
// ---------------------------------------------------------------------------

const NVS_STR_MAX: usize = 256;

pub struct NvsSettings {
    partition: EspDefaultNvsPartition,
}

impl NvsSettings {
    pub fn new(partition: EspDefaultNvsPartition) -> Self {
        Self { partition }
    }

    fn open(&self, namespace: &str) -> Result<EspNvs<NvsDefault>, SettingsError> {
        EspNvs::new(self.partition.clone(), namespace, true).map_err(|e| {
            log::warn!("NVS namespace {} unavailable: {}", namespace, e);
            SettingsError::Namespace(namespace.to_owned())
        })
    }

    fn storage_error(namespace: &str, key: &str, e: esp_idf_sys::EspError) -> SettingsError {
        SettingsError::Storage { namespace: namespace.to_owned(), key: key.to_owned(), code: e.code() }
    }
}

impl SettingsStore for NvsSettings {
    fn get_string(&self, namespace: &str, key: &str) -> Option<String> {
        let nvs = self.open(namespace).ok()?;
        let mut buf = [0u8; NVS_STR_MAX];
        nvs.get_str(key, &mut buf).ok().flatten().map(str::to_owned)
    }

    fn get_int(&self, namespace: &str, key: &str) -> Option<i32> {
        self.open(namespace).ok()?.get_i32(key).ok().flatten()
    }

    fn get_bool(&self, namespace: &str, key: &str) -> Option<bool> {
        self.open(namespace).ok()?.get_u8(key).ok().flatten().map(|v| v != 0)
    }

    fn set_string(&self, namespace: &str, key: &str, value: &str) -> Result<(), SettingsError> {
        self.open(namespace)?
            .set_str(key, value)
            .map_err(|e| Self::storage_error(namespace, key, e))
    }

    fn set_int(&self, namespace: &str, key: &str, value: i32) -> Result<(), SettingsError> {
        self.open(namespace)?
            .set_i32(key, value)
            .map_err(|e| Self::storage_error(namespace, key, e))
    }

    fn set_bool(&self, namespace: &str, key: &str, value: bool) -> Result<(), SettingsError> {
        self.open(namespace)?
            .set_u8(key, value as u8)
            .map_err(|e| Self::storage_error(namespace, key, e))
    }
}
