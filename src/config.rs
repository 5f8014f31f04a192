// Kiki Companion — Hardware & System Configuration
// Target: ESP32-S3 quadruped (4 leg servos + tail), LCD face, I2S audio

// ---------------------------------------------------------------------------
// GPIO Pin Definitions (servo PWM outputs)
// ---------------------------------------------------------------------------
pub const PIN_SERVO_LF: i32 = 17;   // Left front leg
pub const PIN_SERVO_RF: i32 = 18;   // Right front leg
pub const PIN_SERVO_LB: i32 = 8;    // Left back leg
pub const PIN_SERVO_RB: i32 = 38;   // Right back leg
pub const PIN_SERVO_TAIL: i32 = 39; // Tail

// ---------------------------------------------------------------------------
// Servo PWM (standard 50 Hz hobby servo)
// ---------------------------------------------------------------------------
pub const SERVO_PWM_HZ: u32 = 50;
pub const SERVO_PULSE_MIN_US: u32 = 500;  // 0°
pub const SERVO_PULSE_MAX_US: u32 = 2500; // 180°
pub const SERVO_PERIOD_US: u32 = 20_000;
pub const SERVO_NEUTRAL_DEG: i32 = 90;

// ---------------------------------------------------------------------------
// Task Stack Sizes (bytes)
// ---------------------------------------------------------------------------
pub const STACK_BOOT: usize = 8192;
pub const STACK_CLOCK: usize = 2048;
pub const STACK_MOTION: usize = 8192;
pub const STACK_SLEEP_TIMER: usize = 3072;
pub const STACK_LIGHT_SLEEP: usize = 3072;

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------
pub const CLOCK_TICK_MS: u64 = 1000;
pub const HEAP_REPORT_EVERY_TICKS: u32 = 10;
pub const MAIN_CALL_TIMEOUT_MS: u64 = 10_000;        // boot thread → main loop round trip
pub const REBOOT_DELAY_MS: u64 = 1000;
pub const STT_TEXT_LIMIT: usize = 1500;               // characters

// ---------------------------------------------------------------------------
// Version check / activation
// ---------------------------------------------------------------------------
pub const VERSION_CHECK_MAX_RETRY: u32 = 10;
pub const VERSION_CHECK_INITIAL_DELAY_S: u32 = 10;   // doubles on every failure
pub const ACTIVATION_ATTEMPTS: u32 = 10;
pub const ACTIVATION_TIMEOUT_RETRY_MS: u64 = 3000;
pub const ACTIVATION_ERROR_RETRY_MS: u64 = 10_000;
pub const UPGRADE_ALERT_MS: u64 = 3000;
pub const UPGRADE_SETTLE_MS: u64 = 1000;
pub const UPGRADE_FAILED_PAUSE_MS: u64 = 3000;

// ---------------------------------------------------------------------------
// Action queue / motion task
// ---------------------------------------------------------------------------
pub const ACTION_QUEUE_CAPACITY: usize = 10;
pub const ACTION_ENQUEUE_TIMEOUT_MS: u64 = 100;
pub const MOTION_POLL_INTERVAL_MS: u64 = 100;
pub const MOTION_SETTLE_MS: u64 = 20;                 // pause after every action
pub const MOTION_WAKE_SETTLE_MS: u64 = 50;            // servos re-attached after power save
pub const MOTION_IDLE_TIMEOUT_MIN: u32 = 60;          // default, overridable in settings
pub const MOTION_IDLE_LOG_EVERY_MS: u64 = 300_000;    // progress log while idle
pub const INTERPOLATION_TICK_MS: u32 = 10;
pub const HOLD_SLICE_MS: u32 = 100;                   // longest uninterruptible hold
pub const ACTION_MAX_STEPS: i32 = 20;                 // repeats per action
pub const ACTION_MAX_SPEED_MS: i32 = 3000;            // per-move delay / hold
pub const ACTION_MAX_HOLD_MS: i32 = 10_000;           // balance, toilet, delay
pub const ACTION_MAX_PLAY_DEAD_S: i32 = 60;

// ---------------------------------------------------------------------------
// Sleep coordinator
// ---------------------------------------------------------------------------
pub const SLEEP_TICK_MS: u64 = 1000;
pub const LIGHT_SLEEP_AFTER_S: i32 = 20;
pub const DEEP_SLEEP_AFTER_S: i32 = -1;               // -1 = disabled
pub const LIGHT_SLEEP_WAKE_INTERVAL_S: u64 = 30;
pub const WAKE_WORD_RELEASE_MS: u64 = 100;

// ---------------------------------------------------------------------------
// Settings namespaces / keys
// ---------------------------------------------------------------------------
pub const NS_MOTION: &str = "otto";
pub const KEY_IDLE_TIMEOUT: &str = "idle_timeout";   // minutes
pub const NS_TRIMS: &str = "otto_trims";
pub const NS_WIFI: &str = "wifi";
pub const KEY_SLEEP_MODE: &str = "sleep_mode";
pub const NS_STORAGE: &str = "storage";
pub const KEY_CUSTOM_KEYWORDS: &str = "delicious_kw";
pub const KEY_CUSTOM_EMOTION: &str = "delicious_emo";
pub const KEY_CUSTOM_POSE: &str = "delicious_pose";
pub const DEFAULT_CUSTOM_EMOTION: &str = "delicious";

// ---------------------------------------------------------------------------
// UI strings
// ---------------------------------------------------------------------------
pub const STR_STANDBY: &str = "Standby";
pub const STR_CONNECTING: &str = "Connecting...";
pub const STR_LISTENING: &str = "Listening...";
pub const STR_SPEAKING: &str = "Speaking...";
pub const STR_ERROR: &str = "Error";
pub const STR_VERSION: &str = "Ver ";
pub const STR_CHECKING_NEW_VERSION: &str = "Checking for new version...";
pub const STR_CHECK_NEW_VERSION_FAILED: &str = "Check new version failed, retry in";
pub const STR_ACTIVATION: &str = "Activation";
pub const STR_OTA_UPGRADE: &str = "OTA Upgrade";
pub const STR_UPGRADING: &str = "System is upgrading, please wait...";
pub const STR_NEW_VERSION: &str = "New version: ";
pub const STR_UPGRADE_FAILED: &str = "Upgrade failed";
pub const STR_UPGRADE_DONE: &str = "Upgrade successful, rebooting...";
pub const STR_PROTOCOL_FAILED: &str = "Failed to connect to service";
pub const STR_RTC_MODE_ON: &str = "Realtime chat on";
pub const STR_RTC_MODE_OFF: &str = "Realtime chat off";
pub const STR_NOW_PLAYING: &str = "Now playing: ";
pub const CONTROL_PANEL_FALLBACK_URL: &str = "http://192.168.4.1";
pub const CONTROL_PANEL_NOTICE_MS: u64 = 15_000;
pub const CONTROL_PANEL_AUTOSTART_MS: u64 = 5000;       // after boot completes
pub const EMOJI_NOTICE_MS: u64 = 3000;
pub const MUSIC_NOTICE_MS: u64 = 2000;
