// Kiki Companion — Device State Machine
//
// `DeviceState` is the one conversational state. Side effects of entering a
// state are computed by `plan_transition` as plain data so the main loop can
// apply them and tests can inspect them without hardware.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::config::*;

// ---------------------------------------------------------------------------
// DeviceState
// ---------------------------------------------------------------------------
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Unknown = 0,
    Starting,
    Configuring,
    Idle,
    Connecting,
    Listening,
    Speaking,
    Upgrading,
    Activating,
    AudioTesting,
    FatalError,
    Invalid,
}

impl DeviceState {
    pub const ALL: [DeviceState; 12] = [
        DeviceState::Unknown,
        DeviceState::Starting,
        DeviceState::Configuring,
        DeviceState::Idle,
        DeviceState::Connecting,
        DeviceState::Listening,
        DeviceState::Speaking,
        DeviceState::Upgrading,
        DeviceState::Activating,
        DeviceState::AudioTesting,
        DeviceState::FatalError,
        DeviceState::Invalid,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Starting => "starting",
            Self::Configuring => "configuring",
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Listening => "listening",
            Self::Speaking => "speaking",
            Self::Upgrading => "upgrading",
            Self::Activating => "activating",
            Self::AudioTesting => "audio_testing",
            Self::FatalError => "fatal_error",
            Self::Invalid => "invalid_state",
        }
    }

    /// Out-of-range values decode to `Invalid`.
    pub fn from_u8(raw: u8) -> Self {
        Self::ALL.get(raw as usize).copied().unwrap_or(Self::Invalid)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock-free published copy of the state. Written by the main loop only;
/// other threads read it for UI and telemetry.
#[derive(Debug, Clone)]
pub struct SharedState(Arc<AtomicU8>);

impl SharedState {
    pub fn new(state: DeviceState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn get(&self) -> DeviceState {
        DeviceState::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn publish(&self, state: DeviceState) {
        self.0.store(state as u8, Ordering::Relaxed);
    }
}

// ---------------------------------------------------------------------------
// Modifiers layered on top of the state
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningMode {
    AutoStop,
    ManualStop,
    Realtime,
}

impl ListeningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutoStop => "auto",
            Self::ManualStop => "manual",
            Self::Realtime => "realtime",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AecMode {
    Off,
    OnDeviceSide,
    OnServerSide,
}

impl AecMode {
    /// Realtime keeps the microphone open during playback, which is only
    /// safe when some echo cancellation is active.
    pub fn conversation_mode(&self) -> ListeningMode {
        match self {
            Self::Off => ListeningMode::AutoStop,
            Self::OnDeviceSide | Self::OnServerSide => ListeningMode::Realtime,
        }
    }
}

/// What the background music player is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaActivity {
    #[default]
    Inactive,
    /// Resolving or buffering a track.
    Loading,
    Playing,
}

impl MediaActivity {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Inactive)
    }
}

// ---------------------------------------------------------------------------
// Transition planning
// ---------------------------------------------------------------------------

/// Inputs to [`plan_transition`] sampled from the audio pipeline and player.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    pub audio_processor_running: bool,
    pub listening_mode: ListeningMode,
    pub afe_wake_word: bool,
    pub media: MediaActivity,
    pub suppress_media_stop: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionPlan {
    pub status: Option<&'static str>,
    pub emotion: Option<&'static str>,
    pub clear_chat: bool,
    pub voice_processing: Option<bool>,
    pub wake_word: Option<bool>,
    pub send_start_listening: bool,
    pub reset_decoder: bool,
    pub stop_background_media: bool,
}

/// Side effects of moving from `prev` to `next`.
pub fn plan_transition(
    prev: DeviceState,
    next: DeviceState,
    ctx: &TransitionContext,
) -> TransitionPlan {
    let mut plan = TransitionPlan {
        stop_background_media: prev == DeviceState::Idle
            && next != DeviceState::Idle
            && ctx.media == MediaActivity::Playing
            && !ctx.suppress_media_stop,
        ..TransitionPlan::default()
    };

    match next {
        DeviceState::Unknown | DeviceState::Idle => {
            plan.status = Some(STR_STANDBY);
            plan.emotion = Some("neutral");
            plan.voice_processing = Some(false);
            plan.wake_word = Some(true);
        }
        DeviceState::Connecting => {
            plan.status = Some(STR_CONNECTING);
            plan.emotion = Some("neutral");
            plan.clear_chat = true;
        }
        DeviceState::Listening => {
            plan.status = Some(STR_LISTENING);
            plan.emotion = Some("neutral");
            if !ctx.audio_processor_running {
                plan.send_start_listening = true;
                plan.voice_processing = Some(true);
                plan.wake_word = Some(false);
            }
        }
        DeviceState::Speaking => {
            plan.status = Some(STR_SPEAKING);
            if ctx.listening_mode != ListeningMode::Realtime {
                plan.voice_processing = Some(false);
                plan.wake_word = Some(ctx.afe_wake_word);
            }
            plan.reset_decoder = true;
        }
        _ => {}
    }
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> TransitionContext {
        TransitionContext {
            audio_processor_running: false,
            listening_mode: ListeningMode::AutoStop,
            afe_wake_word: false,
            media: MediaActivity::Inactive,
            suppress_media_stop: false,
        }
    }

    #[test]
    fn raw_values_round_trip_and_overflow_to_invalid() {
        for state in DeviceState::ALL {
            assert_eq!(DeviceState::from_u8(state as u8), state);
        }
        assert_eq!(DeviceState::from_u8(200), DeviceState::Invalid);
    }

    #[test]
    fn entering_listening_starts_voice_processing() {
        let plan = plan_transition(DeviceState::Connecting, DeviceState::Listening, &ctx());
        assert!(plan.send_start_listening);
        assert_eq!(plan.voice_processing, Some(true));
        assert_eq!(plan.wake_word, Some(false));
    }

    #[test]
    fn listening_with_running_processor_does_not_resend_start() {
        let c = TransitionContext { audio_processor_running: true, ..ctx() };
        let plan = plan_transition(DeviceState::Speaking, DeviceState::Listening, &c);
        assert!(!plan.send_start_listening);
        assert_eq!(plan.voice_processing, None);
    }

    #[test]
    fn realtime_speaking_keeps_the_microphone() {
        let c = TransitionContext { listening_mode: ListeningMode::Realtime, ..ctx() };
        let plan = plan_transition(DeviceState::Listening, DeviceState::Speaking, &c);
        assert_eq!(plan.voice_processing, None);
        assert!(plan.reset_decoder);

        let plan = plan_transition(DeviceState::Listening, DeviceState::Speaking, &ctx());
        assert_eq!(plan.voice_processing, Some(false));
    }

    #[test]
    fn leaving_idle_stops_music_unless_suppressed() {
        let playing = TransitionContext { media: MediaActivity::Playing, ..ctx() };
        assert!(plan_transition(DeviceState::Idle, DeviceState::Connecting, &playing).stop_background_media);
        assert!(!plan_transition(DeviceState::Listening, DeviceState::Speaking, &playing).stop_background_media);

        let suppressed = TransitionContext { suppress_media_stop: true, ..playing };
        assert!(!plan_transition(DeviceState::Idle, DeviceState::Connecting, &suppressed).stop_background_media);

        let loading = TransitionContext { media: MediaActivity::Loading, ..ctx() };
        assert!(!plan_transition(DeviceState::Idle, DeviceState::Connecting, &loading).stop_background_media);
    }

    #[test]
    fn aec_picks_conversation_mode() {
        assert_eq!(AecMode::Off.conversation_mode(), ListeningMode::AutoStop);
        assert_eq!(AecMode::OnServerSide.conversation_mode(), ListeningMode::Realtime);
    }
}
