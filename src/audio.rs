// Kiki Companion — Audio Service Contract
//
// Capture, codec, AEC and wake-word internals live behind this trait. The
// core only needs queue access, feature switches and three notifications.

use crate::events::Sound;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioPacket {
    pub timestamp: u32,
    pub payload: Vec<u8>,
}

impl AudioPacket {
    pub fn new(timestamp: u32, payload: Vec<u8>) -> Self {
        Self { timestamp, payload }
    }
}

/// Notifications raised from audio pipeline threads. Implementations must
/// only set event bits or schedule work.
pub struct AudioCallbacks {
    pub on_send_queue_available: Box<dyn Fn() + Send + Sync>,
    pub on_wake_word_detected: Box<dyn Fn(&str) + Send + Sync>,
    pub on_vad_change: Box<dyn Fn(bool) + Send + Sync>,
}

pub trait AudioService: Send + Sync {
    fn initialize(&self, callbacks: AudioCallbacks);
    fn start(&self);
    fn stop(&self);

    /// `false` means the decode queue is full and the packet was dropped.
    fn push_packet_to_decode_queue(&self, packet: AudioPacket) -> bool;
    fn pop_packet_from_send_queue(&self) -> Option<AudioPacket>;

    fn enable_voice_processing(&self, enable: bool);
    fn enable_wake_word_detection(&self, enable: bool);
    fn enable_device_aec(&self, enable: bool);
    fn enable_audio_testing(&self, enable: bool);

    fn is_audio_processor_running(&self) -> bool;
    fn is_wake_word_running(&self) -> bool;
    /// Wake word detection runs inside the AFE and survives speaking.
    fn is_afe_wake_word(&self) -> bool;
    fn is_voice_detected(&self) -> bool;
    fn is_idle(&self) -> bool;

    fn play_sound(&self, sound: Sound);
    fn reset_decoder(&self);

    /// Encode the buffered wake word utterance for upload.
    fn encode_wake_word(&self);
    fn pop_wake_word_packet(&self) -> Option<AudioPacket>;
    fn last_wake_word(&self) -> String;
}
