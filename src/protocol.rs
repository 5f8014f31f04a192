// Kiki Companion — Protocol Contract
//
// Transport-agnostic session with the speech service (WebSocket or MQTT+UDP
// on the real device). Callbacks fire on transport threads.

use serde_json::{json, Value};

use crate::audio::AudioPacket;
use crate::events::AbortReason;
use crate::state::ListeningMode;

pub struct ProtocolCallbacks {
    pub on_connected: Box<dyn Fn() + Send + Sync>,
    pub on_network_error: Box<dyn Fn(&str) + Send + Sync>,
    pub on_incoming_audio: Box<dyn Fn(AudioPacket) + Send + Sync>,
    pub on_audio_channel_opened: Box<dyn Fn() + Send + Sync>,
    pub on_audio_channel_closed: Box<dyn Fn() + Send + Sync>,
    pub on_incoming_json: Box<dyn Fn(&Value) + Send + Sync>,
}

pub trait Protocol: Send + Sync {
    fn set_callbacks(&self, callbacks: ProtocolCallbacks);
    fn start(&self) -> bool;

    fn open_audio_channel(&self) -> bool;
    fn close_audio_channel(&self) -> bool;
    fn is_audio_channel_opened(&self) -> bool;

    fn send_audio(&self, packet: AudioPacket) -> bool;
    fn send_wake_word_detected(&self, wake_word: &str);
    fn send_start_listening(&self, mode: ListeningMode);
    fn send_stop_listening(&self);
    fn send_abort_speaking(&self, reason: AbortReason);
    fn send_mcp_message(&self, payload: &str);
    fn send_json_text(&self, text: &str) -> bool;
}

/// Receiver for `mcp` payloads (the tool-call server).
pub trait McpDispatcher: Send + Sync {
    fn handle_message(&self, payload: &Value);
}

// ---------------------------------------------------------------------------
// Outgoing JSON frames
// ---------------------------------------------------------------------------

pub fn listen_start(session_id: &str, mode: ListeningMode) -> Value {
    json!({ "session_id": session_id, "type": "listen", "state": "start", "mode": mode.as_str() })
}

pub fn listen_stop(session_id: &str) -> Value {
    json!({ "session_id": session_id, "type": "listen", "state": "stop" })
}

pub fn listen_detect(session_id: &str, text: &str) -> Value {
    json!({ "session_id": session_id, "type": "listen", "state": "detect", "text": text })
}

pub fn abort(session_id: &str, reason: AbortReason) -> Value {
    let mut frame = json!({ "session_id": session_id, "type": "abort" });
    if let Some(reason) = reason.as_str() {
        frame["reason"] = Value::from(reason);
    }
    frame
}

/// Wrap an MCP payload. Payloads that are not valid JSON are carried as a
/// string so nothing is silently lost.
pub fn mcp(session_id: &str, payload: &str) -> Value {
    let payload = serde_json::from_str::<Value>(payload).unwrap_or_else(|_| Value::from(payload));
    json!({ "session_id": session_id, "type": "mcp", "payload": payload })
}

pub fn music_control(action: &str, text: &str) -> Value {
    json!({ "type": "music_control", "action": action, "text": text })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abort_reason_is_optional() {
        assert!(abort("s", AbortReason::None).get("reason").is_none());
        assert_eq!(abort("s", AbortReason::WakeWordDetected)["reason"], "wake_word_detected");
    }

    #[test]
    fn mcp_payload_is_embedded_as_json() {
        let frame = mcp("s", r#"{"jsonrpc":"2.0","method":"ping"}"#);
        assert_eq!(frame["payload"]["method"], "ping");
        let frame = mcp("s", "not json");
        assert_eq!(frame["payload"], "not json");
    }

    #[test]
    fn listen_start_carries_mode() {
        assert_eq!(listen_start("s", ListeningMode::Realtime)["mode"], "realtime");
    }
}
