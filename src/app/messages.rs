// Kiki Companion — Inbound Server Messages

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("message has no string `type`")]
    MissingType,
    #[error("unknown message type `{0}`")]
    UnknownType(String),
    #[error("malformed `{kind}` message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    Stop,
    SentenceStart,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Tts {
        state: TtsState,
        #[serde(default)]
        text: Option<String>,
    },
    Stt {
        text: String,
    },
    Llm {
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        emotion: Option<String>,
    },
    Mcp {
        payload: Value,
    },
    System {
        command: String,
    },
    Alert {
        status: String,
        message: String,
        emotion: String,
    },
    Custom {
        payload: Value,
    },
}

const KNOWN_TYPES: [&str; 7] = ["tts", "stt", "llm", "mcp", "system", "alert", "custom"];

impl ServerMessage {
    pub fn parse(value: &Value) -> Result<Self, MessageError> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MessageError::MissingType)?;
        if !KNOWN_TYPES.contains(&kind) {
            return Err(MessageError::UnknownType(kind.to_owned()));
        }
        Self::deserialize(value).map_err(|source| MessageError::Malformed {
            kind: kind.to_owned(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tts_states() {
        let msg = ServerMessage::parse(&json!({"type": "tts", "state": "sentence_start", "text": "hi"})).unwrap();
        assert_eq!(msg, ServerMessage::Tts { state: TtsState::SentenceStart, text: Some("hi".into()) });
        let msg = ServerMessage::parse(&json!({"type": "tts", "state": "paused"})).unwrap();
        assert_eq!(msg, ServerMessage::Tts { state: TtsState::Other, text: None });
    }

    #[test]
    fn alert_fields_must_be_strings() {
        let err = ServerMessage::parse(&json!({"type": "alert", "status": "x", "message": 3, "emotion": "sad"}));
        assert!(matches!(err, Err(MessageError::Malformed { .. })));
    }

    #[test]
    fn unknown_and_missing_types() {
        assert!(matches!(ServerMessage::parse(&json!({"state": "start"})), Err(MessageError::MissingType)));
        assert!(matches!(
            ServerMessage::parse(&json!({"type": "hello"})),
            Err(MessageError::UnknownType(t)) if t == "hello"
        ));
    }
}
