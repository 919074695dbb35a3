//! Browser WebSocket wire format
//!
//! JSON envelopes with base64 audio, tagged by `type`.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::warn;

use voxflow_core::packet::{Action, InterruptionSource};
use voxflow_runtime::OutputEvent;

use crate::session::{CarrierFrame, WireMessage, WireProtocol};

/// Client → server messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    /// Audio data (base64 encoded)
    Audio { data: String },
    /// Text input
    Text { content: String },
    Ping,
    EndSession,
}

/// Server → client messages
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Outbound<'a> {
    Transcript {
        id: &'a str,
        text: &'a str,
        is_final: bool,
    },
    Response {
        id: &'a str,
        text: &'a str,
        completed: bool,
    },
    ResponseAudio {
        id: &'a str,
        data: String,
    },
    Interruption {
        source: InterruptionSource,
        time: f64,
    },
    Action {
        name: &'a str,
        action: Action,
    },
}

/// The browser/web-plugin wire protocol
#[derive(Default)]
pub struct BrowserProtocol;

impl WireProtocol for BrowserProtocol {
    fn decode(&self, message: WireMessage) -> Option<CarrierFrame> {
        let text = match message {
            WireMessage::Text(text) => text,
            // Raw binary frames are audio as-is
            WireMessage::Binary(bytes) => return Some(CarrierFrame::Audio(bytes)),
        };
        let inbound: Inbound = match serde_json::from_str(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                warn!(error = %e, "skipping malformed browser frame");
                return None;
            }
        };
        match inbound {
            Inbound::Audio { data } => match BASE64.decode(data) {
                Ok(bytes) => Some(CarrierFrame::Audio(bytes)),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable audio frame");
                    None
                }
            },
            Inbound::Text { content } => Some(CarrierFrame::Text(content)),
            Inbound::Ping => None,
            Inbound::EndSession => Some(CarrierFrame::Close),
        }
    }

    fn encode(&self, event: &OutputEvent) -> Option<WireMessage> {
        let outbound = match event {
            OutputEvent::UserText {
                id,
                text,
                completed,
            } => Outbound::Transcript {
                id,
                text,
                is_final: *completed,
            },
            OutputEvent::AssistantText {
                id,
                text,
                completed,
            } => Outbound::Response {
                id,
                text,
                completed: *completed,
            },
            OutputEvent::AssistantAudio { id, bytes } => Outbound::ResponseAudio {
                id,
                data: BASE64.encode(bytes),
            },
            OutputEvent::Interruption { source, time } => Outbound::Interruption {
                source: *source,
                time: *time,
            },
            OutputEvent::Action { name, action } => Outbound::Action {
                name,
                action: *action,
            },
        };
        serde_json::to_string(&outbound).ok().map(WireMessage::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_text_and_audio() {
        let protocol = BrowserProtocol;
        let frame = protocol
            .decode(WireMessage::Text(
                "{\"type\":\"text\",\"content\":\"hello\"}".into(),
            ))
            .unwrap();
        assert!(matches!(frame, CarrierFrame::Text(t) if t == "hello"));

        let encoded = BASE64.encode([1u8, 2, 3]);
        let frame = protocol
            .decode(WireMessage::Text(format!(
                "{{\"type\":\"audio\",\"data\":\"{encoded}\"}}"
            )))
            .unwrap();
        assert!(matches!(frame, CarrierFrame::Audio(b) if b == vec![1, 2, 3]));
    }

    #[test]
    fn test_malformed_frames_are_skipped_not_fatal() {
        let protocol = BrowserProtocol;
        assert!(protocol.decode(WireMessage::Text("not json".into())).is_none());
        assert!(protocol
            .decode(WireMessage::Text(
                "{\"type\":\"audio\",\"data\":\"!!!\"}".into()
            ))
            .is_none());
        assert!(protocol.decode(WireMessage::Text("{\"type\":\"ping\"}".into())).is_none());
    }

    #[test]
    fn test_end_session_closes() {
        let protocol = BrowserProtocol;
        let frame = protocol
            .decode(WireMessage::Text("{\"type\":\"end_session\"}".into()))
            .unwrap();
        assert!(matches!(frame, CarrierFrame::Close));
    }

    #[test]
    fn test_encode_response_and_audio() {
        let protocol = BrowserProtocol;
        let WireMessage::Text(json) = protocol
            .encode(&OutputEvent::AssistantText {
                id: "m1".into(),
                text: "hi".into(),
                completed: true,
            })
            .unwrap()
        else {
            panic!("expected text frame");
        };
        assert!(json.contains("\"type\":\"response\""));
        assert!(json.contains("\"completed\":true"));

        let WireMessage::Text(json) = protocol
            .encode(&OutputEvent::AssistantAudio {
                id: "m1".into(),
                bytes: vec![0xff, 0x00],
            })
            .unwrap()
        else {
            panic!("expected text frame");
        };
        assert!(json.contains("\"type\":\"response_audio\""));
    }

    #[test]
    fn test_encode_action() {
        let protocol = BrowserProtocol;
        let WireMessage::Text(json) = protocol
            .encode(&OutputEvent::Action {
                name: "hang_up".into(),
                action: Action::EndConversation,
            })
            .unwrap()
        else {
            panic!("expected text frame");
        };
        assert!(json.contains("END_CONVERSATION"));
    }
}
