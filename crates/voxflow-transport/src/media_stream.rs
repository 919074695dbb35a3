//! Telephony media-stream wire format
//!
//! Carriers deliver μ-law frames inside JSON envelopes tagged by `event`.
//! Outbound audio is returned the same way; an interruption clears the
//! carrier's playback buffer.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use voxflow_runtime::OutputEvent;

use crate::session::{CarrierFrame, WireMessage, WireProtocol};

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(default)]
    event: String,
    #[serde(default)]
    media: Option<MediaPayload>,
    #[serde(default)]
    start: Option<StartPayload>,
}

#[derive(Debug, Deserialize)]
struct MediaPayload {
    #[serde(default)]
    payload: String,
}

#[derive(Debug, Deserialize)]
struct StartPayload {
    #[serde(rename = "streamSid", default)]
    stream_sid: String,
}

#[derive(Debug, Serialize)]
struct OutboundMedia<'a> {
    event: &'static str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
    media: OutboundPayload,
}

#[derive(Debug, Serialize)]
struct OutboundPayload {
    payload: String,
}

#[derive(Debug, Serialize)]
struct OutboundClear<'a> {
    event: &'static str,
    #[serde(rename = "streamSid")]
    stream_sid: &'a str,
}

/// The phone-carrier media stream protocol. The stream id arrives in the
/// carrier's `start` event and tags every outbound frame.
pub struct MediaStreamProtocol {
    stream_sid: Mutex<String>,
}

impl Default for MediaStreamProtocol {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaStreamProtocol {
    pub fn new() -> Self {
        Self {
            stream_sid: Mutex::new(String::new()),
        }
    }

    pub fn stream_sid(&self) -> String {
        self.stream_sid.lock().clone()
    }
}

impl WireProtocol for MediaStreamProtocol {
    fn decode(&self, message: WireMessage) -> Option<CarrierFrame> {
        let text = match message {
            WireMessage::Text(text) => text,
            WireMessage::Binary(bytes) => return Some(CarrierFrame::Audio(bytes)),
        };
        let envelope: InboundEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "skipping malformed media stream frame");
                return None;
            }
        };
        match envelope.event.as_str() {
            "media" => {
                let payload = envelope.media?.payload;
                match BASE64.decode(payload) {
                    Ok(bytes) => Some(CarrierFrame::Audio(bytes)),
                    Err(e) => {
                        warn!(error = %e, "skipping undecodable media payload");
                        None
                    }
                }
            }
            "start" => {
                if let Some(start) = envelope.start {
                    debug!(stream_sid = %start.stream_sid, "media stream started");
                    *self.stream_sid.lock() = start.stream_sid;
                }
                None
            }
            "stop" => Some(CarrierFrame::Close),
            "connected" | "mark" => None,
            other => {
                debug!(event = other, "ignoring media stream event");
                None
            }
        }
    }

    fn encode(&self, event: &OutputEvent) -> Option<WireMessage> {
        match event {
            OutputEvent::AssistantAudio { bytes, .. } => {
                let sid = self.stream_sid.lock();
                let message = OutboundMedia {
                    event: "media",
                    stream_sid: &sid,
                    media: OutboundPayload {
                        payload: BASE64.encode(bytes),
                    },
                };
                serde_json::to_string(&message).ok().map(WireMessage::Text)
            }
            OutputEvent::Interruption { .. } => {
                // Stop whatever the carrier is still playing
                let sid = self.stream_sid.lock();
                let message = OutboundClear {
                    event: "clear",
                    stream_sid: &sid,
                };
                serde_json::to_string(&message).ok().map(WireMessage::Text)
            }
            // A voice-only carrier has no representation for text events
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_captures_stream_sid() {
        let protocol = MediaStreamProtocol::new();
        let frame = protocol.decode(WireMessage::Text(
            "{\"event\":\"start\",\"start\":{\"streamSid\":\"MZ123\"}}".into(),
        ));
        assert!(frame.is_none());
        assert_eq!(protocol.stream_sid(), "MZ123");
    }

    #[test]
    fn test_media_frames_decode_to_audio() {
        let protocol = MediaStreamProtocol::new();
        let payload = BASE64.encode(vec![0xffu8; 160]);
        let frame = protocol
            .decode(WireMessage::Text(format!(
                "{{\"event\":\"media\",\"media\":{{\"payload\":\"{payload}\"}}}}"
            )))
            .unwrap();
        assert!(matches!(frame, CarrierFrame::Audio(b) if b.len() == 160));
    }

    #[test]
    fn test_stop_closes_session() {
        let protocol = MediaStreamProtocol::new();
        let frame = protocol
            .decode(WireMessage::Text("{\"event\":\"stop\"}".into()))
            .unwrap();
        assert!(matches!(frame, CarrierFrame::Close));
    }

    #[test]
    fn test_outbound_audio_and_clear() {
        let protocol = MediaStreamProtocol::new();
        protocol.decode(WireMessage::Text(
            "{\"event\":\"start\",\"start\":{\"streamSid\":\"MZ9\"}}".into(),
        ));

        let WireMessage::Text(json) = protocol
            .encode(&OutputEvent::AssistantAudio {
                id: "m1".into(),
                bytes: vec![0xff; 8],
            })
            .unwrap()
        else {
            panic!("expected text frame");
        };
        assert!(json.contains("\"event\":\"media\""));
        assert!(json.contains("MZ9"));

        let WireMessage::Text(json) = protocol
            .encode(&OutputEvent::Interruption {
                source: voxflow_core::InterruptionSource::Vad,
                time: 12.0,
            })
            .unwrap()
        else {
            panic!("expected text frame");
        };
        assert!(json.contains("\"event\":\"clear\""));
    }

    #[test]
    fn test_text_events_have_no_phone_representation() {
        let protocol = MediaStreamProtocol::new();
        assert!(protocol
            .encode(&OutputEvent::AssistantText {
                id: "m1".into(),
                text: "hi".into(),
                completed: false,
            })
            .is_none());
    }
}
