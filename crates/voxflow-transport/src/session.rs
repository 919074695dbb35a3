//! The carrier session: normalization between wire frames and the runtime

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use voxflow_audio::AudioConverter;
use voxflow_core::error::TransportError;
use voxflow_core::Result;
use voxflow_runtime::{ConversationRuntime, OutputEvent, TransportOutput};

/// One frame on the carrier socket
#[derive(Debug, Clone)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// One normalized inbound event
#[derive(Debug, Clone)]
pub enum CarrierFrame {
    Audio(Vec<u8>),
    Text(String),
    Close,
}

/// A carrier wire format: how frames decode into normalized inputs and how
/// runtime outputs encode back onto the wire
pub trait WireProtocol: Send + Sync {
    /// Decode one wire message. `None` means the frame carries nothing for
    /// the runtime (keepalives, unknown events) and is skipped.
    fn decode(&self, message: WireMessage) -> Option<CarrierFrame>;

    /// Encode one runtime output. `None` means this output kind is not
    /// represented on this wire.
    fn encode(&self, event: &OutputEvent) -> Option<WireMessage>;
}

/// Bounded queue between the runtime and the socket writer
const OUTBOUND_BUFFER: usize = 128;

/// One live carrier session bound to a conversation runtime.
///
/// The socket pump owns the raw connection; the session owns normalization:
/// inbound frames are format-bridged and handed to the runtime, outbound
/// events are encoded and queued for the single writer.
pub struct TransportSession {
    protocol: Arc<dyn WireProtocol>,
    /// Carrier audio → provider input format
    input_converter: Option<AudioConverter>,
    /// Provider output format → carrier audio
    output_converter: Option<AudioConverter>,
    outbound_tx: mpsc::Sender<WireMessage>,
}

impl TransportSession {
    /// Returns the session and the receiver the socket writer drains
    pub fn new(
        protocol: Arc<dyn WireProtocol>,
        input_converter: Option<AudioConverter>,
        output_converter: Option<AudioConverter>,
    ) -> (Self, mpsc::Receiver<WireMessage>) {
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
        (
            Self {
                protocol,
                input_converter,
                output_converter,
                outbound_tx,
            },
            outbound_rx,
        )
    }

    /// Feed one raw carrier frame into the conversation. Returns `false`
    /// when the carrier signalled the end of the session.
    pub async fn input(&self, runtime: &ConversationRuntime, message: WireMessage) -> bool {
        match self.protocol.decode(message) {
            Some(CarrierFrame::Audio(bytes)) => {
                let bytes = match &self.input_converter {
                    Some(converter) => match converter.convert(&bytes) {
                        Ok(converted) => converted,
                        Err(e) => {
                            warn!(error = %e, "dropping malformed audio frame");
                            return true;
                        }
                    },
                    None => bytes,
                };
                runtime.input_audio(bytes).await;
                true
            }
            Some(CarrierFrame::Text(text)) => {
                runtime.input_text(text).await;
                true
            }
            Some(CarrierFrame::Close) => {
                debug!("carrier requested session end");
                false
            }
            None => true,
        }
    }
}

#[async_trait]
impl TransportOutput for TransportSession {
    async fn notify(&self, event: OutputEvent) -> Result<()> {
        // Bridge assistant audio into the carrier format before encoding
        let event = match (event, &self.output_converter) {
            (OutputEvent::AssistantAudio { id, bytes }, Some(converter)) => {
                let bytes = converter
                    .convert(&bytes)
                    .map_err(voxflow_core::Error::Audio)?;
                OutputEvent::AssistantAudio { id, bytes }
            }
            (event, _) => event,
        };

        let Some(message) = self.protocol.encode(&event) else {
            return Ok(());
        };
        self.outbound_tx
            .send(message)
            .await
            .map_err(|_| TransportError::Closed("outbound queue closed".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxflow_core::AudioConfig;

    struct EchoProtocol;

    impl WireProtocol for EchoProtocol {
        fn decode(&self, message: WireMessage) -> Option<CarrierFrame> {
            match message {
                WireMessage::Binary(bytes) => Some(CarrierFrame::Audio(bytes)),
                WireMessage::Text(text) if text == "bye" => Some(CarrierFrame::Close),
                WireMessage::Text(text) => Some(CarrierFrame::Text(text)),
            }
        }

        fn encode(&self, event: &OutputEvent) -> Option<WireMessage> {
            match event {
                OutputEvent::AssistantAudio { bytes, .. } => {
                    Some(WireMessage::Binary(bytes.clone()))
                }
                _ => None,
            }
        }
    }

    #[tokio::test]
    async fn test_output_audio_is_bridged_to_carrier_format() {
        let converter = AudioConverter::new(
            AudioConfig::linear_16khz_mono(),
            AudioConfig::linear_8khz_mono(),
        )
        .unwrap();
        let (session, mut rx) = TransportSession::new(Arc::new(EchoProtocol), None, Some(converter));

        session
            .notify(OutputEvent::AssistantAudio {
                id: "m1".into(),
                bytes: vec![0u8; 640],
            })
            .await
            .unwrap();

        let WireMessage::Binary(bytes) = rx.recv().await.unwrap() else {
            panic!("expected binary frame");
        };
        // 320 samples at 16k downsample to 160 samples at 8k
        assert_eq!(bytes.len(), 320);
    }

    #[tokio::test]
    async fn test_unrepresented_outputs_are_skipped() {
        let (session, mut rx) = TransportSession::new(Arc::new(EchoProtocol), None, None);
        session
            .notify(OutputEvent::AssistantText {
                id: "m1".into(),
                text: "hello".into(),
                completed: true,
            })
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }
}
