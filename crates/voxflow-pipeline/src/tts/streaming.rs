//! WebSocket streaming text-to-speech provider
//!
//! Text chunks stream up as `Speak` control messages; synthesized audio comes
//! down as binary frames tagged with the active context. A context switch
//! preempts the previous synthesis with a provider-native `Clear`; a
//! completed turn is flushed and acknowledged by a `Flushed` event.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use voxflow_core::error::ProviderError;
use voxflow_core::{AudioConfig, Options, Result};

use super::{SpeakOptions, TextToSpeech, TtsCallbacks, TtsOptions};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Control envelope from the provider
#[derive(Debug, Deserialize)]
struct SpeakEvent {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// Streaming WebSocket TTS provider
pub struct StreamingTts {
    endpoint: String,
    key: String,
    options: TtsOptions,
    callbacks: TtsCallbacks,
    writer: Arc<Mutex<Option<WsSink>>>,
    /// The context currently being synthesized; shared with the reader task
    /// so audio frames are attributed to the right turn
    context: Arc<SyncMutex<String>>,
    token: CancellationToken,
}

impl StreamingTts {
    pub fn new(
        endpoint: impl Into<String>,
        key: impl Into<String>,
        audio: AudioConfig,
        options: &Options,
        callbacks: TtsCallbacks,
        token: CancellationToken,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
            options: TtsOptions::resolve(&audio, options),
            callbacks,
            writer: Arc::new(Mutex::new(None)),
            context: Arc::new(SyncMutex::new(String::new())),
            token: token.child_token(),
        }
    }

    fn connection_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ProviderError::TextToSpeech(format!("bad endpoint: {e}")))?;
        url.query_pairs_mut()
            .append_pair("model", &self.options.voice)
            .append_pair("encoding", &self.options.encoding)
            .append_pair("sample_rate", &self.options.sample_rate.to_string());
        Ok(url)
    }

    async fn reader_loop(
        mut source: WsSource,
        callbacks: TtsCallbacks,
        context: Arc<SyncMutex<String>>,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                frame = source.next() => {
                    let Some(frame) = frame else { return };
                    match frame {
                        Ok(Message::Binary(audio)) => {
                            let ctx = context.lock().clone();
                            (callbacks.on_speech)(ctx, audio);
                        }
                        Ok(Message::Text(text)) => {
                            Self::handle_event(&text, &callbacks, &context);
                        }
                        Ok(Message::Close(_)) => {
                            debug!("tts upstream closed");
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "tts upstream read failed");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle_event(text: &str, callbacks: &TtsCallbacks, context: &SyncMutex<String>) {
        let event: SpeakEvent = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(_) => return,
        };
        match event.event_type.as_str() {
            "Flushed" => {
                let ctx = context.lock().clone();
                (callbacks.on_complete)(ctx);
            }
            "Warning" => {
                warn!(code = %event.code, message = %event.message, "tts warning");
            }
            // Metadata and Cleared carry nothing actionable
            _ => {}
        }
    }

    async fn send_control(&self, value: serde_json::Value) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| ProviderError::NotInitialized("tts".to_string()))?;
        sink.send(Message::Text(value.to_string()))
            .await
            .map_err(|e| ProviderError::TextToSpeech(format!("stream write: {e}")).into())
    }
}

#[async_trait::async_trait]
impl TextToSpeech for StreamingTts {
    fn name(&self) -> &'static str {
        "streaming-text-to-speech"
    }

    async fn initialize(&self) -> Result<()> {
        let url = self.connection_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ProviderError::TextToSpeech(e.to_string()))?;
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            http::HeaderValue::from_str(&format!("token {}", self.key))
                .map_err(|e| ProviderError::TextToSpeech(e.to_string()))?,
        );

        let (socket, _) = tokio::time::timeout(
            std::time::Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
            connect_async(request),
        )
        .await
        .map_err(|_| ProviderError::HandshakeTimeout(HANDSHAKE_TIMEOUT_SECS))?
        .map_err(|e| ProviderError::Unavailable(format!("tts dial failed: {e}")))?;
        let (sink, source) = socket.split();
        *self.writer.lock().await = Some(sink);

        let callbacks = self.callbacks.clone();
        let context = Arc::clone(&self.context);
        let token = self.token.clone();
        tokio::spawn(async move {
            Self::reader_loop(source, callbacks, context, token).await;
        });
        debug!("tts connection established");
        Ok(())
    }

    async fn transform(&self, text: &str, opts: &SpeakOptions) -> Result<()> {
        // A new turn preempts whatever is still being synthesized
        let preempted = {
            let mut ctx = self.context.lock();
            let switched = !ctx.is_empty() && *ctx != opts.context_id;
            *ctx = opts.context_id.clone();
            switched
        };
        if preempted {
            self.send_control(json!({"type": "Clear"})).await?;
        }

        if opts.is_complete {
            return self.send_control(json!({"type": "Flush"})).await;
        }
        self.send_control(json!({"type": "Speak", "text": text}))
            .await
    }

    async fn close(&self) -> Result<()> {
        self.token.cancel();
        let mut writer = self.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            let _ = sink
                .send(Message::Text(json!({"type": "Close"}).to_string()))
                .await;
            let _ = sink.send(Message::Close(None)).await;
        }
        Ok(())
    }
}
