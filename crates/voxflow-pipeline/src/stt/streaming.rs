//! WebSocket streaming speech-to-text provider
//!
//! Binary audio frames go up; JSON transcript events come down and are
//! forwarded through the transcript callback. Writes are serialized under a
//! single writer lock; the reader task exclusively owns the read half.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
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

use super::{SpeechToText, SttOptions, Transcript, TranscriptCallback};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Transcript envelope from the provider
#[derive(Debug, Deserialize)]
struct ListenEvent {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    is_final: bool,
    #[serde(default)]
    channel: Option<ListenChannel>,
}

#[derive(Debug, Deserialize)]
struct ListenChannel {
    #[serde(default)]
    alternatives: Vec<ListenAlternative>,
}

#[derive(Debug, Deserialize)]
struct ListenAlternative {
    #[serde(default)]
    transcript: String,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    languages: Vec<String>,
}

/// Streaming WebSocket STT provider
pub struct StreamingStt {
    endpoint: String,
    key: String,
    options: SttOptions,
    on_transcript: TranscriptCallback,
    writer: Arc<Mutex<Option<WsSink>>>,
    token: CancellationToken,
}

impl StreamingStt {
    pub fn new(
        endpoint: impl Into<String>,
        key: impl Into<String>,
        audio: AudioConfig,
        options: &Options,
        on_transcript: TranscriptCallback,
        token: CancellationToken,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            key: key.into(),
            options: SttOptions::resolve(&audio, options),
            on_transcript,
            writer: Arc::new(Mutex::new(None)),
            token: token.child_token(),
        }
    }

    /// Build the connection URL with the resolved listen options as query
    /// parameters
    fn connection_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ProviderError::SpeechToText(format!("bad endpoint: {e}")))?;
        {
            let o = &self.options;
            let mut q = url.query_pairs_mut();
            q.append_pair("model", &o.model);
            q.append_pair("language", &o.language);
            q.append_pair("encoding", &o.encoding);
            q.append_pair("sample_rate", &o.sample_rate.to_string());
            q.append_pair("channels", &o.channels.to_string());
            q.append_pair("smart_format", &o.smart_format.to_string());
            q.append_pair("interim_results", &o.interim_results.to_string());
            q.append_pair("filler_words", &o.filler_words.to_string());
            q.append_pair("vad_events", &o.vad_events.to_string());
            q.append_pair("endpointing", &o.endpointing);
            q.append_pair("punctuate", &o.punctuate.to_string());
            q.append_pair("no_delay", &o.no_delay.to_string());
            q.append_pair("multichannel", &o.multichannel.to_string());
            if let Some(ms) = &o.utterance_end_ms {
                q.append_pair("utterance_end_ms", ms);
            }
            let keyword_param = if o.model == "nova-3" {
                "keyterm"
            } else {
                "keywords"
            };
            for kw in &o.keywords {
                q.append_pair(keyword_param, kw);
            }
        }
        Ok(url)
    }

    async fn reader_loop(
        mut source: WsSource,
        on_transcript: TranscriptCallback,
        token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = token.cancelled() => return,
                frame = source.next() => {
                    let Some(frame) = frame else { return };
                    match frame {
                        Ok(Message::Text(text)) => {
                            Self::handle_event(&text, &on_transcript);
                        }
                        Ok(Message::Close(_)) => {
                            debug!("stt upstream closed");
                            return;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "stt upstream read failed");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle_event(text: &str, on_transcript: &TranscriptCallback) {
        let event: ListenEvent = match serde_json::from_str(text) {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "malformed stt event, skipping");
                return;
            }
        };
        if event.event_type != "Results" {
            return;
        }
        let Some(channel) = event.channel else { return };
        for alt in channel.alternatives {
            if alt.transcript.is_empty() {
                continue;
            }
            (on_transcript)(Transcript {
                text: alt.transcript,
                confidence: alt.confidence,
                language: most_used_language(&alt.languages),
                is_final: event.is_final,
            });
            break;
        }
    }
}

/// Majority vote over the per-word language tags, defaulting to English
fn most_used_language(languages: &[String]) -> String {
    if languages.is_empty() {
        return "en".to_string();
    }
    let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for lang in languages {
        *counts.entry(lang.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map(|(lang, _)| lang.to_string())
        .unwrap_or_else(|| "en".to_string())
}

#[async_trait::async_trait]
impl SpeechToText for StreamingStt {
    fn name(&self) -> &'static str {
        "streaming-speech-to-text"
    }

    async fn initialize(&self) -> Result<()> {
        let url = self.connection_url()?;
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ProviderError::SpeechToText(e.to_string()))?;
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            http::HeaderValue::from_str(&format!("token {}", self.key))
                .map_err(|e| ProviderError::SpeechToText(e.to_string()))?,
        );

        let (socket, _) = tokio::time::timeout(
            std::time::Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
            connect_async(request),
        )
        .await
        .map_err(|_| ProviderError::HandshakeTimeout(HANDSHAKE_TIMEOUT_SECS))?
        .map_err(|e| ProviderError::Unavailable(format!("stt dial failed: {e}")))?;
        let (sink, source) = socket.split();
        *self.writer.lock().await = Some(sink);

        let on_transcript = Arc::clone(&self.on_transcript);
        let token = self.token.clone();
        tokio::spawn(async move {
            Self::reader_loop(source, on_transcript, token).await;
        });
        debug!("stt connection established");
        Ok(())
    }

    async fn transform(&self, audio: &[u8]) -> Result<()> {
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| ProviderError::NotInitialized("stt".to_string()))?;
        sink.send(Message::Binary(audio.to_vec()))
            .await
            .map_err(|e| ProviderError::SpeechToText(format!("stream write: {e}")).into())
    }

    async fn close(&self) -> Result<()> {
        self.token.cancel();
        let mut writer = self.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            let _ = sink
                .send(Message::Text("{\"type\":\"CloseStream\"}".to_string()))
                .await;
            let _ = sink.send(Message::Close(None)).await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider(options: Options) -> (StreamingStt, tokio::sync::mpsc::UnboundedReceiver<Transcript>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let callback: TranscriptCallback = Arc::new(move |t| {
            let _ = tx.send(t);
        });
        (
            StreamingStt::new(
                "wss://listen.example.com/v1/listen",
                "key",
                AudioConfig::mulaw_8khz_mono(),
                &options,
                callback,
                CancellationToken::new(),
            ),
            rx,
        )
    }

    #[test]
    fn test_connection_url_carries_options() {
        let (stt, _rx) = provider(
            Options::new()
                .with("listen.model", json!("nova-3"))
                .with("listen.keyword", json!("[alpha beta]")),
        );
        let url = stt.connection_url().unwrap();
        let query = url.query().unwrap();
        assert!(query.contains("model=nova-3"));
        assert!(query.contains("encoding=mulaw"));
        assert!(query.contains("sample_rate=8000"));
        // nova-3 keywords travel as keyterm
        assert!(query.contains("keyterm=alpha"));
        assert!(query.contains("keyterm=beta"));
    }

    #[test]
    fn test_result_event_dispatched() {
        let (_stt, mut rx) = provider(Options::new());
        let (tx, mut rx2) = tokio::sync::mpsc::unbounded_channel();
        let callback: TranscriptCallback = Arc::new(move |t| {
            let _ = tx.send(t);
        });
        let event = json!({
            "type": "Results",
            "is_final": true,
            "channel": {"alternatives": [
                {"transcript": "hello there", "confidence": 0.97, "languages": ["en", "en"]}
            ]}
        })
        .to_string();
        StreamingStt::handle_event(&event, &callback);
        let t = rx2.try_recv().unwrap();
        assert_eq!(t.text, "hello there");
        assert!(t.is_final);
        assert_eq!(t.language, "en");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_non_result_and_malformed_events_skipped() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let callback: TranscriptCallback = Arc::new(move |t| {
            let _ = tx.send(t);
        });
        StreamingStt::handle_event("{\"type\":\"Metadata\"}", &callback);
        StreamingStt::handle_event("not json at all", &callback);
        StreamingStt::handle_event(
            "{\"type\":\"Results\",\"channel\":{\"alternatives\":[{\"transcript\":\"\"}]}}",
            &callback,
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_most_used_language() {
        assert_eq!(most_used_language(&[]), "en");
        let langs: Vec<String> = ["hi", "en", "hi"].iter().map(|s| s.to_string()).collect();
        assert_eq!(most_used_language(&langs), "hi");
    }

    #[tokio::test]
    async fn test_transform_before_initialize_fails() {
        let (stt, _rx) = provider(Options::new());
        assert!(stt.transform(&[0u8; 160]).await.is_err());
    }
}
