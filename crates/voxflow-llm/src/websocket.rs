//! WebSocket assistant executor
//!
//! JSON envelopes: client→server `{type, timestamp, data}`, server→client
//! `{type, success, data, error?}`. Types: configuration, user_message,
//! assistant_message, stream, interruption, error, ping, pong.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use url::Url;

use voxflow_core::comm::PacketSender;
use voxflow_core::error::ProviderError;
use voxflow_core::{
    Communication, InterruptionSource, Metric, Packet, ProviderWebsocket, Result,
};

use super::AssistantExecutor;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Client→server envelope
#[derive(Debug, Serialize)]
struct WsRequest<T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

/// Server→client envelope
#[derive(Debug, Deserialize)]
struct WsResponse {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Option<Box<RawValue>>,
    #[serde(default)]
    error: Option<WsError>,
}

#[derive(Debug, Deserialize)]
struct WsError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    details: String,
}

#[derive(Debug, Deserialize)]
struct StreamData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct AssistantMessageData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    message: Option<AssistantMessageContent>,
    #[serde(default)]
    metrics: Vec<WsMetric>,
}

#[derive(Debug, Deserialize)]
struct AssistantMessageContent {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct WsMetric {
    name: String,
    value: f64,
    #[serde(default)]
    unit: String,
}

#[derive(Debug, Deserialize)]
struct InterruptionData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    start_at: f64,
    #[serde(default)]
    end_at: f64,
}

#[derive(Debug, Clone, Serialize)]
struct HistoryEntry {
    role: String,
    content: String,
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// WebSocket-based assistant executor
pub struct WebsocketExecutor {
    comm: Arc<dyn Communication>,
    provider: ProviderWebsocket,
    history: Arc<RwLock<Vec<HistoryEntry>>>,
    writer: Arc<AsyncMutex<Option<WsSink>>>,
    request_times: Arc<Mutex<HashMap<String, Instant>>>,
    token: CancellationToken,
}

impl WebsocketExecutor {
    pub fn new(comm: Arc<dyn Communication>, token: CancellationToken) -> Result<Self> {
        let provider = comm
            .assistant()
            .provider_websocket
            .clone()
            .ok_or_else(|| voxflow_core::Error::config("websocket provider definition is nil"))?;
        Ok(Self {
            comm,
            provider,
            history: Arc::new(RwLock::new(Vec::new())),
            writer: Arc::new(AsyncMutex::new(None)),
            request_times: Arc::new(Mutex::new(HashMap::new())),
            token: token.child_token(),
        })
    }

    fn connection_request(&self) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut url = Url::parse(&self.provider.url)
            .map_err(|e| ProviderError::Executor(format!("bad websocket url: {e}")))?;
        {
            let mut q = url.query_pairs_mut();
            for (key, value) in &self.provider.parameters {
                q.append_pair(key, value);
            }
        }
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ProviderError::Executor(e.to_string()))?;
        for (key, value) in &self.provider.headers {
            let name = http::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| ProviderError::Executor(e.to_string()))?;
            let value = http::HeaderValue::from_str(value)
                .map_err(|e| ProviderError::Executor(e.to_string()))?;
            request.headers_mut().insert(name, value);
        }
        Ok(request)
    }

    async fn send_envelope<T: Serialize>(&self, kind: &'static str, data: Option<T>) -> Result<()> {
        let payload = serde_json::to_string(&WsRequest {
            kind,
            timestamp: now_millis(),
            data,
        })?;
        let mut writer = self.writer.lock().await;
        let sink = writer
            .as_mut()
            .ok_or_else(|| ProviderError::NotInitialized("websocket executor".to_string()))?;
        debug!(kind, "sending executor envelope");
        sink.send(Message::Text(payload))
            .await
            .map_err(|e| ProviderError::Executor(format!("write failed: {e}")).into())
    }

    async fn send_configuration(&self) -> Result<()> {
        let assistant = self.comm.assistant();
        let conversation = self.comm.conversation();
        let history_len = self.history.read().len();
        self.send_envelope(
            "configuration",
            Some(json!({
                "assistant_id": assistant.id,
                "conversation_id": conversation.id,
                "assistant": {
                    "assistant_id": assistant.id,
                    "name": assistant.name,
                },
                "args": self.comm.args(),
                "options": assistant.options,
                "metadata": { "history_length": history_len },
            })),
        )
        .await
    }

    fn fallback_context(&self) -> String {
        self.comm.conversation().id.to_string()
    }

    fn process_response(&self, response: WsResponse, sender: &PacketSender) {
        if let Some(err) = &response.error {
            error!(code = err.code, message = %err.message, details = %err.details, "executor error response");
            return;
        }
        let data = response.data.as_ref().map(|d| d.get()).unwrap_or("null");

        match response.kind.as_str() {
            "stream" => {
                let Ok(stream) = serde_json::from_str::<StreamData>(data) else {
                    warn!("malformed stream data");
                    return;
                };
                let context_id = if stream.id.is_empty() {
                    self.fallback_context()
                } else {
                    stream.id
                };
                let _ = sender.try_send(Packet::LlmStream {
                    context_id,
                    text: stream.content,
                });
            }
            "assistant_message" => {
                let Ok(msg) = serde_json::from_str::<AssistantMessageData>(data) else {
                    warn!("malformed assistant message data");
                    return;
                };
                let context_id = if msg.id.is_empty() {
                    self.fallback_context()
                } else {
                    msg.id.clone()
                };
                if let Some(content) = &msg.message {
                    if content.kind == "text" && !content.content.is_empty() {
                        self.history.write().push(HistoryEntry {
                            role: "assistant".to_string(),
                            content: content.content.clone(),
                        });
                        let _ = sender.try_send(Packet::LlmMessage {
                            context_id: context_id.clone(),
                            text: content.content.clone(),
                        });
                    }
                }

                let mut metrics = Vec::new();
                if let Some(start) = self.request_times.lock().remove(&context_id) {
                    metrics.push(Metric::time_taken(start.elapsed()));
                }
                for m in &msg.metrics {
                    metrics.push(
                        Metric::new(m.name.clone(), format!("{}", m.value))
                            .with_description(m.unit.clone()),
                    );
                }
                if !metrics.is_empty() {
                    let _ = sender.try_send(Packet::Metric {
                        context_id,
                        metrics,
                    });
                }
            }
            "interruption" => {
                let Ok(data) = serde_json::from_str::<InterruptionData>(data) else {
                    warn!("malformed interruption data");
                    return;
                };
                let context_id = if data.id.is_empty() {
                    self.fallback_context()
                } else {
                    data.id
                };
                let source = if data.source == "vad" {
                    InterruptionSource::Vad
                } else {
                    InterruptionSource::Word
                };
                let _ = sender.try_send(Packet::Interruption {
                    context_id,
                    source,
                    start_at: data.start_at,
                    end_at: data.end_at,
                });
            }
            "error" => {
                error!(data, "executor reported error");
            }
            "ping" => {
                // Reply out of band so the reader task is never blocked on a
                // write
                let writer = Arc::clone(&self.writer);
                tokio::spawn(async move {
                    let payload = serde_json::to_string(&WsRequest::<()> {
                        kind: "pong",
                        timestamp: now_millis(),
                        data: None,
                    })
                    .unwrap_or_default();
                    let mut writer = writer.lock().await;
                    if let Some(sink) = writer.as_mut() {
                        let _ = sink.send(Message::Text(payload)).await;
                    }
                });
            }
            "pong" => debug!("received pong"),
            other => warn!(kind = other, "unknown executor message type"),
        }
    }
}

#[async_trait]
impl AssistantExecutor for WebsocketExecutor {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn initialize(&self, sender: PacketSender) -> Result<()> {
        // Seed history from prior turns while the dial is in flight
        {
            let mut history = self.history.write();
            for (role, content) in self.comm.conversation_logs() {
                history.push(HistoryEntry { role, content });
            }
        }

        let request = self.connection_request()?;
        let (socket, _) = tokio::time::timeout(
            std::time::Duration::from_secs(HANDSHAKE_TIMEOUT_SECS),
            connect_async(request),
        )
        .await
        .map_err(|_| ProviderError::HandshakeTimeout(HANDSHAKE_TIMEOUT_SECS))?
        .map_err(|e| ProviderError::Unavailable(format!("websocket dial failed: {e}")))?;

        let (sink, mut source) = socket.split();
        *self.writer.lock().await = Some(sink);

        let this = self.clone_for_reader();
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    frame = source.next() => {
                        let Some(frame) = frame else { return };
                        match frame {
                            Ok(Message::Text(text)) => {
                                match serde_json::from_str::<WsResponse>(&text) {
                                    Ok(response) => this.process_response(response, &sender),
                                    Err(e) => error!(error = %e, "failed to parse executor response"),
                                }
                            }
                            Ok(Message::Close(_)) => {
                                debug!("executor websocket closed");
                                return;
                            }
                            Ok(_) => {}
                            Err(e) => {
                                error!(error = %e, "executor websocket read failed");
                                return;
                            }
                        }
                    }
                }
            }
        });

        self.send_configuration().await
    }

    async fn execute(&self, packet: Packet) -> Result<()> {
        match packet {
            Packet::UserText { context_id, text } => {
                self.request_times
                    .lock()
                    .insert(context_id.clone(), Instant::now());
                self.history.write().push(HistoryEntry {
                    role: "user".to_string(),
                    content: text.clone(),
                });
                self.send_envelope(
                    "user_message",
                    Some(json!({
                        "id": context_id,
                        "content": text,
                        "completed": true,
                        "timestamp": now_millis(),
                    })),
                )
                .await
            }
            Packet::Static { text, .. } => {
                // Scripted agent text only joins the history
                self.history.write().push(HistoryEntry {
                    role: "assistant".to_string(),
                    content: text,
                });
                Ok(())
            }
            other => Err(ProviderError::Executor(format!(
                "unsupported packet type: {}",
                other.kind()
            ))
            .into()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.token.cancel();
        let mut writer = self.writer.lock().await;
        if let Some(mut sink) = writer.take() {
            let _ = sink.send(Message::Close(None)).await;
        }
        self.history.write().clear();
        Ok(())
    }
}

impl WebsocketExecutor {
    /// A cheap handle for the reader task sharing the same state
    fn clone_for_reader(&self) -> Self {
        Self {
            comm: Arc::clone(&self.comm),
            provider: self.provider.clone(),
            history: Arc::clone(&self.history),
            writer: Arc::clone(&self.writer),
            request_times: Arc::clone(&self.request_times),
            token: self.token.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap as Map;
    use voxflow_core::{Assistant, Conversation, Direction, InputMode, Source};

    struct TestComm {
        conversation: Conversation,
        assistant: Assistant,
        args: Map<String, String>,
    }

    #[async_trait]
    impl Communication for TestComm {
        fn conversation(&self) -> &Conversation {
            &self.conversation
        }
        fn assistant(&self) -> &Assistant {
            &self.assistant
        }
        fn args(&self) -> &Map<String, String> {
            &self.args
        }
        fn conversation_logs(&self) -> Vec<(String, String)> {
            vec![("user".into(), "earlier question".into())]
        }
    }

    fn executor() -> WebsocketExecutor {
        let assistant: Assistant = serde_json::from_value(json!({
            "id": 5, "version": "v2", "name": "support", "executor": "websocket",
            "provider_websocket": {
                "url": "wss://agent.example.com/talk",
                "headers": {"x-api-key": "k"},
                "parameters": {"tenant": "acme"}
            }
        }))
        .unwrap();
        let comm = Arc::new(TestComm {
            conversation: Conversation::new(
                77,
                5,
                "v2",
                Direction::Inbound,
                Source::WebPlugin,
                InputMode::Both,
            ),
            assistant,
            args: Map::new(),
        });
        WebsocketExecutor::new(comm, CancellationToken::new()).unwrap()
    }

    #[test]
    fn test_connection_request_carries_params_and_headers() {
        let exec = executor();
        let request = exec.connection_request().unwrap();
        assert!(request.uri().query().unwrap().contains("tenant=acme"));
        assert_eq!(request.headers().get("x-api-key").unwrap(), "k");
    }

    #[test]
    fn test_missing_provider_definition_rejected() {
        let assistant: Assistant = serde_json::from_value(json!({
            "id": 5, "version": "v2", "name": "support", "executor": "websocket"
        }))
        .unwrap();
        let comm = Arc::new(TestComm {
            conversation: Conversation::new(
                1,
                5,
                "v2",
                Direction::Inbound,
                Source::WebPlugin,
                InputMode::Text,
            ),
            assistant,
            args: Map::new(),
        });
        assert!(WebsocketExecutor::new(comm, CancellationToken::new()).is_err());
    }

    #[tokio::test]
    async fn test_stream_response_becomes_packet() {
        let exec = executor();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let response: WsResponse = serde_json::from_value(json!({
            "type": "stream", "success": true,
            "data": {"id": "m7", "content": "partial text"}
        }))
        .unwrap();
        exec.process_response(response, &tx);
        match rx.recv().await.unwrap() {
            Packet::LlmStream { context_id, text } => {
                assert_eq!(context_id, "m7");
                assert_eq!(text, "partial text");
            }
            other => panic!("unexpected packet {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_assistant_message_appends_history_and_metrics() {
        let exec = executor();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        exec.request_times
            .lock()
            .insert("m9".to_string(), Instant::now());

        let response: WsResponse = serde_json::from_value(json!({
            "type": "assistant_message", "success": true,
            "data": {
                "id": "m9",
                "message": {"type": "text", "content": "final answer"},
                "metrics": [{"name": "tokens", "value": 42.0, "unit": "count"}]
            }
        }))
        .unwrap();
        exec.process_response(response, &tx);

        match rx.recv().await.unwrap() {
            Packet::LlmMessage { context_id, text } => {
                assert_eq!(context_id, "m9");
                assert_eq!(text, "final answer");
            }
            other => panic!("unexpected packet {}", other.kind()),
        }
        match rx.recv().await.unwrap() {
            Packet::Metric { metrics, .. } => {
                assert!(metrics.iter().any(|m| m.name == "time_taken"));
                assert!(metrics.iter().any(|m| m.name == "tokens"));
            }
            other => panic!("unexpected packet {}", other.kind()),
        }
        assert_eq!(exec.history.read().len(), 1);
    }

    #[tokio::test]
    async fn test_vad_interruption_mapped() {
        let exec = executor();
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        let response: WsResponse = serde_json::from_value(json!({
            "type": "interruption", "success": true,
            "data": {"source": "vad", "start_at": 1.2, "end_at": 1.4}
        }))
        .unwrap();
        exec.process_response(response, &tx);
        match rx.recv().await.unwrap() {
            Packet::Interruption {
                context_id,
                source,
                start_at,
                ..
            } => {
                // Falls back to the conversation id when unset
                assert_eq!(context_id, "77");
                assert_eq!(source, InterruptionSource::Vad);
                assert!((start_at - 1.2).abs() < f64::EPSILON);
            }
            other => panic!("unexpected packet {}", other.kind()),
        }
    }

    #[tokio::test]
    async fn test_execute_before_initialize_fails() {
        let exec = executor();
        let result = exec
            .execute(Packet::UserText {
                context_id: "m1".into(),
                text: "hi".into(),
            })
            .await;
        assert!(result.is_err());
        // History still records the attempt
        assert_eq!(exec.history.read().len(), 1);
    }

    #[tokio::test]
    async fn test_static_packet_joins_history_only() {
        let exec = executor();
        exec.execute(Packet::Static {
            context_id: "m2".into(),
            text: "Hi Sam!".into(),
        })
        .await
        .unwrap();
        let history = exec.history.read();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "assistant");
    }
}
