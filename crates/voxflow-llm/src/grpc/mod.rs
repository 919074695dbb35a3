//! gRPC assistant executor
//!
//! Bidirectional stream against a remote agent runtime: the first client
//! message is the conversation configuration, subsequent messages are
//! finalized user turns. Server messages carry streamed assistant text,
//! finalized turns and interruptions. Provider metadata headers travel in
//! the outgoing stream context; a custom CA certificate that fails to parse
//! aborts initialization.

mod proto;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::metadata::{AsciiMetadataKey, AsciiMetadataValue};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Endpoint};
use tracing::{debug, error};

use voxflow_core::comm::PacketSender;
use voxflow_core::error::ProviderError;
use voxflow_core::{Communication, InterruptionSource, Packet, ProviderGrpc, Result};

use super::AssistantExecutor;
use proto::agent_talk_client::AgentTalkClient;

const OUTBOUND_BUFFER: usize = 64;

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// gRPC-based assistant executor
pub struct GrpcExecutor {
    comm: Arc<dyn Communication>,
    provider: ProviderGrpc,
    outbound: AsyncMutex<Option<mpsc::Sender<proto::TalkRequest>>>,
    token: CancellationToken,
}

impl GrpcExecutor {
    pub fn new(comm: Arc<dyn Communication>, token: CancellationToken) -> Result<Self> {
        let provider = comm
            .assistant()
            .provider_grpc
            .clone()
            .ok_or_else(|| voxflow_core::Error::config("grpc provider definition is nil"))?;
        Ok(Self {
            comm,
            provider,
            outbound: AsyncMutex::new(None),
            token: token.child_token(),
        })
    }

    async fn connect(&self) -> Result<Channel> {
        let mut endpoint = Endpoint::from_shared(self.provider.url.clone())
            .map_err(|e| ProviderError::Executor(format!("bad grpc url: {e}")))?;
        if !self.provider.certificate.is_empty() {
            let tls = ClientTlsConfig::new()
                .ca_certificate(Certificate::from_pem(self.provider.certificate.clone()));
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|e| voxflow_core::Error::config(format!("failed to parse certificate: {e}")))?;
        }
        endpoint
            .connect()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("grpc dial failed: {e}")).into())
    }

    fn configuration_frame(&self) -> proto::TalkRequest {
        let assistant = self.comm.assistant();
        let conversation = self.comm.conversation();
        let options = assistant
            .options
            .0
            .iter()
            .filter_map(|(k, v)| {
                let value = match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((k.clone(), value))
            })
            .collect();
        proto::TalkRequest {
            request: Some(proto::talk_request::Request::Configuration(
                proto::ConversationConfiguration {
                    conversation_id: conversation.id,
                    assistant: Some(proto::AssistantDefinition {
                        assistant_id: assistant.id,
                        version: assistant.version.clone(),
                    }),
                    args: self.comm.args().clone(),
                    metadata: self.provider.metadata.clone(),
                    options,
                    input_config: None,
                    output_config: None,
                },
            )),
        }
    }

    fn dispatch_response(
        response: proto::TalkResponse,
        sender: &PacketSender,
        fallback_context: &str,
    ) {
        if !response.error.is_empty() {
            error!(code = response.code, error = %response.error, "agent runtime error response");
            return;
        }
        if !response.success {
            return;
        }
        match response.data {
            Some(proto::talk_response::Data::Interruption(intr)) => {
                let source = if intr.source == "vad" {
                    InterruptionSource::Vad
                } else {
                    InterruptionSource::Word
                };
                let _ = sender.try_send(Packet::Interruption {
                    context_id: fallback_context.to_string(),
                    source,
                    start_at: intr.start_at,
                    end_at: intr.end_at,
                });
            }
            Some(proto::talk_response::Data::Assistant(message)) => {
                let context_id = if message.id.is_empty() {
                    fallback_context.to_string()
                } else {
                    message.id.clone()
                };
                if let Some(proto::assistant_message::Content::Text(text)) = message.content {
                    let _ = sender.try_send(Packet::LlmStream {
                        context_id: context_id.clone(),
                        text: text.content.clone(),
                    });
                    if message.completed {
                        let _ = sender.try_send(Packet::LlmMessage {
                            context_id,
                            text: text.content,
                        });
                    }
                }
            }
            None => {}
        }
    }
}

#[async_trait]
impl AssistantExecutor for GrpcExecutor {
    fn name(&self) -> &'static str {
        "grpc"
    }

    async fn initialize(&self, sender: PacketSender) -> Result<()> {
        let channel = self.connect().await?;
        let mut client = AgentTalkClient::new(channel)
            .max_decoding_message_size(usize::MAX)
            .max_encoding_message_size(usize::MAX);

        let (tx, rx) = mpsc::channel::<proto::TalkRequest>(OUTBOUND_BUFFER);

        // Metadata headers from the provider configuration ride on the
        // outgoing stream context
        let mut request = tonic::Request::new(ReceiverStream::new(rx));
        for (key, value) in &self.provider.metadata {
            let key = AsciiMetadataKey::from_str(key)
                .map_err(|e| voxflow_core::Error::config(format!("bad metadata key: {e}")))?;
            let value = AsciiMetadataValue::try_from(value.as_str())
                .map_err(|e| voxflow_core::Error::config(format!("bad metadata value: {e}")))?;
            request.metadata_mut().insert(key, value);
        }

        let response = client
            .talk(request)
            .await
            .map_err(|e| ProviderError::Unavailable(format!("talk stream failed: {e}")))?;
        let mut inbound = response.into_inner();

        let fallback_context = self.comm.conversation().id.to_string();
        let token = self.token.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    message = inbound.message() => {
                        match message {
                            Ok(Some(response)) => {
                                Self::dispatch_response(response, &sender, &fallback_context);
                            }
                            Ok(None) => {
                                debug!("agent runtime stream closed");
                                return;
                            }
                            Err(status) if status.code() == tonic::Code::Cancelled => return,
                            Err(status) => {
                                error!(status = %status, "agent runtime recv failed");
                                return;
                            }
                        }
                    }
                }
            }
        });

        tx.send(self.configuration_frame())
            .await
            .map_err(|_| ProviderError::Executor("configuration send failed".to_string()))?;
        *self.outbound.lock().await = Some(tx);
        Ok(())
    }

    async fn execute(&self, packet: Packet) -> Result<()> {
        match packet {
            Packet::UserText { context_id, text } => {
                let outbound = self.outbound.lock().await;
                let tx = outbound
                    .as_ref()
                    .ok_or_else(|| ProviderError::NotInitialized("grpc executor".to_string()))?;
                tx.send(proto::TalkRequest {
                    request: Some(proto::talk_request::Request::Message(proto::UserMessage {
                        id: context_id,
                        completed: true,
                        time: now_millis(),
                        content: Some(proto::user_message::Content::Text(proto::TextContent {
                            content: text,
                        })),
                    })),
                })
                .await
                .map_err(|_| ProviderError::Executor("stream send failed".to_string()).into())
            }
            // History lives on the remote runtime; scripted text has nothing
            // to push
            Packet::Static { .. } => Ok(()),
            other => Err(ProviderError::Executor(format!(
                "unsupported packet type: {}",
                other.kind()
            ))
            .into()),
        }
    }

    async fn close(&self) -> Result<()> {
        self.token.cancel();
        // Dropping the outbound sender performs CloseSend
        *self.outbound.lock().await = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use voxflow_core::{Assistant, Conversation, Direction, InputMode, Source};

    struct TestComm {
        conversation: Conversation,
        assistant: Assistant,
        args: HashMap<String, String>,
    }

    #[async_trait]
    impl Communication for TestComm {
        fn conversation(&self) -> &Conversation {
            &self.conversation
        }
        fn assistant(&self) -> &Assistant {
            &self.assistant
        }
        fn args(&self) -> &HashMap<String, String> {
            &self.args
        }
    }

    fn comm(certificate: &str) -> Arc<TestComm> {
        let assistant: Assistant = serde_json::from_value(json!({
            "id": 11, "version": "v3", "name": "agent", "executor": "grpc",
            "provider_grpc": {
                "url": "http://agent.internal:50051",
                "certificate": certificate,
                "metadata": {"x-tenant": "acme"}
            }
        }))
        .unwrap();
        Arc::new(TestComm {
            conversation: Conversation::new(
                101,
                11,
                "v3",
                Direction::Outbound,
                Source::Phone,
                InputMode::Audio,
            ),
            assistant,
            args: HashMap::from([("name".to_string(), "Sam".to_string())]),
        })
    }

    #[test]
    fn test_configuration_frame_shape() {
        let exec = GrpcExecutor::new(comm(""), CancellationToken::new()).unwrap();
        let frame = exec.configuration_frame();
        let Some(proto::talk_request::Request::Configuration(cfg)) = frame.request else {
            panic!("expected configuration frame");
        };
        assert_eq!(cfg.conversation_id, 101);
        assert_eq!(cfg.assistant.as_ref().unwrap().assistant_id, 11);
        assert_eq!(cfg.assistant.unwrap().version, "v3");
        assert_eq!(cfg.args.get("name").map(String::as_str), Some("Sam"));
        assert_eq!(cfg.metadata.get("x-tenant").map(String::as_str), Some("acme"));
    }

    #[test]
    fn test_missing_provider_rejected() {
        let assistant: Assistant = serde_json::from_value(json!({
            "id": 11, "version": "v3", "name": "agent", "executor": "grpc"
        }))
        .unwrap();
        let comm = Arc::new(TestComm {
            conversation: Conversation::new(
                1,
                11,
                "v3",
                Direction::Inbound,
                Source::Sdk,
                InputMode::Text,
            ),
            assistant,
            args: HashMap::new(),
        });
        assert!(GrpcExecutor::new(comm, CancellationToken::new()).is_err());
    }

    #[tokio::test]
    async fn test_streamed_and_final_text_dispatch() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        GrpcExecutor::dispatch_response(
            proto::TalkResponse {
                success: true,
                code: 0,
                error: String::new(),
                data: Some(proto::talk_response::Data::Assistant(
                    proto::AssistantMessage {
                        id: "m3".into(),
                        completed: true,
                        content: Some(proto::assistant_message::Content::Text(
                            proto::TextContent {
                                content: "done".into(),
                            },
                        )),
                    },
                )),
            },
            &tx,
            "101",
        );
        assert!(matches!(
            rx.recv().await.unwrap(),
            Packet::LlmStream { ref context_id, .. } if context_id == "m3"
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            Packet::LlmMessage { ref text, .. } if text == "done"
        ));
    }

    #[tokio::test]
    async fn test_error_response_produces_no_packet() {
        let (tx, mut rx) = tokio::sync::mpsc::channel(8);
        GrpcExecutor::dispatch_response(
            proto::TalkResponse {
                success: false,
                code: 13,
                error: "upstream broke".into(),
                data: None,
            },
            &tx,
            "101",
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_execute_before_initialize_fails() {
        let exec = GrpcExecutor::new(comm(""), CancellationToken::new()).unwrap();
        assert!(exec
            .execute(Packet::UserText {
                context_id: "m1".into(),
                text: "hello".into(),
            })
            .await
            .is_err());
    }
}
