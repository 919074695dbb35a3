//! Request/response assistant executor
//!
//! Drives a chat-completion endpoint one request per turn and owns the tool
//! loop: when the model returns tool calls they are executed in parallel by
//! the tool executor, each result is appended to the history under the
//! model's own `tool_call_id`, and the model is re-invoked until it produces
//! text or the round limit is hit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, error, warn};

use voxflow_core::comm::PacketSender;
use voxflow_core::error::ProviderError;
use voxflow_core::tool::ToolCall;
use voxflow_core::{Communication, Metric, Packet, Result};
use voxflow_tools::ToolExecutor;

use super::AssistantExecutor;

const MAX_TOOL_ROUNDS: usize = 5;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ChatMessage {
    fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Chat-completion executor with local tool dispatch
pub struct CompletionExecutor {
    comm: Arc<dyn Communication>,
    tools: Arc<ToolExecutor>,
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
    history: RwLock<Vec<ChatMessage>>,
    sender: AsyncMutex<Option<PacketSender>>,
}

impl CompletionExecutor {
    pub fn new(
        comm: Arc<dyn Communication>,
        tools: Arc<ToolExecutor>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| voxflow_core::Error::config(format!("completion client: {e}")))?;
        Ok(Self {
            comm,
            tools,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
            history: RwLock::new(Vec::new()),
            sender: AsyncMutex::new(None),
        })
    }

    fn tool_schemas(&self) -> Option<Vec<serde_json::Value>> {
        let definitions = self.tools.function_definitions();
        if definitions.is_empty() {
            return None;
        }
        Some(
            definitions
                .iter()
                .map(|def| {
                    serde_json::json!({
                        "type": "function",
                        "function": def,
                    })
                })
                .collect(),
        )
    }

    async fn request_completion(&self) -> Result<ChatResponse> {
        let messages = self.history.read().clone();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: &messages,
                tools: self.tool_schemas(),
            })
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("completion request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::Executor(format!("completion read failed: {e}")))?;
        if !status.is_success() {
            return Err(ProviderError::Executor(format!(
                "completion endpoint returned status {}: {}",
                status.as_u16(),
                body
            ))
            .into());
        }
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::Protocol(format!("completion parse failed: {e}")).into())
    }

    /// Run one model turn, looping through tool rounds until text arrives
    async fn run_turn(&self, context_id: &str, sender: &PacketSender) -> Result<()> {
        let start = Instant::now();
        let mut usage_metrics: Vec<Metric> = Vec::new();

        for round in 0..MAX_TOOL_ROUNDS {
            let response = self.request_completion().await?;
            if let Some(usage) = &response.usage {
                usage_metrics = vec![
                    Metric::new("prompt_tokens", usage.prompt_tokens.to_string()),
                    Metric::new("completion_tokens", usage.completion_tokens.to_string()),
                ];
            }
            let Some(choice) = response.choices.into_iter().next() else {
                return Err(ProviderError::Protocol("completion returned no choices".into()).into());
            };
            let message = choice.message;

            if let Some(wire_calls) = message.tool_calls.clone().filter(|c| !c.is_empty()) {
                debug!(round, calls = wire_calls.len(), "model requested tools");
                self.history.write().push(message);

                let calls: Vec<ToolCall> = wire_calls
                    .iter()
                    .map(|w| ToolCall {
                        id: w.id.clone(),
                        function: voxflow_core::tool::FunctionCall {
                            name: w.function.name.clone(),
                            arguments: w.function.arguments.clone(),
                        },
                    })
                    .collect();

                let results = self
                    .tools
                    .execute_all(context_id, &calls, self.comm.as_ref())
                    .await;

                for (call, result) in calls.iter().zip(results) {
                    // Action notification toward the transport, result toward
                    // the model
                    let action = self
                        .tools
                        .get(&call.function.name)
                        .and_then(|caller| caller.action());
                    if let Some(action) = action {
                        let _ = sender.try_send(Packet::LlmTool {
                            context_id: context_id.to_string(),
                            action,
                            name: Some(call.function.name.clone()),
                            result: Some(result.content.clone()),
                        });
                    }
                    self.history.write().push(ChatMessage {
                        role: "tool".to_string(),
                        content: Some(result.content.to_string()),
                        tool_calls: None,
                        tool_call_id: Some(result.tool_call_id),
                    });
                }
                continue;
            }

            let text = message.content.clone().unwrap_or_default();
            self.history.write().push(ChatMessage::text("assistant", &text));
            let _ = sender.try_send(Packet::LlmStream {
                context_id: context_id.to_string(),
                text: text.clone(),
            });
            let _ = sender.try_send(Packet::LlmMessage {
                context_id: context_id.to_string(),
                text,
            });

            let mut metrics = vec![Metric::time_taken(start.elapsed())];
            metrics.append(&mut usage_metrics);
            let _ = sender.try_send(Packet::Metric {
                context_id: context_id.to_string(),
                metrics,
            });
            return Ok(());
        }

        warn!(context_id, "tool round limit reached without final text");
        Err(ProviderError::Executor("tool round limit exceeded".into()).into())
    }
}

#[async_trait]
impl AssistantExecutor for CompletionExecutor {
    fn name(&self) -> &'static str {
        "completion"
    }

    async fn initialize(&self, sender: PacketSender) -> Result<()> {
        {
            let mut history = self.history.write();
            for (role, content) in self.comm.conversation_logs() {
                history.push(ChatMessage::text(&role, content));
            }
        }
        *self.sender.lock().await = Some(sender);
        Ok(())
    }

    async fn execute(&self, packet: Packet) -> Result<()> {
        match packet {
            Packet::UserText { context_id, text } => {
                let sender = {
                    let guard = self.sender.lock().await;
                    guard.clone().ok_or_else(|| {
                        ProviderError::NotInitialized("completion executor".to_string())
                    })?
                };
                self.history.write().push(ChatMessage::text("user", text));
                if let Err(e) = self.run_turn(&context_id, &sender).await {
                    error!(error = %e, "completion turn failed");
                    return Err(e);
                }
                Ok(())
            }
            Packet::Static { text, .. } => {
                self.history
                    .write()
                    .push(ChatMessage::text("assistant", text));
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
        self.history.write().clear();
        *self.sender.lock().await = None;
        Ok(())
    }
}
