//! Local tool callers registered from assistant configuration

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, error};

use voxflow_core::packet::Action;
use voxflow_core::tool::FunctionDefinition;
use voxflow_core::{AssistantTool, Communication, Result};

use crate::caller::{definition_from_fields, failure_result, success_result, ToolCaller};

const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
const DEFAULT_TOP_K: u32 = 5;

/// Knowledge retrieval against the conversation's vault
pub struct KnowledgeRetrievalCaller {
    tool: AssistantTool,
}

impl KnowledgeRetrievalCaller {
    pub fn new(tool: AssistantTool) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl ToolCaller for KnowledgeRetrievalCaller {
    fn id(&self) -> u64 {
        self.tool.id
    }

    fn name(&self) -> &str {
        &self.tool.name
    }

    fn execution_method(&self) -> &str {
        "knowledge_retrieval"
    }

    fn action(&self) -> Option<Action> {
        Some(Action::KnowledgeRetrieval)
    }

    fn definition(&self) -> Result<FunctionDefinition> {
        definition_from_fields(
            &self.tool.name,
            self.tool.description.as_deref(),
            &self.tool.fields,
        )
    }

    async fn call(&self, _message_id: &str, args: &str, comm: &dyn Communication) -> Value {
        let parsed: Value = match serde_json::from_str(args) {
            Ok(v) => v,
            Err(_) => return failure_result("Invalid arguments format"),
        };
        let Some(query) = parsed.get("query").and_then(|q| q.as_str()) else {
            return failure_result("missing required argument: query");
        };

        let top_k = self
            .tool
            .options
            .get_u32("knowledge.top_k")
            .unwrap_or(DEFAULT_TOP_K);
        let threshold = self
            .tool
            .options
            .get_f64("knowledge.score_threshold")
            .unwrap_or(0.0) as f32;

        match comm.retrieve_knowledge(query, top_k, threshold).await {
            Ok(contexts) => {
                debug!(query, hits = contexts.len(), "knowledge retrieved");
                success_result(json!({ "contexts": contexts }))
            }
            Err(e) => failure_result(format!("knowledge retrieval failed: {e}")),
        }
    }
}

/// Arbitrary HTTP request configured on the tool
pub struct ApiRequestCaller {
    tool: AssistantTool,
    client: reqwest::Client,
}

impl ApiRequestCaller {
    pub fn new(tool: AssistantTool) -> Result<Self> {
        let timeout = tool
            .options
            .get_f64("request.timeout")
            .map(|s| Duration::from_secs_f64(s))
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| voxflow_core::Error::config(format!("http client: {e}")))?;
        Ok(Self { tool, client })
    }

    fn request_url(&self) -> Option<String> {
        self.tool.options.get_string("request.url")
    }
}

#[async_trait]
impl ToolCaller for ApiRequestCaller {
    fn id(&self) -> u64 {
        self.tool.id
    }

    fn name(&self) -> &str {
        &self.tool.name
    }

    fn execution_method(&self) -> &str {
        "api_request"
    }

    fn action(&self) -> Option<Action> {
        Some(Action::ApiRequest)
    }

    fn definition(&self) -> Result<FunctionDefinition> {
        definition_from_fields(
            &self.tool.name,
            self.tool.description.as_deref(),
            &self.tool.fields,
        )
    }

    async fn call(&self, _message_id: &str, args: &str, _comm: &dyn Communication) -> Value {
        let Some(url) = self.request_url() else {
            return failure_result("request.url is not configured");
        };
        let body: Value = serde_json::from_str(args).unwrap_or(Value::Null);
        let method = self
            .tool
            .options
            .get_string("request.method")
            .unwrap_or_else(|| "POST".to_string())
            .to_uppercase();

        let mut request = match method.as_str() {
            "GET" => self.client.get(&url),
            "PUT" => self.client.put(&url).json(&body),
            "DELETE" => self.client.delete(&url),
            _ => self.client.post(&url).json(&body),
        };
        if let Some(Value::Object(headers)) = self.tool.options.get("request.headers") {
            for (key, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(key, v);
                }
            }
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                error!(tool = %self.tool.name, error = %e, "api request failed");
                return failure_result(format!("request failed: {e}"));
            }
        };
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return failure_result(format!("endpoint returned status {}: {}", status.as_u16(), text));
        }
        let data = serde_json::from_str(&text).unwrap_or(Value::String(text));
        success_result(data)
    }
}

/// Invocation of a configured platform endpoint
pub struct EndpointCaller {
    tool: AssistantTool,
    client: reqwest::Client,
}

impl EndpointCaller {
    pub fn new(tool: AssistantTool) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))
            .build()
            .map_err(|e| voxflow_core::Error::config(format!("http client: {e}")))?;
        Ok(Self { tool, client })
    }
}

#[async_trait]
impl ToolCaller for EndpointCaller {
    fn id(&self) -> u64 {
        self.tool.id
    }

    fn name(&self) -> &str {
        &self.tool.name
    }

    fn execution_method(&self) -> &str {
        "endpoint"
    }

    fn action(&self) -> Option<Action> {
        Some(Action::Endpoint)
    }

    fn definition(&self) -> Result<FunctionDefinition> {
        definition_from_fields(
            &self.tool.name,
            self.tool.description.as_deref(),
            &self.tool.fields,
        )
    }

    async fn call(&self, message_id: &str, args: &str, _comm: &dyn Communication) -> Value {
        let Some(url) = self.tool.options.get_string("endpoint.url") else {
            return failure_result("endpoint.url is not configured");
        };
        let arguments: Value = serde_json::from_str(args).unwrap_or(Value::Null);
        let payload = json!({
            "endpoint_id": self.tool.options.get_string("endpoint.id"),
            "message_id": message_id,
            "arguments": arguments,
        });

        match self.client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                let text = response.text().await.unwrap_or_default();
                success_result(serde_json::from_str(&text).unwrap_or(Value::String(text)))
            }
            Ok(response) => failure_result(format!(
                "endpoint returned status {}",
                response.status().as_u16()
            )),
            Err(e) => failure_result(format!("endpoint call failed: {e}")),
        }
    }
}

/// Puts the caller on hold; the conversation runtime interprets the action
pub struct PutOnHoldCaller {
    tool: AssistantTool,
}

impl PutOnHoldCaller {
    pub fn new(tool: AssistantTool) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl ToolCaller for PutOnHoldCaller {
    fn id(&self) -> u64 {
        self.tool.id
    }

    fn name(&self) -> &str {
        &self.tool.name
    }

    fn execution_method(&self) -> &str {
        "put_on_hold"
    }

    fn action(&self) -> Option<Action> {
        Some(Action::PutOnHold)
    }

    fn definition(&self) -> Result<FunctionDefinition> {
        definition_from_fields(
            &self.tool.name,
            self.tool.description.as_deref(),
            &self.tool.fields,
        )
    }

    async fn call(&self, _message_id: &str, _args: &str, _comm: &dyn Communication) -> Value {
        success_result(json!({"message": "caller placed on hold"}))
    }
}

/// Ends the conversation gracefully
pub struct EndOfConversationCaller {
    tool: AssistantTool,
}

impl EndOfConversationCaller {
    pub fn new(tool: AssistantTool) -> Self {
        Self { tool }
    }
}

#[async_trait]
impl ToolCaller for EndOfConversationCaller {
    fn id(&self) -> u64 {
        self.tool.id
    }

    fn name(&self) -> &str {
        &self.tool.name
    }

    fn execution_method(&self) -> &str {
        "end_of_conversation"
    }

    fn action(&self) -> Option<Action> {
        Some(Action::EndConversation)
    }

    fn definition(&self) -> Result<FunctionDefinition> {
        definition_from_fields(
            &self.tool.name,
            self.tool.description.as_deref(),
            &self.tool.fields,
        )
    }

    async fn call(&self, _message_id: &str, _args: &str, _comm: &dyn Communication) -> Value {
        success_result(json!({"message": "conversation ending"}))
    }
}
