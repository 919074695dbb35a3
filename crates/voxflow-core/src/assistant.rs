//! Assistant configuration bound to a conversation
//!
//! Read-only for the runtime; fetched once at conversation start.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::conversation::Source;
use crate::options::Options;

/// Per-source deployment policy. Durations are minutes, fractional values
/// allowed (0.05 = 3 seconds).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentBehavior {
    /// Greeting template, rendered with the conversation args
    pub greeting: Option<String>,
    /// Apology template used by the error path
    pub mistake: Option<String>,
    /// Idle timeout in minutes; 0 or absent disables the idle timer
    pub idle_timeout_minutes: Option<f64>,
    /// Idle prompts allowed before the conversation is ended
    pub idle_backoff_count: Option<u32>,
    /// Prompt spoken when the idle timer fires
    pub idle_timeout_message: Option<String>,
    /// Hard session cap in minutes; 0 or absent disables it
    pub max_session_minutes: Option<f64>,
    /// Whether a user turn resets the idle-prompt backoff counter
    #[serde(default = "default_backoff_reset")]
    pub idle_backoff_reset: bool,
}

fn default_backoff_reset() -> bool {
    true
}

/// One callable function exposed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantTool {
    pub id: u64,
    pub name: String,
    pub description: Option<String>,
    /// One of: knowledge_retrieval, api_request, endpoint, put_on_hold,
    /// end_of_conversation, mcp
    pub execution_method: String,
    /// Parameter schema fields, JSON-schema shaped
    pub fields: serde_json::Value,
    /// Method-specific options (mcp.server_url, request.url, ...)
    #[serde(default)]
    pub options: Options,
}

/// Remote WebSocket executor endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderWebsocket {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
}

/// Remote gRPC executor endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderGrpc {
    pub url: String,
    /// Optional PEM root certificate; a certificate that fails to parse
    /// aborts initialization
    #[serde(default)]
    pub certificate: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Static configuration bound to a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assistant {
    pub id: u64,
    pub version: String,
    pub name: String,
    /// Executor selection: "websocket", "grpc" or "completion"
    pub executor: String,
    #[serde(default)]
    pub provider_websocket: Option<ProviderWebsocket>,
    #[serde(default)]
    pub provider_grpc: Option<ProviderGrpc>,
    /// Provider/model options, dotted keys (listen.*, speak.*, microphone.*)
    #[serde(default)]
    pub options: Options,
    /// Tool catalog registered at conversation start
    #[serde(default)]
    pub tools: Vec<AssistantTool>,
    #[serde(default)]
    pub phone_deployment: Option<DeploymentBehavior>,
    #[serde(default)]
    pub web_plugin_deployment: Option<DeploymentBehavior>,
    #[serde(default)]
    pub sdk_deployment: Option<DeploymentBehavior>,
    #[serde(default)]
    pub whatsapp_deployment: Option<DeploymentBehavior>,
    #[serde(default)]
    pub debugger_deployment: Option<DeploymentBehavior>,
}

impl Assistant {
    /// Deployment behavior for a source; an unconfigured source has no
    /// deployment and therefore no greeting or timers.
    pub fn behavior(&self, source: Source) -> Option<&DeploymentBehavior> {
        match source {
            Source::Phone => self.phone_deployment.as_ref(),
            Source::WebPlugin => self.web_plugin_deployment.as_ref(),
            Source::Sdk => self.sdk_deployment.as_ref(),
            Source::Whatsapp => self.whatsapp_deployment.as_ref(),
            Source::Debugger => self.debugger_deployment.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assistant_with_phone_behavior() -> Assistant {
        Assistant {
            id: 7,
            version: "v1".into(),
            name: "support".into(),
            executor: "websocket".into(),
            provider_websocket: None,
            provider_grpc: None,
            options: Options::default(),
            tools: Vec::new(),
            phone_deployment: Some(DeploymentBehavior {
                greeting: Some("Hi {name}!".into()),
                ..Default::default()
            }),
            web_plugin_deployment: None,
            sdk_deployment: None,
            whatsapp_deployment: None,
            debugger_deployment: None,
        }
    }

    #[test]
    fn test_behavior_selected_by_source() {
        let a = assistant_with_phone_behavior();
        assert!(a.behavior(Source::Phone).is_some());
        assert!(a.behavior(Source::Sdk).is_none());
    }

    #[test]
    fn test_backoff_reset_defaults_on() {
        let b: DeploymentBehavior = serde_json::from_str("{}").unwrap();
        assert!(b.idle_backoff_reset);
    }
}
