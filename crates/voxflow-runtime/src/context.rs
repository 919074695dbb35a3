//! The conversation's read-only view and persistence hooks

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use voxflow_core::comm::ToolLog;
use voxflow_core::{Assistant, Communication, Conversation, Metric};

/// Default `Communication` implementation: the static conversation view with
/// log-only persistence. Deployments that persist conversations wrap or
/// replace this.
pub struct ConversationContext {
    conversation: Conversation,
    assistant: Assistant,
    args: HashMap<String, String>,
    history: Vec<(String, String)>,
}

impl ConversationContext {
    pub fn new(
        conversation: Conversation,
        assistant: Assistant,
        args: HashMap<String, String>,
    ) -> Self {
        Self {
            conversation,
            assistant,
            args,
            history: Vec::new(),
        }
    }

    /// Seed prior turns for executor history
    pub fn with_history(mut self, history: Vec<(String, String)>) -> Self {
        self.history = history;
        self
    }
}

#[async_trait]
impl Communication for ConversationContext {
    fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    fn assistant(&self) -> &Assistant {
        &self.assistant
    }

    fn args(&self) -> &HashMap<String, String> {
        &self.args
    }

    fn conversation_logs(&self) -> Vec<(String, String)> {
        self.history.clone()
    }

    async fn record_tool_log(&self, log: ToolLog) {
        debug!(
            tool = %log.name,
            status = ?log.status,
            time_taken_ms = log.time_taken_ms,
            "tool call recorded"
        );
    }

    async fn record_event(&self, event_type: &str, payload: Value) {
        debug!(event_type, %payload, conversation = self.conversation.id, "conversation event");
    }

    async fn record_metrics(&self, context_id: &str, metrics: &[Metric]) {
        for metric in metrics {
            debug!(context_id, name = %metric.name, value = %metric.value, "message metric");
        }
    }
}
