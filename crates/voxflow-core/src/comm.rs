//! Seams between the runtime and everything that calls back into it
//!
//! Providers and tools never hold the runtime type. They receive either a
//! [`PacketSender`] (the callback bundle: events go in, the dispatcher routes
//! them) or a [`Communication`] reference (a read-only view of the
//! conversation plus persistence hooks). The runtime alone implements
//! [`Dispatcher`].

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::assistant::Assistant;
use crate::conversation::Conversation;
use crate::error::Result;
use crate::metric::Metric;
use crate::packet::Packet;

/// Channel half handed to providers at `initialize`; upstream events are
/// forwarded here and routed by the dispatcher task.
pub type PacketSender = tokio::sync::mpsc::Sender<Packet>;

/// The mutating runtime API: a single logical packet handler.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Route one or more packets. Illegal state transitions are logged and
    /// skipped, never returned as errors from this method.
    async fn on_packet(&self, packets: Vec<Packet>) -> Result<()>;
}

/// Terminal state of a recorded unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordState {
    RecordComplete,
    RecordFailed,
}

/// Audit record of one tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolLog {
    pub tool_id: u64,
    pub message_id: String,
    pub name: String,
    pub execution_method: String,
    pub status: RecordState,
    pub time_taken_ms: i64,
    pub input: Value,
    pub output: Value,
}

/// One retrieved knowledge chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeContext {
    pub id: String,
    pub document_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
    pub content: String,
    pub score: f64,
}

/// Read-only conversation view handed to executors and tools.
///
/// The persistence hooks are fire-and-forget from the caller's point of view:
/// implementations run them off the hot path.
#[async_trait]
pub trait Communication: Send + Sync {
    fn conversation(&self) -> &Conversation;

    fn assistant(&self) -> &Assistant;

    /// Template arguments supplied at conversation start
    fn args(&self) -> &HashMap<String, String>;

    /// Prior conversation turns for executor history seeding
    fn conversation_logs(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Vector retrieval for the knowledge tool
    async fn retrieve_knowledge(
        &self,
        _query: &str,
        _top_k: u32,
        _score_threshold: f32,
    ) -> Result<Vec<KnowledgeContext>> {
        Ok(Vec::new())
    }

    /// Persist a tool audit record
    async fn record_tool_log(&self, _log: ToolLog) {}

    /// Persist a transport/lifecycle event
    async fn record_event(&self, _event_type: &str, _payload: Value) {}

    /// Persist metrics against a message
    async fn record_metrics(&self, _context_id: &str, _metrics: &[Metric]) {}
}
