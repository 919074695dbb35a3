//! Outbound notifications toward the transport adapter

use async_trait::async_trait;

use voxflow_core::packet::{Action, InterruptionSource};
use voxflow_core::Result;

/// One normalized output toward the carrier. Within one context id, events
/// are delivered in the order the runtime emits them.
#[derive(Debug, Clone)]
pub enum OutputEvent {
    /// User-turn echo (in-progress transcript or the finalized text)
    UserText {
        id: String,
        text: String,
        completed: bool,
    },
    /// Assistant text, streamed or final
    AssistantText {
        id: String,
        text: String,
        completed: bool,
    },
    /// One synthesized audio frame
    AssistantAudio { id: String, bytes: Vec<u8> },
    /// The user barged in
    Interruption {
        source: InterruptionSource,
        /// Unix seconds
        time: f64,
    },
    /// A conversation-level action fired
    Action { name: String, action: Action },
}

/// The transport side of the runtime: one writer per carrier session
#[async_trait]
pub trait TransportOutput: Send + Sync {
    async fn notify(&self, event: OutputEvent) -> Result<()>;
}
