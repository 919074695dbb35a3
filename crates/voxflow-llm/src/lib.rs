//! Assistant executors
//!
//! The LLM is abstracted so that streaming providers (WebSocket-framed JSON,
//! gRPC bidi) and request/response providers fit behind the same two
//! operations: `initialize` opens the transport and sends a configuration
//! frame, `execute` pushes a user or static packet upstream. Upstream events
//! flow back through the packet sender registered at initialization.

mod completion;
mod grpc;
mod websocket;

use async_trait::async_trait;

use voxflow_core::comm::PacketSender;
use voxflow_core::{Packet, Result};

pub use completion::CompletionExecutor;
pub use grpc::GrpcExecutor;
pub use websocket::WebsocketExecutor;

/// Drives one model turn at a time for a conversation
#[async_trait]
pub trait AssistantExecutor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open the upstream transport, seed history, and send the configuration
    /// frame. Events stream back through `sender`.
    async fn initialize(&self, sender: PacketSender) -> Result<()>;

    /// Push a `UserText` or `Static` packet upstream
    async fn execute(&self, packet: Packet) -> Result<()>;

    /// Close the upstream transport
    async fn close(&self) -> Result<()>;
}
