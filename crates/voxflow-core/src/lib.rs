//! Core traits and types for the voxflow conversation orchestrator
//!
//! This crate provides foundational types used across all other crates:
//! - Packet taxonomy flowing through the conversation runtime
//! - Conversation, assistant and deployment-behavior entities
//! - Audio configuration at the transport/provider boundary
//! - Tool and function definitions
//! - Error types
//! - The `Communication` / `Dispatcher` seams between the runtime and the
//!   providers that call back into it

pub mod assistant;
pub mod audio;
pub mod comm;
pub mod conversation;
pub mod error;
pub mod metric;
pub mod options;
pub mod packet;
pub mod tool;

pub use assistant::{Assistant, AssistantTool, DeploymentBehavior, ProviderGrpc, ProviderWebsocket};
pub use audio::{AudioConfig, AudioFormat};
pub use comm::{Communication, Dispatcher, PacketSender};
pub use conversation::{Actor, Conversation, Direction, InputMode, Message, Source};
pub use error::{Error, Result};
pub use metric::Metric;
pub use options::Options;
pub use packet::{Action, InterruptionSource, Packet};
pub use tool::{FunctionDefinition, FunctionParameter, PropertyDefinition, ToolCall, ToolContent};
