//! The per-conversation runtime
//!
//! Owns the conversation lifecycle: routes typed packets between the
//! transport adapter and the cognitive providers, drives the
//! greeting/idle/max-duration timers, enforces the barge-in protocol, and
//! emits outgoing notifications. The runtime exclusively owns the mutable
//! conversation state; providers call back through the packet channel and
//! never hold the runtime type.

mod behaviors;
mod context;
mod messaging;
mod output;
mod runtime;

pub use context::ConversationContext;
pub use messaging::{Messaging, MessagingState, StateEvent};
pub use output::{OutputEvent, TransportOutput};
pub use runtime::{
    eos_callback, packet_channel, stt_callback, tts_callbacks, ConversationRuntime, RuntimeDeps,
};
