//! Tool execution
//!
//! Two classes of tool sources co-exist: local actions registered from the
//! assistant configuration, and MCP tools discovered dynamically from tool
//! servers at initialization. Every call is executed in parallel with its
//! siblings, individually timed, audited, and recovered locally: a failing
//! tool becomes a structured `{success:false, status:"FAIL"}` result, never
//! an error that aborts the turn.

mod caller;
mod executor;
mod local;
mod mcp;

pub use caller::{failure_result, success_result, ToolCaller};
pub use executor::ToolExecutor;
pub use local::{
    ApiRequestCaller, EndOfConversationCaller, EndpointCaller, KnowledgeRetrievalCaller,
    PutOnHoldCaller,
};
pub use mcp::{McpClient, McpToolCaller, McpToolResponse};
