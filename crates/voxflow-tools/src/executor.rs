//! The tool executor: registry, parallel dispatch, audit

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde_json::json;
use tracing::{error, info, warn};

use voxflow_core::comm::{RecordState, ToolLog};
use voxflow_core::tool::{FunctionDefinition, ToolCall, ToolContent};
use voxflow_core::{Communication, Result};

use crate::caller::{failure_result, ToolCaller};
use crate::local::{
    ApiRequestCaller, EndOfConversationCaller, EndpointCaller, KnowledgeRetrievalCaller,
    PutOnHoldCaller,
};
use crate::mcp::{McpClient, McpToolCaller};

/// Registry of every tool callable in one conversation. Built once at
/// conversation start, immutable afterwards.
#[derive(Default)]
pub struct ToolExecutor {
    tools: HashMap<String, Arc<dyn ToolCaller>>,
    definitions: Vec<FunctionDefinition>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register local tools from the assistant catalog and discover dynamic
    /// tools from every unique MCP server. A tool that fails to register is
    /// skipped; the rest of the catalog still loads.
    pub async fn initialize(&mut self, comm: &dyn Communication) -> Result<()> {
        let start = Instant::now();
        let mut mcp_servers: HashMap<String, Arc<McpClient>> = HashMap::new();

        for tool in comm.assistant().tools.clone() {
            let registered: Result<Arc<dyn ToolCaller>> = match tool.execution_method.as_str() {
                "knowledge_retrieval" => Ok(Arc::new(KnowledgeRetrievalCaller::new(tool))),
                "api_request" => ApiRequestCaller::new(tool).map(|c| Arc::new(c) as _),
                "endpoint" => EndpointCaller::new(tool).map(|c| Arc::new(c) as _),
                "put_on_hold" => Ok(Arc::new(PutOnHoldCaller::new(tool))),
                "end_of_conversation" => Ok(Arc::new(EndOfConversationCaller::new(tool))),
                "mcp" => {
                    let server_url = tool.options.get_string("mcp.server_url");
                    match server_url {
                        Some(url) => {
                            let client = match mcp_servers.get(&url) {
                                Some(client) => Arc::clone(client),
                                None => {
                                    let client = Arc::new(McpClient::new(None)?);
                                    mcp_servers.insert(url.clone(), Arc::clone(&client));
                                    client
                                }
                            };
                            McpToolCaller::configured(client, tool).map(|c| Arc::new(c) as _)
                        }
                        None => Err(voxflow_core::Error::config(
                            "mcp.server_url is required for MCP tools",
                        )),
                    }
                }
                other => Err(voxflow_core::Error::config(format!(
                    "illegal tool action provided: {other}"
                ))),
            };

            match registered {
                Ok(caller) => self.register(caller),
                Err(e) => {
                    error!(error = %e, "error while initializing tool, skipping");
                    continue;
                }
            }
        }

        // Discover whatever else each MCP server advertises
        for (url, client) in &mcp_servers {
            match client.list_tools(url).await {
                Ok(discovered) => {
                    for definition in discovered {
                        if self.tools.contains_key(&definition.name) {
                            continue;
                        }
                        let caller =
                            McpToolCaller::discovered(Arc::clone(client), url.clone(), definition);
                        self.register(Arc::new(caller));
                    }
                }
                Err(e) => {
                    warn!(server_url = %url, error = %e, "mcp tool discovery failed");
                }
            }
        }

        info!(
            tools = self.tools.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "tool executor initialized"
        );
        Ok(())
    }

    fn register(&mut self, caller: Arc<dyn ToolCaller>) {
        match caller.definition() {
            Ok(definition) => {
                self.definitions.push(definition);
                self.tools.insert(caller.name().to_string(), caller);
            }
            Err(e) => error!(tool = caller.name(), error = %e, "unable to generate tool definition"),
        }
    }

    /// The catalog advertised to the model
    pub fn function_definitions(&self) -> &[FunctionDefinition] {
        &self.definitions
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn ToolCaller>> {
        self.tools.get(name)
    }

    /// Execute one call: resolve, time, audit. Never fails; an unknown tool
    /// or a failing call becomes a structured FAIL result.
    pub async fn execute(
        &self,
        message_id: &str,
        call: &ToolCall,
        comm: &dyn Communication,
    ) -> ToolContent {
        let start = Instant::now();
        let name = call.function.name.clone();

        let Some(caller) = self.tools.get(&name) else {
            error!(tool = %name, "unable to find the function for tool call");
            return ToolContent {
                tool_call_id: call.id.clone(),
                name,
                content: failure_result("Unable to find the requested function"),
            };
        };

        let output = caller
            .call(message_id, &call.function.arguments, comm)
            .await;

        comm.record_tool_log(ToolLog {
            tool_id: caller.id(),
            message_id: message_id.to_string(),
            name: name.clone(),
            execution_method: caller.execution_method().to_string(),
            status: RecordState::RecordComplete,
            time_taken_ms: start.elapsed().as_millis() as i64,
            input: json!({"name": name, "arguments": call.function.arguments}),
            output: output.clone(),
        })
        .await;

        ToolContent {
            tool_call_id: call.id.clone(),
            name,
            content: output,
        }
    }

    /// Execute every call in parallel; results come back in call order, each
    /// keyed by the model-provided tool-call id.
    pub async fn execute_all(
        &self,
        message_id: &str,
        calls: &[ToolCall],
        comm: &dyn Communication,
    ) -> Vec<ToolContent> {
        join_all(
            calls
                .iter()
                .map(|call| self.execute(message_id, call, comm)),
        )
        .await
    }
}
