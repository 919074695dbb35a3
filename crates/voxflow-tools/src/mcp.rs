//! MCP tool-server client and callers
//!
//! The MCP surface is three HTTP endpoints:
//! - `GET  {server_url}/tools/list`
//! - `POST {server_url}/tools/definition` with `{tool_name}`
//! - `POST {server_url}/tools/call` with `{tool_name, arguments}`

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use voxflow_core::error::ToolError;
use voxflow_core::packet::Action;
use voxflow_core::tool::FunctionDefinition;
use voxflow_core::{AssistantTool, Communication, Result};

use crate::caller::{definition_from_fields, failure_result, success_result, ToolCaller};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response of `/tools/list`
#[derive(Debug, Deserialize)]
struct ToolListResponse {
    success: bool,
    #[serde(default)]
    tools: Vec<FunctionDefinition>,
    #[serde(default)]
    error: String,
}

/// Request body of `/tools/call`
#[derive(Debug, Serialize)]
struct ToolCallRequest<'a> {
    tool_name: &'a str,
    arguments: &'a Value,
}

/// Response of `/tools/call`
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolResponse {
    pub success: bool,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub data: Option<HashMap<String, Value>>,
}

/// HTTP client for one or more MCP servers
pub struct McpClient {
    http: reqwest::Client,
}

impl McpClient {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| voxflow_core::Error::config(format!("mcp http client: {e}")))?;
        Ok(Self { http })
    }

    /// List every tool the server advertises
    pub async fn list_tools(&self, server_url: &str) -> Result<Vec<FunctionDefinition>> {
        debug!(server_url, "listing mcp tools");
        let response = self
            .http
            .get(format!("{server_url}/tools/list"))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("MCP HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("MCP response read failed: {e}")))?;
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "MCP server returned status {}: {}",
                status.as_u16(),
                body
            ))
            .into());
        }

        let listed: ToolListResponse = serde_json::from_str(&body)
            .map_err(|e| ToolError::ExecutionFailed(format!("MCP tool list parse failed: {e}")))?;
        if !listed.success {
            return Err(ToolError::ExecutionFailed(format!("MCP server error: {}", listed.error)).into());
        }
        Ok(listed.tools)
    }

    /// Fetch the definition of one tool
    pub async fn tool_definition(
        &self,
        server_url: &str,
        tool_name: &str,
    ) -> Result<FunctionDefinition> {
        let response = self
            .http
            .post(format!("{server_url}/tools/definition"))
            .json(&serde_json::json!({ "tool_name": tool_name }))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("MCP HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("MCP response read failed: {e}")))?;
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed(format!(
                "MCP server returned status {}: {}",
                status.as_u16(),
                body
            ))
            .into());
        }
        serde_json::from_str(&body)
            .map_err(|e| ToolError::ExecutionFailed(format!("tool definition parse failed: {e}")).into())
    }

    /// Call a tool. HTTP or server failures come back as unsuccessful
    /// responses; an invalid JSON body on a 200 is tolerated by returning the
    /// raw body as the result.
    pub async fn call_tool(
        &self,
        server_url: &str,
        tool_name: &str,
        arguments: &Value,
    ) -> Result<McpToolResponse> {
        debug!(server_url, tool_name, "calling mcp tool");
        let response = self
            .http
            .post(format!("{server_url}/tools/call"))
            .json(&ToolCallRequest {
                tool_name,
                arguments,
            })
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("MCP HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("MCP response read failed: {e}")))?;
        Ok(parse_call_response(status.as_u16(), &body))
    }
}

/// Interpret one `/tools/call` HTTP exchange
fn parse_call_response(status: u16, body: &str) -> McpToolResponse {
    if status != 200 {
        return McpToolResponse {
            success: false,
            result: None,
            error: Some(format!("MCP server returned status {status}: {body}")),
            data: None,
        };
    }
    match serde_json::from_str(body) {
        Ok(response) => response,
        Err(_) => {
            warn!("mcp response is not json, returning raw body");
            McpToolResponse {
                success: true,
                result: Some(Value::String(body.to_string())),
                error: None,
                data: None,
            }
        }
    }
}

/// Convert an MCP response into the uniform tool-result shape
fn response_to_result(response: McpToolResponse) -> Value {
    if !response.success {
        let message = response
            .error
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| "Unknown error occurred".to_string());
        return failure_result(message);
    }
    let data = match (response.data, response.result) {
        (Some(data), _) if !data.is_empty() => serde_json::to_value(data).unwrap_or(Value::Null),
        (_, Some(result)) => result,
        _ => Value::Null,
    };
    success_result(data)
}

/// Caller for one MCP tool, configured or dynamically discovered.
///
/// A configured tool carries the assistant's catalog entry (with
/// `mcp.server_url` and optional `mcp.tool_name`); a discovered tool carries
/// the server-provided definition and id 0.
pub struct McpToolCaller {
    client: std::sync::Arc<McpClient>,
    server_url: String,
    tool_name: String,
    tool: Option<AssistantTool>,
    discovered: Option<FunctionDefinition>,
}

impl McpToolCaller {
    /// Build from a catalog entry; `mcp.server_url` is required
    pub fn configured(client: std::sync::Arc<McpClient>, tool: AssistantTool) -> Result<Self> {
        let server_url = tool
            .options
            .get_string("mcp.server_url")
            .ok_or_else(|| voxflow_core::Error::config("mcp.server_url is required for MCP tools"))?;
        let tool_name = tool
            .options
            .get_string("mcp.tool_name")
            .unwrap_or_else(|| tool.name.clone());
        Ok(Self {
            client,
            server_url,
            tool_name,
            tool: Some(tool),
            discovered: None,
        })
    }

    /// Build from a server-advertised definition
    pub fn discovered(
        client: std::sync::Arc<McpClient>,
        server_url: impl Into<String>,
        definition: FunctionDefinition,
    ) -> Self {
        Self {
            client,
            server_url: server_url.into(),
            tool_name: definition.name.clone(),
            tool: None,
            discovered: Some(definition),
        }
    }
}

#[async_trait]
impl ToolCaller for McpToolCaller {
    fn id(&self) -> u64 {
        self.tool.as_ref().map(|t| t.id).unwrap_or(0)
    }

    fn name(&self) -> &str {
        match (&self.tool, &self.discovered) {
            (Some(tool), _) => &tool.name,
            (None, Some(def)) => &def.name,
            (None, None) => &self.tool_name,
        }
    }

    fn execution_method(&self) -> &str {
        "mcp"
    }

    fn action(&self) -> Option<Action> {
        Some(Action::McpToolCall)
    }

    fn definition(&self) -> Result<FunctionDefinition> {
        if let Some(def) = &self.discovered {
            return Ok(def.clone());
        }
        let tool = self
            .tool
            .as_ref()
            .ok_or_else(|| voxflow_core::Error::config("mcp tool has no definition"))?;
        definition_from_fields(&tool.name, tool.description.as_deref(), &tool.fields)
    }

    async fn call(&self, _message_id: &str, args: &str, _comm: &dyn Communication) -> Value {
        let arguments: Value = match serde_json::from_str(args) {
            Ok(v) => v,
            Err(e) => {
                error!(tool = %self.tool_name, error = %e, "mcp arguments are not json");
                return failure_result("Invalid arguments format");
            }
        };
        match self
            .client
            .call_tool(&self.server_url, &self.tool_name, &arguments)
            .await
        {
            Ok(response) => response_to_result(response),
            Err(e) => failure_result(format!("Tool execution failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_non_200_becomes_failed_response() {
        let response = parse_call_response(500, "internal error");
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("MCP server returned status 500: internal error")
        );
    }

    #[test]
    fn test_raw_body_tolerated_on_200() {
        let response = parse_call_response(200, "plain text answer");
        assert!(response.success);
        assert_eq!(response.result, Some(json!("plain text answer")));
    }

    #[test]
    fn test_json_response_parsed() {
        let response = parse_call_response(200, "{\"success\":true,\"result\":{\"temp\":21}}");
        assert!(response.success);
        assert_eq!(response.result.unwrap()["temp"], json!(21));
    }

    #[test]
    fn test_result_mapping() {
        let ok = response_to_result(McpToolResponse {
            success: true,
            result: Some(json!("fine")),
            error: None,
            data: None,
        });
        assert_eq!(ok["status"], json!("SUCCESS"));
        assert_eq!(ok["data"], json!("fine"));

        // data wins over result when both are present
        let mut data = HashMap::new();
        data.insert("a".to_string(), json!(1));
        let ok = response_to_result(McpToolResponse {
            success: true,
            result: Some(json!("shadowed")),
            error: None,
            data: Some(data),
        });
        assert_eq!(ok["data"]["a"], json!(1));

        let fail = response_to_result(McpToolResponse {
            success: false,
            result: None,
            error: Some(String::new()),
            data: None,
        });
        assert_eq!(fail["error"], json!("Unknown error occurred"));
    }

    #[test]
    fn test_configured_requires_server_url() {
        let client = std::sync::Arc::new(McpClient::new(None).unwrap());
        let tool = AssistantTool {
            id: 3,
            name: "remote".into(),
            description: None,
            execution_method: "mcp".into(),
            fields: Value::Null,
            options: voxflow_core::Options::new(),
        };
        assert!(McpToolCaller::configured(client, tool).is_err());
    }

    #[test]
    fn test_configured_tool_name_fallback() {
        let client = std::sync::Arc::new(McpClient::new(None).unwrap());
        let tool = AssistantTool {
            id: 3,
            name: "remote".into(),
            description: None,
            execution_method: "mcp".into(),
            fields: Value::Null,
            options: voxflow_core::Options::new()
                .with("mcp.server_url", json!("http://tools.internal")),
        };
        let caller = McpToolCaller::configured(client, tool).unwrap();
        assert_eq!(caller.tool_name, "remote");
        assert_eq!(caller.id(), 3);
    }
}
