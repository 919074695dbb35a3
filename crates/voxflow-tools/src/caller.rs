//! The tool caller contract and result shapes

use async_trait::async_trait;
use serde_json::{json, Value};

use voxflow_core::packet::Action;
use voxflow_core::tool::{FunctionDefinition, FunctionParameter};
use voxflow_core::{Communication, Result};

/// One callable tool. `call` never fails: every outcome is a structured
/// result value.
#[async_trait]
pub trait ToolCaller: Send + Sync {
    fn id(&self) -> u64;

    fn name(&self) -> &str;

    fn execution_method(&self) -> &str;

    /// Conversation-level action this tool stands for, if any
    fn action(&self) -> Option<Action> {
        None
    }

    /// The function definition advertised to the model
    fn definition(&self) -> Result<FunctionDefinition>;

    /// Execute with the model-provided JSON argument string
    async fn call(&self, message_id: &str, args: &str, comm: &dyn Communication) -> Value;
}

/// `{success:true, status:"SUCCESS", data}`
pub fn success_result(data: Value) -> Value {
    json!({
        "success": true,
        "status": "SUCCESS",
        "data": data,
    })
}

/// `{success:false, status:"FAIL", error}`
pub fn failure_result(error: impl Into<String>) -> Value {
    json!({
        "success": false,
        "status": "FAIL",
        "error": error.into(),
    })
}

/// Build a function definition from an assistant tool's schema fields
pub(crate) fn definition_from_fields(
    name: &str,
    description: Option<&str>,
    fields: &Value,
) -> Result<FunctionDefinition> {
    let parameters: FunctionParameter = if fields.is_null() {
        FunctionParameter::object()
    } else {
        serde_json::from_value(fields.clone())?
    };
    Ok(FunctionDefinition {
        name: name.to_string(),
        description: description.unwrap_or_default().to_string(),
        parameters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_shapes() {
        let ok = success_result(json!({"temp": 21}));
        assert_eq!(ok["success"], json!(true));
        assert_eq!(ok["status"], json!("SUCCESS"));
        assert_eq!(ok["data"]["temp"], json!(21));

        let fail = failure_result("boom");
        assert_eq!(fail["success"], json!(false));
        assert_eq!(fail["status"], json!("FAIL"));
        assert_eq!(fail["error"], json!("boom"));
    }

    #[test]
    fn test_definition_from_null_fields() {
        let def = definition_from_fields("ping", Some("Ping the service"), &Value::Null).unwrap();
        assert_eq!(def.name, "ping");
        assert_eq!(def.parameters.schema_type, "object");
        assert!(def.parameters.properties.is_empty());
    }

    #[test]
    fn test_definition_from_schema_fields() {
        let fields = json!({
            "type": "object",
            "properties": {"city": {"type": "string", "description": "City"}},
            "required": ["city"]
        });
        let def = definition_from_fields("get_weather", None, &fields).unwrap();
        assert_eq!(def.parameters.required, vec!["city"]);
        assert!(def.parameters.properties.contains_key("city"));
    }
}
