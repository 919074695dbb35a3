//! Function and tool-call definitions exchanged with the model

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-schema property of a function parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyDefinition {
    #[serde(rename = "type")]
    pub prop_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertyDefinition {
    pub fn string(description: impl Into<String>) -> Self {
        Self {
            prop_type: "string".to_string(),
            description: Some(description.into()),
            enum_values: None,
        }
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self {
            prop_type: "number".to_string(),
            description: Some(description.into()),
            enum_values: None,
        }
    }
}

/// Parameter schema of a function (JSON Schema object)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionParameter {
    #[serde(rename = "type", default = "object_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: HashMap<String, PropertyDefinition>,
    #[serde(default)]
    pub required: Vec<String>,
}

fn object_type() -> String {
    "object".to_string()
}

impl FunctionParameter {
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: Vec::new(),
        }
    }

    pub fn property(mut self, name: &str, prop: PropertyDefinition, required: bool) -> Self {
        self.properties.insert(name.to_string(), prop);
        if required {
            self.required.push(name.to_string());
        }
        self
    }
}

/// One callable function as exposed to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: FunctionParameter,
}

/// The function half of a model-issued tool call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// Raw JSON string, parsed by the tool caller
    pub arguments: String,
}

/// One model-issued tool invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Model-assigned id; results must echo it (delivered exactly once)
    pub id: String,
    pub function: FunctionCall,
}

/// The content of a tool result returned to the model, keyed by the
/// model-provided tool-call id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolContent {
    pub tool_call_id: String,
    pub name: String,
    pub content: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_builder() {
        let params = FunctionParameter::object()
            .property("city", PropertyDefinition::string("City name"), true)
            .property("units", PropertyDefinition::string("Unit system"), false);
        assert_eq!(params.properties.len(), 2);
        assert_eq!(params.required, vec!["city"]);
    }

    #[test]
    fn test_definition_round_trip() {
        let def = FunctionDefinition {
            name: "get_weather".into(),
            description: "Weather lookup".into(),
            parameters: FunctionParameter::object(),
        };
        let json = serde_json::to_string(&def).unwrap();
        let back: FunctionDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "get_weather");
        assert_eq!(back.parameters.schema_type, "object");
    }
}
