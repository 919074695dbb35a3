//! Dotted-key option bags
//!
//! Provider and behavior options travel as a flat map of dotted keys
//! (`microphone.eos.timeout`, `listen.model`, `speak.voice.id`) with
//! JSON-typed values. Accessors are forgiving about representation: a number
//! stored as a string still reads as a number.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(pub HashMap<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_u64().map(|v| v as u32),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.0.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// String list stored either as a JSON array or as a bracketed
    /// space-separated string ("[alpha beta]").
    pub fn get_string_list(&self, key: &str) -> Option<Vec<String>> {
        match self.0.get(key)? {
            Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(|s| s.trim().to_string()))
                    .collect(),
            ),
            Value::String(s) => {
                let trimmed = s.trim_start_matches('[').trim_end_matches(']');
                Some(trimmed.split_whitespace().map(|w| w.to_string()).collect())
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_accessors() {
        let opts = Options::new()
            .with("microphone.eos.timeout", json!(150.0))
            .with("listen.smart_format", json!(true))
            .with("listen.channel", json!("2"));

        assert_eq!(opts.get_f64("microphone.eos.timeout"), Some(150.0));
        assert_eq!(opts.get_bool("listen.smart_format"), Some(true));
        assert_eq!(opts.get_u32("listen.channel"), Some(2));
        assert_eq!(opts.get_f64("missing"), None);
    }

    #[test]
    fn test_number_as_string() {
        let opts = Options::new().with("microphone.eos.timeout", json!("300"));
        assert_eq!(opts.get_f64("microphone.eos.timeout"), Some(300.0));
    }

    #[test]
    fn test_keyword_list_forms() {
        let opts = Options::new().with("listen.keyword", json!("[alpha beta]"));
        assert_eq!(
            opts.get_string_list("listen.keyword"),
            Some(vec!["alpha".to_string(), "beta".to_string()])
        );

        let opts = Options::new().with("listen.keyword", json!(["gamma", "delta"]));
        assert_eq!(
            opts.get_string_list("listen.keyword"),
            Some(vec!["gamma".to_string(), "delta".to_string()])
        );
    }

    #[test]
    fn test_empty_string_is_absent() {
        let opts = Options::new().with("speaker.language", json!(""));
        assert_eq!(opts.get_string("speaker.language"), None);
    }
}
