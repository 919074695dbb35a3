//! Conversation-scoped metric events

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One named measurement attached to a message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
}

impl Metric {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Wall-clock latency of an operation, milliseconds
    pub fn time_taken(elapsed: Duration) -> Self {
        Self::new("time_taken", format!("{}", elapsed.as_millis())).with_description("ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_taken_is_millis() {
        let m = Metric::time_taken(Duration::from_millis(420));
        assert_eq!(m.name, "time_taken");
        assert_eq!(m.value, "420");
        assert_eq!(m.description, "ms");
    }
}
