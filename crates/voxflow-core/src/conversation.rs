//! Conversation and message entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metric::Metric;

/// Where a conversation was initiated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Phone,
    WebPlugin,
    Sdk,
    Whatsapp,
    Debugger,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Phone => "phone",
            Source::WebPlugin => "web_plugin",
            Source::Sdk => "sdk",
            Source::Whatsapp => "whatsapp",
            Source::Debugger => "debugger",
        }
    }
}

impl std::str::FromStr for Source {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(Source::Phone),
            "web_plugin" | "webplugin" => Ok(Source::WebPlugin),
            "sdk" => Ok(Source::Sdk),
            "whatsapp" => Ok(Source::Whatsapp),
            "debugger" => Ok(Source::Debugger),
            other => Err(crate::Error::config(format!("unknown source: {other}"))),
        }
    }
}

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// What kinds of user input the conversation accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    Audio,
    Text,
    Both,
}

impl InputMode {
    /// Whether the conversation carries audio
    pub fn audio(&self) -> bool {
        matches!(self, InputMode::Audio | InputMode::Both)
    }

    /// Whether the conversation carries text
    pub fn text(&self) -> bool {
        matches!(self, InputMode::Text | InputMode::Both)
    }
}

/// Who produced a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Assistant,
    System,
}

impl Actor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Actor::User => "user",
            Actor::Assistant => "assistant",
            Actor::System => "system",
        }
    }
}

/// One live session between a user and an assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: u64,
    pub assistant_id: u64,
    pub assistant_version: String,
    pub direction: Direction,
    pub source: Source,
    pub input_mode: InputMode,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        id: u64,
        assistant_id: u64,
        assistant_version: impl Into<String>,
        direction: Direction,
        source: Source,
        input_mode: InputMode,
    ) -> Self {
        Self {
            id,
            assistant_id,
            assistant_version: assistant_version.into(),
            direction,
            source,
            input_mode,
            created_at: Utc::now(),
        }
    }
}

/// One logical speaking turn. Created on the first fragment, mutated by
/// streaming updates, finalized on the turn boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub actor: Actor,
    pub contents: Vec<String>,
    pub metrics: Vec<Metric>,
    pub created_at: DateTime<Utc>,
    pub completed: bool,
}

impl Message {
    pub fn new(actor: Actor, content: impl Into<String>) -> Self {
        let content = content.into();
        let contents = if content.is_empty() {
            Vec::new()
        } else {
            vec![content]
        };
        Self {
            id: Uuid::new_v4().to_string(),
            actor,
            contents,
            metrics: Vec::new(),
            created_at: Utc::now(),
            completed: false,
        }
    }

    /// Append a streamed fragment
    pub fn append(&mut self, fragment: impl Into<String>) {
        let fragment = fragment.into();
        if !fragment.is_empty() {
            self.contents.push(fragment);
        }
    }

    /// The full message text, fragments joined in arrival order
    pub fn text(&self) -> String {
        self.contents.concat()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_mode() {
        assert!(InputMode::Audio.audio());
        assert!(!InputMode::Audio.text());
        assert!(InputMode::Both.audio());
        assert!(InputMode::Both.text());
    }

    #[test]
    fn test_message_accumulates_fragments() {
        let mut msg = Message::new(Actor::Assistant, "");
        assert!(msg.contents.is_empty());
        msg.append("Hello ");
        msg.append("world");
        assert_eq!(msg.text(), "Hello world");
    }

    #[test]
    fn test_source_parse() {
        assert_eq!("phone".parse::<Source>().unwrap(), Source::Phone);
        assert!("carrier_pigeon".parse::<Source>().is_err());
    }
}
