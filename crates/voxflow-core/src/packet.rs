//! Packet taxonomy
//!
//! Every runtime event flowing through a conversation is one variant of
//! [`Packet`]. Packets are value types: producers create them, the dispatcher
//! consumes them by ownership. All packets of one speaking turn share a
//! `context_id` that names either the current user message or the current
//! assistant message.

use serde::{Deserialize, Serialize};

use crate::metric::Metric;

/// Where an interruption was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionSource {
    /// A recognized word arrived while the agent was speaking
    Word,
    /// Voice-activity detection fired while the agent was speaking
    Vad,
}

/// Conversation-level action requested by the executor or a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    EndConversation,
    PutOnHold,
    Handoff,
    McpToolCall,
    KnowledgeRetrieval,
    ApiRequest,
    Endpoint,
}

/// A runtime event routed by the conversation dispatcher
#[derive(Debug, Clone)]
pub enum Packet {
    /// Raw audio chunk from the transport adapter
    UserAudio { bytes: Vec<u8> },

    /// Text input from the transport adapter or derived from a transcript
    UserText { context_id: String, text: String },

    /// Streaming speech-to-text output
    SpeechToText {
        script: String,
        confidence: f64,
        language: String,
        interim: bool,
    },

    /// The end-of-speech detector fired
    EndOfSpeech {
        speech: String,
        start_at: f64,
        end_at: f64,
    },

    /// The user barged in while the agent was speaking
    Interruption {
        context_id: String,
        source: InterruptionSource,
        start_at: f64,
        end_at: f64,
    },

    /// Partial text from the assistant executor
    LlmStream { context_id: String, text: String },

    /// The assistant executor finalized a turn
    LlmMessage { context_id: String, text: String },

    /// The assistant executor invoked a tool action
    LlmTool {
        context_id: String,
        action: Action,
        name: Option<String>,
        result: Option<serde_json::Value>,
    },

    /// Scripted agent text: greeting, mistake, idle prompt
    Static { context_id: String, text: String },

    /// One complete sentence emitted by the tokenizer
    Text { context_id: String, text: String },

    /// Flush residual tokenizer text for a context
    Flush { context_id: String },

    /// One synthesized audio frame for a context
    TextToSpeech {
        context_id: String,
        audio: Vec<u8>,
    },

    /// Synthesis for a context completed and flushed
    TextToSpeechFlush { context_id: String },

    /// Latency / token counters attached to a message
    Metric {
        context_id: String,
        metrics: Vec<Metric>,
    },
}

impl Packet {
    /// The turn this packet belongs to. Packets produced before a message
    /// exists (raw audio, transcripts) carry an empty id and are bound to the
    /// current turn by the dispatcher.
    pub fn context_id(&self) -> &str {
        match self {
            Packet::UserAudio { .. } => "",
            Packet::UserText { context_id, .. }
            | Packet::Interruption { context_id, .. }
            | Packet::LlmStream { context_id, .. }
            | Packet::LlmMessage { context_id, .. }
            | Packet::LlmTool { context_id, .. }
            | Packet::Static { context_id, .. }
            | Packet::Text { context_id, .. }
            | Packet::Flush { context_id }
            | Packet::TextToSpeech { context_id, .. }
            | Packet::TextToSpeechFlush { context_id }
            | Packet::Metric { context_id, .. } => context_id,
            Packet::SpeechToText { .. } | Packet::EndOfSpeech { .. } => "",
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::UserAudio { .. } => "user_audio",
            Packet::UserText { .. } => "user_text",
            Packet::SpeechToText { .. } => "speech_to_text",
            Packet::EndOfSpeech { .. } => "end_of_speech",
            Packet::Interruption { .. } => "interruption",
            Packet::LlmStream { .. } => "llm_stream",
            Packet::LlmMessage { .. } => "llm_message",
            Packet::LlmTool { .. } => "llm_tool",
            Packet::Static { .. } => "static",
            Packet::Text { .. } => "text",
            Packet::Flush { .. } => "flush",
            Packet::TextToSpeech { .. } => "text_to_speech",
            Packet::TextToSpeechFlush { .. } => "text_to_speech_flush",
            Packet::Metric { .. } => "metric",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_id_routing() {
        let p = Packet::Text {
            context_id: "m1".into(),
            text: "hello".into(),
        };
        assert_eq!(p.context_id(), "m1");

        let p = Packet::UserAudio { bytes: vec![0xff] };
        assert_eq!(p.context_id(), "");
    }

    #[test]
    fn test_action_wire_format() {
        let v = serde_json::to_string(&Action::EndConversation).unwrap();
        assert_eq!(v, "\"END_CONVERSATION\"");
    }

    #[test]
    fn test_kind_names() {
        let p = Packet::Flush {
            context_id: "m1".into(),
        };
        assert_eq!(p.kind(), "flush");
    }
}
