//! The per-conversation messaging state machine
//!
//! Transitions are total: an illegal transition returns a recoverable error
//! to the dispatch site and leaves the state unchanged. Exactly one user
//! message is current at any time, and at most one assistant message.

use parking_lot::Mutex;

use voxflow_core::error::StateError;
use voxflow_core::{Actor, InputMode, Message};

/// Messaging FSM states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagingState {
    Idle,
    UserSpeaking,
    UserCompleted,
    LlmGenerating,
    AgentSpeaking,
    AgentCompleted,
    Interrupted,
}

impl MessagingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagingState::Idle => "idle",
            MessagingState::UserSpeaking => "user_speaking",
            MessagingState::UserCompleted => "user_completed",
            MessagingState::LlmGenerating => "llm_generating",
            MessagingState::AgentSpeaking => "agent_speaking",
            MessagingState::AgentCompleted => "agent_completed",
            MessagingState::Interrupted => "interrupted",
        }
    }
}

/// Transition triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    UserSpeaking,
    UserCompleted,
    LlmGenerating,
    AgentSpeaking,
    AgentCompleted,
    Interrupted,
}

impl StateEvent {
    fn as_str(&self) -> &'static str {
        match self {
            StateEvent::UserSpeaking => "user_speaking",
            StateEvent::UserCompleted => "user_completed",
            StateEvent::LlmGenerating => "llm_generating",
            StateEvent::AgentSpeaking => "agent_speaking",
            StateEvent::AgentCompleted => "agent_completed",
            StateEvent::Interrupted => "interrupted",
        }
    }
}

struct Inner {
    state: MessagingState,
    user_message: Option<Message>,
    assistant_message: Option<Message>,
}

/// Serialized access to the conversation's mutable messaging state
pub struct Messaging {
    input_mode: InputMode,
    inner: Mutex<Inner>,
}

impl Messaging {
    pub fn new(input_mode: InputMode) -> Self {
        Self {
            input_mode,
            inner: Mutex::new(Inner {
                state: MessagingState::Idle,
                user_message: None,
                assistant_message: None,
            }),
        }
    }

    pub fn input_mode(&self) -> InputMode {
        self.input_mode
    }

    pub fn state(&self) -> MessagingState {
        self.inner.lock().state
    }

    /// Apply one transition. Illegal transitions leave the state unchanged
    /// and report the attempted event.
    pub fn transition(&self, event: StateEvent) -> Result<MessagingState, StateError> {
        use MessagingState as S;
        use StateEvent as E;

        let mut inner = self.inner.lock();
        let next = match (inner.state, event) {
            // A fresh user turn can start whenever the agent is not mid-turn
            (S::Idle | S::AgentCompleted | S::Interrupted | S::UserSpeaking, E::UserSpeaking) => {
                S::UserSpeaking
            }
            (S::UserSpeaking, E::UserCompleted) => S::UserCompleted,
            (S::UserCompleted, E::LlmGenerating) => S::LlmGenerating,
            // Streaming keeps re-asserting AgentSpeaking; scripted audio may
            // start from a rest state
            (
                S::LlmGenerating | S::AgentSpeaking | S::AgentCompleted | S::Idle,
                E::AgentSpeaking,
            ) => S::AgentSpeaking,
            // Scripted turns complete from rest states as well
            (
                S::AgentSpeaking | S::LlmGenerating | S::Idle | S::AgentCompleted,
                E::AgentCompleted,
            ) => S::AgentCompleted,
            // Barge-in is accepted from every state except itself, so the
            // transport is notified exactly once per interruption
            (from, E::Interrupted) if from != S::Interrupted => S::Interrupted,
            (from, event) => {
                return Err(StateError {
                    from: from.as_str(),
                    event: event.as_str(),
                })
            }
        };
        inner.state = next;
        Ok(next)
    }

    /// The current message for an actor, created empty on first use
    pub fn current(&self, actor: Actor) -> Message {
        let mut inner = self.inner.lock();
        let slot = match actor {
            Actor::User => &mut inner.user_message,
            _ => &mut inner.assistant_message,
        };
        slot.get_or_insert_with(|| Message::new(actor, "")).clone()
    }

    /// Append a finalized fragment to the current message of an actor
    pub fn append(&self, actor: Actor, fragment: &str) -> Message {
        let mut inner = self.inner.lock();
        let slot = match actor {
            Actor::User => &mut inner.user_message,
            _ => &mut inner.assistant_message,
        };
        let message = slot.get_or_insert_with(|| Message::new(actor, ""));
        message.append(fragment);
        message.clone()
    }

    /// Append a finalized transcript segment to the current user message,
    /// space-joined the way streaming recognizers segment speech
    pub fn append_transcript(&self, script: &str) -> Message {
        let mut inner = self.inner.lock();
        let message = inner
            .user_message
            .get_or_insert_with(|| Message::new(Actor::User, ""));
        if message.contents.is_empty() {
            message.append(script);
        } else {
            message.append(format!(" {script}"));
        }
        message.clone()
    }

    /// Replace the current message of an actor with a fresh one
    pub fn begin(&self, actor: Actor, content: &str) -> Message {
        let mut inner = self.inner.lock();
        let message = Message::new(actor, content);
        let slot = match actor {
            Actor::User => &mut inner.user_message,
            _ => &mut inner.assistant_message,
        };
        *slot = Some(message.clone());
        message
    }

    /// Mark the current message of an actor completed
    pub fn complete(&self, actor: Actor) -> Option<Message> {
        let mut inner = self.inner.lock();
        let slot = match actor {
            Actor::User => &mut inner.user_message,
            _ => &mut inner.assistant_message,
        };
        if let Some(message) = slot.as_mut() {
            message.completed = true;
            return Some(message.clone());
        }
        None
    }

    /// Id of the current user message, the context id of the active turn
    pub fn current_context(&self) -> Option<String> {
        self.inner.lock().user_message.as_ref().map(|m| m.id.clone())
    }
}
