//! Error types for the conversation orchestrator

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors (missing credential, unknown provider, bad template)
    #[error("Configuration error: {0}")]
    Config(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // Provider errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // Audio errors
    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    // Tool errors
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    // Illegal messaging-state transition
    #[error("Illegal state transition: {0}")]
    IllegalState(#[from] StateError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Transport-level errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Connection closed: {0}")]
    Closed(String),

    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

/// Cognitive-provider errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed upstream frame: {0}")]
    Protocol(String),

    #[error("Provider not initialized: {0}")]
    NotInitialized(String),

    #[error("Handshake timed out after {0}s")]
    HandshakeTimeout(u64),

    #[error("STT error: {0}")]
    SpeechToText(String),

    #[error("TTS error: {0}")]
    TextToSpeech(String),

    #[error("Executor error: {0}")]
    Executor(String),
}

/// Audio-bridge errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Invalid audio format: {0}")]
    InvalidFormat(String),

    #[error("Unsupported sample rate: {0}")]
    UnsupportedSampleRate(u32),

    #[error("Unsupported channel count: {0}")]
    UnsupportedChannels(u32),

    #[error("Truncated sample data: {0} bytes")]
    Truncated(usize),

    #[error("Resampling error: {0}")]
    Resampling(String),
}

/// Tool execution errors
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Tool '{0}' timed out after {1}s")]
    Timeout(String, u64),
}

/// Illegal messaging-state transition, recoverable at the dispatch site
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal transition from {from} on {event}")]
pub struct StateError {
    pub from: &'static str,
    pub event: &'static str,
}

impl Error {
    /// Create a generic error from a string
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Error::Other(msg.into())
    }

    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}
