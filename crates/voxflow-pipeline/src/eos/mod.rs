//! End-of-speech detection
//!
//! Decides when the user has stopped talking, from three input kinds: final
//! user text, system text (agent interjections) and streaming STT
//! hypotheses.

mod silence;

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use voxflow_core::Result;

pub use silence::SilenceEndOfSpeech;

/// One input observed by the detector
#[derive(Debug, Clone)]
pub enum EosInput {
    /// Final user text; triggers the callback immediately
    User { message: String, time: SystemTime },
    /// Agent-side activity; arms the base silence window
    System { time: SystemTime },
    /// A streaming STT hypothesis
    Stt {
        message: String,
        is_complete: bool,
        time: SystemTime,
    },
}

impl EosInput {
    pub fn user(message: impl Into<String>) -> Self {
        EosInput::User {
            message: message.into(),
            time: SystemTime::now(),
        }
    }

    pub fn system() -> Self {
        EosInput::System {
            time: SystemTime::now(),
        }
    }

    pub fn stt(message: impl Into<String>, is_complete: bool) -> Self {
        EosInput::Stt {
            message: message.into(),
            is_complete,
            time: SystemTime::now(),
        }
    }
}

/// Callback payload: the detected utterance with Unix-epoch fractional
/// second bounds
#[derive(Debug, Clone)]
pub struct EndOfSpeechResult {
    pub start_at: f64,
    pub end_at: f64,
    pub speech: String,
}

/// Invoked once per detected utterance
pub type EosCallback = Arc<dyn Fn(EndOfSpeechResult) + Send + Sync>;

/// Detector contract
#[async_trait]
pub trait EndOfSpeech: Send + Sync {
    fn name(&self) -> &'static str;

    /// Feed one input; may arm, shorten or bypass the silence window
    async fn analyze(&self, input: EosInput) -> Result<()>;

    /// Stop any armed timer and release resources
    fn close(&self);
}
