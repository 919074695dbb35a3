//! Text-to-speech provider contract

mod streaming;

use std::sync::Arc;

use async_trait::async_trait;

use voxflow_core::{AudioConfig, AudioFormat, Options, Result};

pub use streaming::StreamingTts;

/// Per-chunk synthesis options
#[derive(Debug, Clone)]
pub struct SpeakOptions {
    /// The turn this text belongs to. A change of context while a previous
    /// turn is still speaking preempts the previous synthesis.
    pub context_id: String,
    /// Marks the last chunk of the turn and triggers a flush
    pub is_complete: bool,
}

/// Callbacks registered at construction; the provider's reader task invokes
/// them as upstream events arrive
#[derive(Clone)]
pub struct TtsCallbacks {
    /// Synthesized audio for a context
    pub on_speech: Arc<dyn Fn(String, Vec<u8>) + Send + Sync>,
    /// Flush completed for a context
    pub on_complete: Arc<dyn Fn(String) + Send + Sync>,
}

/// Text-to-speech contract
#[async_trait]
pub trait TextToSpeech: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open the upstream connection and start the reader task
    async fn initialize(&self) -> Result<()>;

    /// Stream one text chunk into the current synthesis
    async fn transform(&self, text: &str, opts: &SpeakOptions) -> Result<()>;

    /// Tear down the upstream connection
    async fn close(&self) -> Result<()>;
}

/// Speak-side options resolved from the dotted `speak.*` keys
#[derive(Debug, Clone)]
pub struct TtsOptions {
    pub voice: String,
    pub encoding: String,
    pub sample_rate: u32,
}

impl TtsOptions {
    pub fn resolve(audio: &AudioConfig, options: &Options) -> Self {
        let encoding = options
            .get_string("speak.output_format.encoding")
            .unwrap_or_else(|| match audio.format {
                AudioFormat::Linear16 => "linear16".to_string(),
                AudioFormat::MuLaw8 => "mulaw".to_string(),
            });
        Self {
            voice: options
                .get_string("speak.voice.id")
                .unwrap_or_else(|| "aura-asteria-en".to_string()),
            encoding,
            sample_rate: options
                .get_u32("speak.output_format.sample_rate")
                .unwrap_or(audio.sample_rate),
        }
    }
}
