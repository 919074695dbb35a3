//! Speech-to-text provider contract

mod streaming;

use std::sync::Arc;

use async_trait::async_trait;

use voxflow_core::{AudioConfig, AudioFormat, Options, Result};

pub use streaming::StreamingStt;

/// One transcription event from the provider
#[derive(Debug, Clone)]
pub struct Transcript {
    pub text: String,
    pub confidence: f64,
    pub language: String,
    /// Distinguishes finalized words from interim hypotheses
    pub is_final: bool,
}

/// Invoked for every transcript the upstream emits
pub type TranscriptCallback = Arc<dyn Fn(Transcript) + Send + Sync>;

/// Speech-to-text contract. Input audio must match the negotiated
/// configuration the provider was initialized with.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open the upstream connection and start the reader task
    async fn initialize(&self) -> Result<()>;

    /// Push one raw audio chunk upstream
    async fn transform(&self, audio: &[u8]) -> Result<()>;

    /// Flush and tear down the upstream connection
    async fn close(&self) -> Result<()>;
}

/// Listen-side options resolved from the dotted `listen.*` keys
#[derive(Debug, Clone)]
pub struct SttOptions {
    pub model: String,
    pub language: String,
    pub channels: u32,
    pub smart_format: bool,
    pub interim_results: bool,
    pub filler_words: bool,
    pub vad_events: bool,
    pub endpointing: String,
    pub punctuate: bool,
    pub no_delay: bool,
    pub multichannel: bool,
    pub utterance_end_ms: Option<String>,
    pub keywords: Vec<String>,
    pub encoding: String,
    pub sample_rate: u32,
}

impl SttOptions {
    /// Resolve options against an audio configuration, falling back to the
    /// streaming defaults for anything unset
    pub fn resolve(audio: &AudioConfig, options: &Options) -> Self {
        Self {
            model: options
                .get_string("listen.model")
                .unwrap_or_else(|| "nova-2".to_string()),
            language: options
                .get_string("listen.language")
                .unwrap_or_else(|| "en-US".to_string()),
            channels: options.get_u32("listen.channel").unwrap_or(audio.channels),
            smart_format: options.get_bool("listen.smart_format").unwrap_or(true),
            interim_results: true,
            filler_words: options.get_bool("listen.filler_words").unwrap_or(true),
            vad_events: options.get_bool("listen.vad_events").unwrap_or(false),
            endpointing: options
                .get_string("listen.endpointing")
                .unwrap_or_else(|| "5".to_string()),
            punctuate: true,
            no_delay: true,
            multichannel: options.get_bool("listen.multichannel").unwrap_or(false),
            utterance_end_ms: options.get_string("listen.utterance_end"),
            keywords: options.get_string_list("listen.keyword").unwrap_or_default(),
            encoding: match audio.format {
                AudioFormat::Linear16 => "linear16".to_string(),
                AudioFormat::MuLaw8 => "mulaw".to_string(),
            },
            sample_rate: audio.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let opts = SttOptions::resolve(&AudioConfig::mulaw_8khz_mono(), &Options::new());
        assert_eq!(opts.model, "nova-2");
        assert_eq!(opts.language, "en-US");
        assert_eq!(opts.encoding, "mulaw");
        assert_eq!(opts.sample_rate, 8000);
        assert!(opts.interim_results);
        assert!(opts.smart_format);
        assert!(!opts.vad_events);
    }

    #[test]
    fn test_dotted_overrides() {
        let options = Options::new()
            .with("listen.model", json!("nova-3"))
            .with("listen.language", json!("de"))
            .with("listen.smart_format", json!(false))
            .with("listen.utterance_end", json!("1000"))
            .with("listen.keyword", json!("[voxflow telephony]"));
        let opts = SttOptions::resolve(&AudioConfig::linear_16khz_mono(), &options);
        assert_eq!(opts.model, "nova-3");
        assert_eq!(opts.language, "de");
        assert!(!opts.smart_format);
        assert_eq!(opts.encoding, "linear16");
        assert_eq!(opts.utterance_end_ms.as_deref(), Some("1000"));
        assert_eq!(opts.keywords, vec!["voxflow", "telephony"]);
    }
}
