//! Cognitive providers: speech-to-text, text-to-speech and end-of-speech
//! detection
//!
//! Every provider follows the uniform `{initialize, transform, close}`
//! lifecycle. A provider owns its upstream connection inside an internal
//! reader task, multiplexes asynchronous server events back through the
//! callbacks registered at construction, and serializes outbound writes
//! under a single writer lock.

pub mod eos;
pub mod stt;
pub mod tts;

pub use eos::{EndOfSpeech, EndOfSpeechResult, EosCallback, EosInput, SilenceEndOfSpeech};
pub use stt::{SpeechToText, SttOptions, StreamingStt, Transcript, TranscriptCallback};
pub use tts::{SpeakOptions, StreamingTts, TextToSpeech, TtsCallbacks};
