//! Text processing for the speech path
//!
//! - Streaming sentence tokenization between the LLM and TTS
//! - Chat-markup stripping and pronunciation normalization ahead of synthesis
//! - `{key}` template rendering for greeting / mistake / idle texts

mod normalizer;
mod numbers;
mod pronounce;
mod template;
mod tokenizer;

pub use normalizer::SpeechNormalizer;
pub use numbers::number_to_words;
pub use template::render_template;
pub use tokenizer::SentenceTokenizer;
