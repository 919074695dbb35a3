//! Audio bridge: bit-exact format conversion between carrier and provider
//! audio
//!
//! Supported formats: μ-law 8-bit at 8 kHz mono, linear PCM 16-bit LE at
//! 8/16/24 kHz, mono↔stereo. The conversion pipeline order is deterministic:
//!
//! ```text
//! input format → linear PCM 16 → resample → channel conversion → output format
//! ```
//!
//! Identical (src, dst) configurations are a zero-copy pass-through. Linear
//! samples saturate to [-32768, 32767] on overflow, never wrap.

mod channels;
mod converter;
mod mulaw;
mod pcm;
mod recorder;
mod resampler;

pub use channels::{downmix_to_mono, upmix_to_stereo};
pub use converter::AudioConverter;
pub use mulaw::{mulaw_decode, mulaw_decode_buf, mulaw_encode, mulaw_encode_buf};
pub use pcm::{pcm_from_bytes, pcm_to_bytes};
pub use recorder::CallRecorder;
pub use resampler::Resampler;
