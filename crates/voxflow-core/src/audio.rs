//! Audio configuration at the transport/provider boundary

use serde::{Deserialize, Serialize};

/// Sample encoding on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// μ-law companded, 8 bits per sample
    MuLaw8,
    /// Linear PCM, 16-bit little-endian
    Linear16,
}

impl AudioFormat {
    /// Bytes per sample in this encoding
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            AudioFormat::MuLaw8 => 1,
            AudioFormat::Linear16 => 2,
        }
    }
}

/// A concrete audio stream configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u32,
}

impl AudioConfig {
    pub fn new(format: AudioFormat, sample_rate: u32, channels: u32) -> Self {
        Self {
            format,
            sample_rate,
            channels,
        }
    }

    /// μ-law 8 kHz mono, the telephony carrier format
    pub fn mulaw_8khz_mono() -> Self {
        Self::new(AudioFormat::MuLaw8, 8000, 1)
    }

    /// Linear PCM 16-bit 8 kHz mono
    pub fn linear_8khz_mono() -> Self {
        Self::new(AudioFormat::Linear16, 8000, 1)
    }

    /// Linear PCM 16-bit 16 kHz mono, the usual STT input format
    pub fn linear_16khz_mono() -> Self {
        Self::new(AudioFormat::Linear16, 16000, 1)
    }

    /// Linear PCM 16-bit 24 kHz mono, the usual TTS output format
    pub fn linear_24khz_mono() -> Self {
        Self::new(AudioFormat::Linear16, 24000, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let mulaw = AudioConfig::mulaw_8khz_mono();
        assert_eq!(mulaw.sample_rate, 8000);
        assert_eq!(mulaw.format, AudioFormat::MuLaw8);
        assert_eq!(mulaw.channels, 1);

        let l16 = AudioConfig::linear_16khz_mono();
        assert_eq!(l16.sample_rate, 16000);
        assert_eq!(l16.format, AudioFormat::Linear16);

        let l24 = AudioConfig::linear_24khz_mono();
        assert_eq!(l24.sample_rate, 24000);

        let l8 = AudioConfig::linear_8khz_mono();
        assert_eq!(l8.sample_rate, 8000);
        assert_eq!(l8.format, AudioFormat::Linear16);
    }

    #[test]
    fn test_bytes_per_sample() {
        assert_eq!(AudioFormat::MuLaw8.bytes_per_sample(), 1);
        assert_eq!(AudioFormat::Linear16.bytes_per_sample(), 2);
    }
}
