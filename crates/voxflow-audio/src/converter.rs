//! The deterministic conversion pipeline between two audio configurations

use voxflow_core::audio::{AudioConfig, AudioFormat};
use voxflow_core::error::AudioError;

use crate::channels::{downmix_to_mono, upmix_to_stereo};
use crate::mulaw::{mulaw_decode_buf, mulaw_encode_buf};
use crate::pcm::{pcm_from_bytes, pcm_to_bytes};
use crate::resampler::Resampler;

/// Converts byte buffers between a fixed (src, dst) configuration pair.
///
/// Conversion order: input format → linear PCM 16 → resample → channel
/// conversion → output format. Identical configurations are a zero-copy
/// pass-through. A failure produces no partial output.
pub struct AudioConverter {
    src: AudioConfig,
    dst: AudioConfig,
    resampler: Resampler,
}

impl AudioConverter {
    pub fn new(src: AudioConfig, dst: AudioConfig) -> Result<Self, AudioError> {
        if src.channels == 0 || src.channels > 2 {
            return Err(AudioError::UnsupportedChannels(src.channels));
        }
        if dst.channels == 0 || dst.channels > 2 {
            return Err(AudioError::UnsupportedChannels(dst.channels));
        }
        if src.format == AudioFormat::MuLaw8 && src.channels != 1 {
            return Err(AudioError::InvalidFormat(
                "mu-law input must be mono".to_string(),
            ));
        }
        Ok(Self {
            src,
            dst,
            resampler: Resampler::new(src.sample_rate, dst.sample_rate)?,
        })
    }

    pub fn src(&self) -> AudioConfig {
        self.src
    }

    pub fn dst(&self) -> AudioConfig {
        self.dst
    }

    /// Convert one buffer of source-format bytes to destination-format bytes
    pub fn convert(&self, data: &[u8]) -> Result<Vec<u8>, AudioError> {
        if self.src == self.dst {
            return Ok(data.to_vec());
        }
        if data.is_empty() {
            return Ok(Vec::new());
        }

        // Input format → linear
        let mut samples = match self.src.format {
            AudioFormat::MuLaw8 => mulaw_decode_buf(data),
            AudioFormat::Linear16 => pcm_from_bytes(data)?,
        };

        // Resample. Stereo is resampled per channel to keep interleaving
        // intact.
        if self.src.sample_rate != self.dst.sample_rate {
            samples = if self.src.channels == 2 {
                let left: Vec<i16> = samples.iter().copied().step_by(2).collect();
                let right: Vec<i16> = samples.iter().copied().skip(1).step_by(2).collect();
                let left = self.resampler.resample(&left)?;
                let right = self.resampler.resample(&right)?;
                let mut merged = Vec::with_capacity(left.len() * 2);
                for i in 0..left.len() {
                    merged.push(left[i]);
                    merged.push(right.get(i).copied().unwrap_or(0));
                }
                merged
            } else {
                self.resampler.resample(&samples)?
            };
        }

        // Channel conversion
        if self.src.channels != self.dst.channels {
            samples = match (self.src.channels, self.dst.channels) {
                (2, 1) => downmix_to_mono(&samples),
                (1, 2) => upmix_to_stereo(&samples),
                (s, d) => {
                    return Err(AudioError::InvalidFormat(format!(
                        "unsupported channel conversion {s} -> {d}"
                    )))
                }
            };
        }

        // Linear → output format
        Ok(match self.dst.format {
            AudioFormat::MuLaw8 => mulaw_encode_buf(&samples),
            AudioFormat::Linear16 => pcm_to_bytes(&samples),
        })
    }
}
