//! Sample-rate conversion
//!
//! The supported telephony/provider family (8/16/24 kHz) reduces to small
//! rational ratios and goes through a fixed polyphase windowed-sinc kernel
//! with a deterministic output length of `ceil(n * dst / src)`. Ratios
//! outside the family fall back to rubato's FFT resampler.

use rubato::{FftFixedIn, Resampler as RubatoResampler};
use tracing::warn;

use voxflow_core::error::AudioError;

use crate::pcm::clamp_sample;

/// Sample rates served by the fixed polyphase kernel
const KERNEL_FAMILY: [u32; 3] = [8000, 16000, 24000];

/// Sinc taps per polyphase branch
const TAPS_PER_PHASE: usize = 24;

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Fixed-ratio resampler for 16-bit mono audio
pub struct Resampler {
    src_rate: u32,
    dst_rate: u32,
    kernel: Option<Polyphase>,
}

impl Resampler {
    pub fn new(src_rate: u32, dst_rate: u32) -> Result<Self, AudioError> {
        if src_rate == 0 {
            return Err(AudioError::UnsupportedSampleRate(src_rate));
        }
        if dst_rate == 0 {
            return Err(AudioError::UnsupportedSampleRate(dst_rate));
        }
        let kernel = if src_rate != dst_rate
            && KERNEL_FAMILY.contains(&src_rate)
            && KERNEL_FAMILY.contains(&dst_rate)
        {
            Some(Polyphase::design(src_rate, dst_rate))
        } else {
            None
        };
        Ok(Self {
            src_rate,
            dst_rate,
            kernel,
        })
    }

    pub fn src_rate(&self) -> u32 {
        self.src_rate
    }

    pub fn dst_rate(&self) -> u32 {
        self.dst_rate
    }

    /// Number of output samples produced for `input_len` input samples
    pub fn output_len(&self, input_len: usize) -> usize {
        if self.src_rate == self.dst_rate {
            return input_len;
        }
        let n = input_len as u64 * self.dst_rate as u64;
        n.div_ceil(self.src_rate as u64) as usize
    }

    /// Resample one buffer. Identical rates return the input unchanged.
    pub fn resample(&self, input: &[i16]) -> Result<Vec<i16>, AudioError> {
        if self.src_rate == self.dst_rate {
            return Ok(input.to_vec());
        }
        if input.is_empty() {
            return Ok(Vec::new());
        }
        match &self.kernel {
            Some(kernel) => Ok(kernel.apply(input, self.output_len(input.len()))),
            None => self.resample_fft(input),
        }
    }

    /// FFT path for ratios outside the kernel family
    fn resample_fft(&self, input: &[i16]) -> Result<Vec<i16>, AudioError> {
        let chunk = input.len().min(1024);
        let mut resampler = FftFixedIn::<f64>::new(
            self.src_rate as usize,
            self.dst_rate as usize,
            chunk,
            2,
            1,
        )
        .map_err(|e| AudioError::Resampling(e.to_string()))?;

        let mut output: Vec<i16> = Vec::with_capacity(self.output_len(input.len()));
        let mut frame = vec![0f64; chunk];
        for block in input.chunks(chunk) {
            frame.iter_mut().for_each(|v| *v = 0.0);
            for (dst, &src) in frame.iter_mut().zip(block.iter()) {
                *dst = src as f64 / 32768.0;
            }
            let processed = resampler
                .process(&[frame.clone()], None)
                .map_err(|e| {
                    warn!(error = %e, "fft resampler chunk failed");
                    AudioError::Resampling(e.to_string())
                })?;
            output.extend(
                processed[0]
                    .iter()
                    .map(|&v| clamp_sample((v * 32768.0).round() as i32)),
            );
        }
        output.resize(self.output_len(input.len()), 0);
        Ok(output)
    }
}

/// A designed polyphase interpolation/decimation kernel for one rational
/// ratio L/M
struct Polyphase {
    l: usize,
    m: usize,
    /// `l` branches of `TAPS_PER_PHASE` coefficients each
    branches: Vec<Vec<f32>>,
}

impl Polyphase {
    fn design(src_rate: u32, dst_rate: u32) -> Self {
        let g = gcd(src_rate, dst_rate);
        let l = (dst_rate / g) as usize;
        let m = (src_rate / g) as usize;

        let taps = TAPS_PER_PHASE * l;
        let center = (taps - 1) as f64 / 2.0;
        // Cutoff at the tighter of the two Nyquist edges, in the upsampled
        // domain
        let fc = 0.5 / l.max(m) as f64;

        let mut proto = vec![0f64; taps];
        for (i, tap) in proto.iter_mut().enumerate() {
            let x = i as f64 - center;
            let sinc = if x == 0.0 {
                1.0
            } else {
                let px = std::f64::consts::PI * 2.0 * fc * x;
                px.sin() / px
            };
            // Blackman window
            let w = 0.42
                - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / (taps - 1) as f64).cos()
                + 0.08 * (4.0 * std::f64::consts::PI * i as f64 / (taps - 1) as f64).cos();
            *tap = 2.0 * fc * sinc * w;
        }

        // Split into branches and normalize each branch to unit DC gain so a
        // constant signal passes through exactly
        let mut branches = Vec::with_capacity(l);
        for phase in 0..l {
            let mut branch: Vec<f64> = (0..TAPS_PER_PHASE)
                .map(|k| proto.get(phase + k * l).copied().unwrap_or(0.0))
                .collect();
            let sum: f64 = branch.iter().sum();
            if sum.abs() > f64::EPSILON {
                branch.iter_mut().for_each(|c| *c /= sum);
            }
            branches.push(branch.into_iter().map(|c| c as f32).collect());
        }

        Self { l, m, branches }
    }

    fn apply(&self, input: &[i16], output_len: usize) -> Vec<i16> {
        let half = (TAPS_PER_PHASE / 2) as isize;
        let len = input.len() as isize;
        let mut output = Vec::with_capacity(output_len);

        for j in 0..output_len {
            let up = j * self.m;
            let phase = up % self.l;
            let n0 = (up / self.l) as isize;

            let mut acc = 0f32;
            for (k, &coef) in self.branches[phase].iter().enumerate() {
                let idx = n0 + half - k as isize;
                if idx >= 0 && idx < len {
                    acc += coef * input[idx as usize] as f32;
                }
            }
            output.push(clamp_sample(acc.round() as i32));
        }
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_is_passthrough() {
        let r = Resampler::new(16000, 16000).unwrap();
        let input: Vec<i16> = (0..100).map(|i| (i * 10) as i16).collect();
        assert_eq!(r.resample(&input).unwrap(), input);
    }

    #[test]
    fn test_output_length_exact_for_family() {
        for (src, dst) in [
            (8000u32, 16000u32),
            (8000, 24000),
            (16000, 8000),
            (16000, 24000),
            (24000, 8000),
            (24000, 16000),
        ] {
            let r = Resampler::new(src, dst).unwrap();
            let input = vec![0i16; 800];
            let out = r.resample(&input).unwrap();
            let expected = (800usize * dst as usize).div_ceil(src as usize);
            assert_eq!(out.len(), expected, "{src}->{dst}");
        }
    }

    #[test]
    fn test_silence_stays_silent() {
        let r = Resampler::new(8000, 16000).unwrap();
        let out = r.resample(&vec![0i16; 8000]).unwrap();
        assert_eq!(out.len(), 16000);
        assert!(out.iter().all(|&s| s.abs() <= 4));
    }

    #[test]
    fn test_dc_preserved() {
        let r = Resampler::new(16000, 24000).unwrap();
        let out = r.resample(&vec![1000i16; 4800]).unwrap();
        // Interior samples of a constant signal survive the filter exactly
        let interior = &out[TAPS_PER_PHASE..out.len() - TAPS_PER_PHASE];
        for &s in interior {
            assert!((s as i32 - 1000).abs() <= 2, "sample {s}");
        }
    }

    #[test]
    fn test_sine_energy_survives_downsampling() {
        let r = Resampler::new(16000, 8000).unwrap();
        // 440 Hz tone, well under the 4 kHz target Nyquist
        let input: Vec<i16> = (0..1600)
            .map(|i| {
                let t = i as f64 / 16000.0;
                ((2.0 * std::f64::consts::PI * 440.0 * t).sin() * 8000.0) as i16
            })
            .collect();
        let out = r.resample(&input).unwrap();
        assert_eq!(out.len(), 800);

        let rms = |xs: &[i16]| {
            (xs.iter().map(|&x| (x as f64).powi(2)).sum::<f64>() / xs.len() as f64).sqrt()
        };
        let in_rms = rms(&input);
        let out_rms = rms(&out[TAPS_PER_PHASE..out.len() - TAPS_PER_PHASE]);
        assert!(
            (out_rms - in_rms).abs() / in_rms < 0.1,
            "rms {out_rms} vs {in_rms}"
        );
    }

    #[test]
    fn test_fft_fallback_for_foreign_rate() {
        let r = Resampler::new(44100, 16000).unwrap();
        let input = vec![0i16; 4410];
        let out = r.resample(&input).unwrap();
        assert_eq!(out.len(), r.output_len(4410));
    }

    #[test]
    fn test_zero_rate_rejected() {
        assert!(Resampler::new(0, 16000).is_err());
        assert!(Resampler::new(16000, 0).is_err());
    }
}
