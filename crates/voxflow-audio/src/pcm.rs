//! Linear PCM 16-bit little-endian byte codec

use voxflow_core::error::AudioError;

/// Interpret a little-endian byte stream as 16-bit samples. An odd byte count
/// is a malformed frame.
pub fn pcm_from_bytes(data: &[u8]) -> Result<Vec<i16>, AudioError> {
    if data.len() % 2 != 0 {
        return Err(AudioError::Truncated(data.len()));
    }
    Ok(data
        .chunks_exact(2)
        .map(|c| i16::from_le_bytes([c[0], c[1]]))
        .collect())
}

/// Serialize 16-bit samples as little-endian bytes
pub fn pcm_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for s in samples {
        out.extend_from_slice(&s.to_le_bytes());
    }
    out
}

/// Saturate an accumulator to the 16-bit sample range
pub(crate) fn clamp_sample(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 1234];
        let bytes = pcm_to_bytes(&samples);
        assert_eq!(bytes.len(), samples.len() * 2);
        assert_eq!(pcm_from_bytes(&bytes).unwrap(), samples);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(matches!(
            pcm_from_bytes(&[0x01, 0x02, 0x03]),
            Err(AudioError::Truncated(3))
        ));
    }

    #[test]
    fn test_clamp_saturates() {
        assert_eq!(clamp_sample(40000), i16::MAX);
        assert_eq!(clamp_sample(-40000), i16::MIN);
        assert_eq!(clamp_sample(123), 123);
    }
}
