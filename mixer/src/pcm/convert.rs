//! PCM16 <-> f32 sample conversion.

/// Converts a signed 16-bit sample to f32 in [-1.0, 1.0].
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    if sample >= 0 {
        sample as f32 / 32767.0
    } else {
        sample as f32 / 32768.0
    }
}

/// Converts an f32 sample to signed 16-bit, clipping to [-1.0, 1.0].
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    let t = sample.clamp(-1.0, 1.0);
    if t >= 0.0 {
        (t * 32767.0) as i16
    } else {
        (t * 32768.0) as i16
    }
}

/// Decodes little-endian PCM16 bytes into f32 samples.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16(data: &[u8]) -> Vec<f32> {
    data.chunks_exact(2)
        .map(|b| i16_to_f32(i16::from_le_bytes([b[0], b[1]])))
        .collect()
}

/// Encodes f32 samples into `out` as little-endian PCM16.
///
/// Returns the number of bytes written, limited by the shorter of the two.
pub fn encode_pcm16(samples: &[f32], out: &mut [u8]) -> usize {
    let n = samples.len().min(out.len() / 2);
    for (i, s) in samples[..n].iter().enumerate() {
        let bytes = f32_to_i16(*s).to_le_bytes();
        out[i * 2] = bytes[0];
        out[i * 2 + 1] = bytes[1];
    }
    n * 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scale() {
        assert_eq!(f32_to_i16(1.0), 32767);
        assert_eq!(f32_to_i16(-1.0), -32768);
        assert_eq!(i16_to_f32(32767), 1.0);
        assert_eq!(i16_to_f32(-32768), -1.0);
    }

    #[test]
    fn test_clipping() {
        assert_eq!(f32_to_i16(3.0), 32767);
        assert_eq!(f32_to_i16(-3.0), -32768);
    }

    #[test]
    fn test_encode_limited_by_output() {
        let samples = [0.5f32; 4];
        let mut out = [0u8; 5];
        assert_eq!(encode_pcm16(&samples, &mut out), 4);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 16383);
    }

    #[test]
    fn test_decode_ignores_odd_byte() {
        let decoded = decode_pcm16(&[0xff, 0x7f, 0x01]);
        assert_eq!(decoded, vec![1.0]);
    }
}
