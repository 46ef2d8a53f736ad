//! Wire sample format conversion
//!
//! Outbound and inbound audio travel as 16-bit little-endian mono PCM.

use crate::{Error, Result};

/// Encode normalized samples as 16-bit little-endian PCM
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decode 16-bit little-endian PCM into normalized samples
///
/// # Errors
///
/// Returns [`Error::Decode`] if the buffer holds a partial sample
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::Decode(format!(
            "odd PCM16 buffer length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Average interleaved channels down to mono
#[must_use]
pub fn to_mono(samples: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let ch = usize::from(channels);
    samples
        .chunks_exact(ch)
        .map(|frame| frame.iter().sum::<f32>() / f32::from(channels))
        .collect()
}
