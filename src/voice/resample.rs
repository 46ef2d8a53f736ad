//! Streaming sample-rate conversion for device streams
//!
//! Device callbacks hand over buffers of arbitrary length. The resampler
//! keeps its filter state and any leftover input between calls, so chunk
//! boundaries never drop or duplicate samples.

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

const CHUNK_SIZE: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Mono resampler that carries state across device callbacks
pub struct StreamResampler {
    resampler: FftFixedIn<f32>,
    pending: Vec<f32>,
    ready: Vec<f32>,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("pending", &self.pending.len())
            .field("ready", &self.ready.len())
            .finish_non_exhaustive()
    }
}

impl StreamResampler {
    /// Convert mono audio from `from_rate` to `to_rate`
    ///
    /// # Errors
    ///
    /// Returns an audio error if rubato rejects the rate pair
    #[allow(clippy::cast_possible_truncation)]
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let resampler = FftFixedIn::<f32>::new(
            from_rate as usize,
            to_rate as usize,
            CHUNK_SIZE,
            SUB_CHUNKS,
            1,
        )
        .map_err(|e| Error::Audio(format!("resampler init failed: {e}")))?;

        Ok(Self {
            resampler,
            pending: Vec::new(),
            ready: Vec::new(),
        })
    }

    /// Input samples held back until a full chunk is available
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Converted samples not yet handed out by [`Self::pull`]
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.ready.len()
    }

    /// Push input and emit every chunk that can be converted
    ///
    /// # Errors
    ///
    /// Returns an audio error if rubato fails on a chunk
    pub fn push(&mut self, input: &[f32], emit: &mut dyn FnMut(&[f32])) -> Result<()> {
        self.pending.extend_from_slice(input);
        loop {
            let needed = self.resampler.input_frames_next();
            if self.pending.len() < needed {
                return Ok(());
            }
            let out = self
                .resampler
                .process(&[&self.pending[..needed]], None)
                .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
            self.pending.drain(..needed);
            if let Some(channel) = out.first() {
                emit(channel);
            }
        }
    }

    /// Produce exactly `frames` converted samples, drawing whole input
    /// chunks from `source` as needed
    ///
    /// `source(n)` must return `n` samples.
    ///
    /// # Errors
    ///
    /// Returns an audio error if rubato fails on a chunk
    pub fn pull(
        &mut self,
        frames: usize,
        mut source: impl FnMut(usize) -> Vec<f32>,
    ) -> Result<Vec<f32>> {
        while self.ready.len() < frames {
            let needed = self.resampler.input_frames_next();
            let input = source(needed);
            let out = self
                .resampler
                .process(&[input], None)
                .map_err(|e| Error::Audio(format!("resample failed: {e}")))?;
            match out.into_iter().next() {
                Some(channel) if !channel.is_empty() => self.ready.extend(channel),
                _ => break,
            }
        }

        let n = frames.min(self.ready.len());
        Ok(self.ready.drain(..n).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_the_remainder_between_calls() {
        let mut resampler = StreamResampler::new(44_100, 16_000).unwrap();
        let mut produced = 0usize;
        let mut fed = 0usize;

        // 512-frame callbacks do not divide the chunk size
        for _ in 0..200 {
            resampler
                .push(&[0.1; 512], &mut |out| produced += out.len())
                .unwrap();
            fed += 512;
        }

        let consumed = fed - resampler.pending();
        assert_eq!(consumed * 16_000, produced * 44_100);
        assert!(resampler.pending() < resampler.resampler.input_frames_next());
    }

    #[test]
    fn pull_returns_exactly_what_was_asked() {
        let mut resampler = StreamResampler::new(24_000, 48_000).unwrap();
        let mut consumed = 0usize;

        for _ in 0..50 {
            let out = resampler
                .pull(441, |n| {
                    consumed += n;
                    vec![0.0; n]
                })
                .unwrap();
            assert_eq!(out.len(), 441);
        }

        assert_eq!(consumed * 2, 50 * 441 + resampler.buffered());
    }
}
