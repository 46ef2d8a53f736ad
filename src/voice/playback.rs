//! Gapless scheduling of streamed assistant speech
//!
//! Inbound speech arrives as many short PCM chunks. Each one is placed on
//! the output bus directly after the previous one so they play back-to-back
//! without overlap. A barge-in clears everything and rewinds the cursor to
//! the output clock.

use std::time::Duration;

use super::codec::decode_pcm16;
use super::output::{OutputBus, frames_to_duration};
use crate::Result;

/// A decoded buffer placed on the output clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackItem {
    /// Voice ID on the bus
    pub id: u64,
    /// Start position in output frames
    pub start: u64,
    /// Length in output frames
    pub frames: u64,
    /// Output clock rate
    pub sample_rate: u32,
}

impl PlaybackItem {
    /// Frame just past the last sample
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.frames
    }

    /// Scheduled start on the output clock
    #[must_use]
    pub fn start_time(&self) -> Duration {
        frames_to_duration(self.start, self.sample_rate)
    }

    /// Playback length
    #[must_use]
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.frames, self.sample_rate)
    }
}

/// Schedules speech buffers on a shared [`OutputBus`]
#[derive(Debug)]
pub struct PlaybackScheduler {
    bus: OutputBus,
    next_start: u64,
}

impl PlaybackScheduler {
    /// Create a scheduler whose cursor starts at the bus clock
    #[must_use]
    pub fn new(bus: OutputBus) -> Self {
        let next_start = bus.position();
        Self { bus, next_start }
    }

    /// The bus this scheduler writes to
    #[must_use]
    pub const fn bus(&self) -> &OutputBus {
        &self.bus
    }

    /// Frame at which the next buffer will start, unless the clock has passed it
    #[must_use]
    pub const fn next_start(&self) -> u64 {
        self.next_start
    }

    /// Decode a PCM16 chunk and schedule it
    ///
    /// # Errors
    ///
    /// Returns a decode error if the chunk is malformed; the cursor is left
    /// untouched so later chunks are unaffected.
    pub fn enqueue(&mut self, chunk: &[u8]) -> Result<Option<PlaybackItem>> {
        let samples = decode_pcm16(chunk)?;
        Ok(self.schedule(samples))
    }

    /// Schedule decoded samples right after the previous buffer
    ///
    /// Returns `None` for an empty buffer.
    pub fn schedule(&mut self, samples: Vec<f32>) -> Option<PlaybackItem> {
        if samples.is_empty() {
            return None;
        }

        let frames = samples.len() as u64;
        let (id, start) = self.bus.schedule(self.next_start, samples);
        self.next_start = start + frames;

        tracing::trace!(id, start, frames, "speech buffer scheduled");

        Some(PlaybackItem {
            id,
            start,
            frames,
            sample_rate: self.bus.sample_rate(),
        })
    }

    /// Stop everything and rewind the cursor to the output clock
    ///
    /// Returns how many buffers were cut off.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.bus.stop_all();
        self.next_start = self.bus.position();
        if stopped > 0 {
            tracing::debug!(stopped, "playback interrupted");
        }
        stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::codec::encode_pcm16;

    fn scheduler() -> PlaybackScheduler {
        PlaybackScheduler::new(OutputBus::new(24_000))
    }

    #[test]
    fn consecutive_items_are_back_to_back() {
        let mut s = scheduler();
        let a = s.schedule(vec![0.1; 2400]).unwrap();
        let b = s.schedule(vec![0.1; 1200]).unwrap();

        assert_eq!(a.start, 0);
        assert_eq!(b.start, a.end());
        assert_eq!(a.duration(), Duration::from_millis(100));
        assert_eq!(b.start_time(), Duration::from_millis(100));
    }

    #[test]
    fn cursor_catches_up_after_underrun() {
        let mut s = scheduler();
        let a = s.schedule(vec![0.1; 100]).unwrap();
        let _ = s.bus().render_mono(1000);

        let b = s.schedule(vec![0.1; 100]).unwrap();
        assert!(b.start >= a.end());
        assert_eq!(b.start, 1000);
    }

    #[test]
    fn interrupt_resets_cursor_to_now() {
        let mut s = scheduler();
        s.schedule(vec![0.1; 24_000]);
        s.schedule(vec![0.1; 24_000]);
        let _ = s.bus().render_mono(300);

        assert_eq!(s.interrupt(), 2);
        assert_eq!(s.bus().playing(), 0);
        assert_eq!(s.next_start(), 300);

        let next = s.schedule(vec![0.1; 10]).unwrap();
        assert_eq!(next.start, 300);
    }

    #[test]
    fn undecodable_chunk_leaves_cursor_alone() {
        let mut s = scheduler();
        s.enqueue(&encode_pcm16(&[0.1; 50])).unwrap();
        let before = s.next_start();

        assert!(s.enqueue(&[1, 2, 3]).is_err());
        assert_eq!(s.next_start(), before);

        let item = s.enqueue(&encode_pcm16(&[0.1; 50])).unwrap().unwrap();
        assert_eq!(item.start, before);
    }

    #[test]
    fn empty_chunk_schedules_nothing() {
        let mut s = scheduler();
        assert!(s.enqueue(&[]).unwrap().is_none());
        assert_eq!(s.bus().playing(), 0);
    }
}
