//! Shared output clock, gain and mixer
//!
//! The bus counts rendered frames; that count is the monotonic output clock
//! the playback scheduler reads. Scheduled voices are mixed in by the render
//! callback and drop out of the playing set once their last sample is out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Sample rate of inbound assistant speech and of the output clock
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// A scheduled buffer on the bus
struct Voice {
    id: u64,
    start: u64,
    samples: Vec<f32>,
}

impl Voice {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

struct BusState {
    position: u64,
    gain: f32,
    voices: Vec<Voice>,
    next_id: u64,
}

/// Output clock and mixer shared between the scheduler and the speaker stream
#[derive(Clone)]
pub struct OutputBus {
    state: Arc<Mutex<BusState>>,
    sample_rate: u32,
}

impl std::fmt::Debug for OutputBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("OutputBus")
            .field("sample_rate", &self.sample_rate)
            .field("position", &state.position)
            .field("gain", &state.gain)
            .field("playing", &state.voices.len())
            .finish()
    }
}

impl Default for OutputBus {
    fn default() -> Self {
        Self::new(PLAYBACK_SAMPLE_RATE)
    }
}

impl OutputBus {
    /// Create a bus running at `sample_rate` with unity gain
    #[must_use]
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(BusState {
                position: 0,
                gain: 1.0,
                voices: Vec::new(),
                next_id: 0,
            })),
            sample_rate,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clock rate in frames per second
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Current clock position in frames
    #[must_use]
    pub fn position(&self) -> u64 {
        self.lock().position
    }

    /// Current clock position as elapsed time
    #[must_use]
    pub fn now(&self) -> Duration {
        frames_to_duration(self.position(), self.sample_rate)
    }

    /// Current output gain in `[0, 1]`
    #[must_use]
    pub fn gain(&self) -> f32 {
        self.lock().gain
    }

    /// Set the output gain; the value is clamped to `[0, 1]`
    pub(crate) fn set_gain(&self, gain: f32) {
        let gain = if gain.is_finite() { gain.clamp(0.0, 1.0) } else { 0.0 };
        self.lock().gain = gain;
        tracing::debug!(gain, "output gain updated");
    }

    /// Number of voices currently scheduled or sounding
    #[must_use]
    pub fn playing(&self) -> usize {
        self.lock().voices.len()
    }

    /// Place `samples` on the bus no earlier than `not_before`
    ///
    /// If the clock has already passed `not_before` the voice starts at the
    /// current position. Returns the voice ID and its start frame.
    pub(crate) fn schedule(&self, not_before: u64, samples: Vec<f32>) -> (u64, u64) {
        let mut state = self.lock();
        let start = not_before.max(state.position);
        let id = state.next_id;
        state.next_id += 1;
        state.voices.push(Voice { id, start, samples });
        (id, start)
    }

    /// Stop every voice immediately; returns how many were stopped
    pub fn stop_all(&self) -> usize {
        let mut state = self.lock();
        let stopped = state.voices.len();
        state.voices.clear();
        stopped
    }

    /// Whether the voice with `id` is still on the bus
    #[must_use]
    pub fn is_playing(&self, id: u64) -> bool {
        self.lock().voices.iter().any(|v| v.id == id)
    }

    /// Wait for the voice with `id` to finish, giving up after `limit`
    ///
    /// Returns whether the voice finished. A speaker stream that stopped
    /// rendering never advances the clock, hence the limit.
    pub async fn wait_finished(&self, id: u64, limit: Duration) -> bool {
        tokio::time::timeout(limit, async {
            while self.is_playing(id) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Mix the next `frames` frames into a mono buffer and advance the clock
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn render_mono(&self, frames: usize) -> Vec<f32> {
        let mut mix = vec![0.0f32; frames];
        let mut state = self.lock();
        let from = state.position;
        let to = from + frames as u64;

        for voice in &state.voices {
            let begin = voice.start.max(from);
            let end = voice.end().min(to);
            if begin >= end {
                continue;
            }
            for t in begin..end {
                mix[(t - from) as usize] += voice.samples[(t - voice.start) as usize];
            }
        }

        let gain = state.gain;
        for sample in &mut mix {
            *sample = (*sample * gain).clamp(-1.0, 1.0);
        }

        state.position = to;
        state.voices.retain(|v| v.end() > to);
        mix
    }

    /// Render into an interleaved buffer with `channels` channels
    pub fn render(&self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let mix = self.render_mono(out.len() / channels);
        for (frame, sample) in out.chunks_mut(channels).zip(mix) {
            frame.fill(sample);
        }
    }
}

/// Convert a frame count at `sample_rate` into a duration
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = u64::from(sample_rate);
    let nanos = u128::from(frames % rate) * 1_000_000_000 / u128::from(rate);
    Duration::new(frames / rate, nanos as u32)
}
