//! Microphone capture and encoding
//!
//! Device samples (already mono at 16 kHz) are cut into fixed frames. Each
//! frame reports its RMS volume and, while a session is live, goes out as a
//! PCM16 chunk. Frames produced with no live session are dropped, never
//! queued.

use std::sync::{Arc, Mutex, PoisonError};

use super::codec::encode_pcm16;
use super::device::FrameCallback;
use super::meter::rms;
use crate::observer::Observers;
use crate::session::LiveLink;
use crate::{Error, Result};

/// Capture sample rate (16 kHz for speech)
pub const SAMPLE_RATE: u32 = 16_000;

/// Samples per capture frame
pub const FRAME_SIZE: usize = 4096;

/// Cuts a sample stream into fixed-size frames
#[derive(Debug)]
pub struct FrameAccumulator {
    pending: Vec<f32>,
    frame_size: usize,
}

impl FrameAccumulator {
    /// Create an accumulator emitting `frame_size`-sample frames
    #[must_use]
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            pending: Vec::with_capacity(frame_size),
            frame_size,
        }
    }

    /// Append samples, calling `on_frame` for every completed frame
    pub fn push(&mut self, mut samples: &[f32], mut on_frame: impl FnMut(&[f32])) {
        while !samples.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.frame_size {
                on_frame(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Samples waiting for the next frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Turns capture frames into volume reports and outbound audio chunks
pub struct CaptureEncoder {
    observers: Arc<Observers>,
    link: Mutex<Option<LiveLink>>,
}

impl std::fmt::Debug for CaptureEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureEncoder")
            .field("attached", &self.is_attached())
            .finish_non_exhaustive()
    }
}

impl CaptureEncoder {
    /// Create an encoder reporting volume to `observers`
    #[must_use]
    pub fn new(observers: Arc<Observers>) -> Self {
        Self {
            observers,
            link: Mutex::new(None),
        }
    }

    /// Start forwarding frames to `link`
    pub fn attach(&self, link: LiveLink) {
        *self.link.lock().unwrap_or_else(PoisonError::into_inner) = Some(link);
    }

    /// Stop forwarding frames
    pub fn detach(&self) {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Whether a session is attached (live or not)
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Handle one frame; returns whether it was sent
    pub fn process_frame(&self, frame: &[f32]) -> bool {
        self.observers.volume(rms(frame));

        let link = self
            .link
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match link {
            Some(link) if link.is_live() => link.send_audio(encode_pcm16(frame)),
            _ => false,
        }
    }

    /// Device callback that frames samples and feeds them to this encoder
    #[must_use]
    pub fn callback(self: &Arc<Self>) -> FrameCallback {
        let encoder = Arc::clone(self);
        let mut frames = FrameAccumulator::new(FRAME_SIZE);
        Box::new(move |samples: &[f32]| {
            frames.push(samples, |frame| {
                encoder.process_frame(frame);
            });
        })
    }
}

/// Encode mono samples as a 16-bit WAV file
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
