//! Voice processing module
//!
//! Handles microphone capture, the shared output clock, and gapless
//! playback of streamed assistant speech.

mod capture;
mod codec;
mod device;
mod meter;
mod output;
mod playback;
mod resample;

pub use capture::{CaptureEncoder, FRAME_SIZE, FrameAccumulator, SAMPLE_RATE, samples_to_wav};
pub use codec::{decode_pcm16, encode_pcm16, to_mono};
pub use device::{
    AudioBackend, AudioStream, CpalBackend, FrameCallback, input_device_names, output_device_names,
};
pub use meter::rms;
pub use output::{OutputBus, PLAYBACK_SAMPLE_RATE, frames_to_duration};
pub use playback::{PlaybackItem, PlaybackScheduler};
pub use resample::StreamResampler;
