//! Audio device access
//!
//! cpal streams are not `Send`, so each one is built and owned by a
//! dedicated thread. The returned guard stops and joins that thread on drop,
//! which releases the device before the drop returns.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Host, SampleFormat, SampleRate, StreamConfig};

use super::capture::SAMPLE_RATE;
use super::codec::to_mono;
use super::output::OutputBus;
use super::resample::StreamResampler;
use crate::{Error, Result};

/// Receives 16 kHz mono microphone samples on the audio thread
pub type FrameCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// An open device stream; dropping it closes the stream
pub trait AudioStream: Send {}

/// Opens microphone and speaker streams
pub trait AudioBackend: Send + Sync {
    /// Open the microphone, delivering 16 kHz mono samples to `callback`
    ///
    /// # Errors
    ///
    /// Returns an audio error if no usable input device can be opened
    fn open_input(&self, callback: FrameCallback) -> Result<Box<dyn AudioStream>>;

    /// Open the speaker, rendering from `bus`
    ///
    /// # Errors
    ///
    /// Returns an audio error if no usable output device can be opened
    fn open_output(&self, bus: OutputBus) -> Result<Box<dyn AudioStream>>;
}

/// Guard for a stream living on its own thread
struct ThreadedStream {
    label: &'static str,
    stop: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl AudioStream for ThreadedStream {}

impl Drop for ThreadedStream {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        tracing::debug!(stream = self.label, "audio stream closed");
    }
}

/// Build a stream on a dedicated thread and keep it alive until dropped
fn spawn_stream<F>(label: &'static str, build: F) -> Result<Box<dyn AudioStream>>
where
    F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
{
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

    let thread = std::thread::Builder::new()
        .name(format!("aryan-{label}"))
        .spawn(move || {
            let stream = match build() {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(Error::Audio(e.to_string())));
                return;
            }
            let _ = ready_tx.send(Ok(()));

            // Returns once the guard drops its sender
            let _ = stop_rx.recv();
            drop(stream);
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => {
            tracing::debug!(stream = label, "audio stream started");
            Ok(Box::new(ThreadedStream {
                label,
                stop: Some(stop_tx),
                thread: Some(thread),
            }))
        }
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(Error::Audio(format!("{label} stream thread exited")))
        }
    }
}

/// [`AudioBackend`] over the default cpal host
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    input_device: Option<String>,
    output_device: Option<String>,
}

impl CpalBackend {
    /// Use the named devices, or the host defaults when `None`
    #[must_use]
    pub const fn new(input_device: Option<String>, output_device: Option<String>) -> Self {
        Self {
            input_device,
            output_device,
        }
    }
}

fn find_input(host: &Host, name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => host
            .input_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Audio(format!("input device not found: {name}"))),
        None => host
            .default_input_device()
            .ok_or_else(|| Error::Audio("no input device available".to_string())),
    }
}

fn find_output(host: &Host, name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => host
            .output_devices()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| Error::Audio(format!("output device not found: {name}"))),
        None => host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string())),
    }
}

/// Turns interleaved device buffers into 16 kHz mono across callbacks
struct InputNormalizer {
    channels: u16,
    resampler: Option<StreamResampler>,
}

impl InputNormalizer {
    fn new(channels: u16, rate: u32) -> Result<Self> {
        let resampler = if rate == SAMPLE_RATE {
            None
        } else {
            Some(StreamResampler::new(rate, SAMPLE_RATE)?)
        };
        Ok(Self {
            channels,
            resampler,
        })
    }

    fn push(&mut self, data: &[f32], emit: &mut dyn FnMut(&[f32])) {
        let mono = to_mono(data, self.channels);
        match self.resampler.as_mut() {
            None => emit(&mono),
            Some(resampler) => {
                if let Err(e) = resampler.push(&mono, emit) {
                    tracing::warn!(error = %e, "dropping microphone buffer");
                }
            }
        }
    }
}

fn build_input(name: Option<&str>, mut callback: FrameCallback) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = find_input(&host, name)?;
    let supported = device
        .default_input_config()
        .map_err(|e| Error::Audio(e.to_string()))?;

    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let channels = config.channels;
    let rate = config.sample_rate.0;

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = rate,
        channels,
        ?sample_format,
        "opening microphone"
    );

    let mut normalizer = InputNormalizer::new(channels, rate)?;
    let on_error = |err: cpal::StreamError| tracing::error!(error = %err, "audio capture error");

    let stream = match sample_format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                normalizer.push(data, &mut *callback);
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                let samples: Vec<f32> = data.iter().map(|&s| f32::from(s) / 32768.0).collect();
                normalizer.push(&samples, &mut *callback);
            },
            on_error,
            None,
        ),
        other => {
            return Err(Error::Audio(format!(
                "unsupported input sample format: {other:?}"
            )));
        }
    };

    stream.map_err(|e| Error::Audio(e.to_string()))
}

/// Pick an f32 output config: the bus rate in mono, then stereo, then the
/// device default (resampled on the fly)
fn output_config(device: &Device, bus_rate: u32) -> Result<StreamConfig> {
    let rate = SampleRate(bus_rate);
    let exact = |channels: u16| {
        device.supported_output_configs().ok()?.find(|c| {
            c.channels() == channels
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= rate
                && c.max_sample_rate() >= rate
        })
    };

    if let Some(supported) = exact(1).or_else(|| exact(2)) {
        return Ok(supported.with_sample_rate(rate).config());
    }

    let fallback = device
        .default_output_config()
        .map_err(|e| Error::Audio(e.to_string()))?;
    if fallback.sample_format() != SampleFormat::F32 {
        return Err(Error::Audio("no f32 output config available".to_string()));
    }
    Ok(fallback.config())
}

fn build_output(name: Option<&str>, bus: OutputBus) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = find_output(&host, name)?;
    let config = output_config(&device, bus.sample_rate())?;
    let channels = usize::from(config.channels.max(1));
    let device_rate = config.sample_rate.0;
    let bus_rate = bus.sample_rate();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate = device_rate,
        channels,
        "opening speaker"
    );

    let on_error = |err: cpal::StreamError| tracing::error!(error = %err, "audio playback error");

    let stream = if device_rate == bus_rate {
        device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| bus.render(data, channels),
            on_error,
            None,
        )
    } else {
        let mut resampler = StreamResampler::new(bus_rate, device_rate)?;
        device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                let mono = resampler
                    .pull(frames, |n| bus.render_mono(n))
                    .unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "rendering silence");
                        Vec::new()
                    });
                for (i, frame) in data.chunks_mut(channels).enumerate() {
                    frame.fill(mono.get(i).copied().unwrap_or(0.0));
                }
            },
            on_error,
            None,
        )
    };

    stream.map_err(|e| Error::Audio(e.to_string()))
}

impl AudioBackend for CpalBackend {
    fn open_input(&self, callback: FrameCallback) -> Result<Box<dyn AudioStream>> {
        let name = self.input_device.clone();
        spawn_stream("input", move || build_input(name.as_deref(), callback))
    }

    fn open_output(&self, bus: OutputBus) -> Result<Box<dyn AudioStream>> {
        let name = self.output_device.clone();
        spawn_stream("output", move || build_output(name.as_deref(), bus))
    }
}

/// Names of the available input devices
///
/// # Errors
///
/// Returns an audio error if devices cannot be enumerated
pub fn input_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    Ok(host
        .input_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect())
}

/// Names of the available output devices
///
/// # Errors
///
/// Returns an audio error if devices cannot be enumerated
pub fn output_device_names() -> Result<Vec<String>> {
    let host = cpal::default_host();
    Ok(host
        .output_devices()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter_map(|d| d.name().ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_is_downmixed_and_resampled() {
        let mut normalizer = InputNormalizer::new(2, 48_000).unwrap();
        let mut out = Vec::new();
        for _ in 0..100 {
            normalizer.push(&[0.5f32; 960], &mut |s| out.extend_from_slice(s));
        }

        let consumed = 100 * 480 - normalizer.resampler.as_ref().unwrap().pending();
        assert_eq!(out.len() * 3, consumed);
        assert!(out[out.len() - 100..].iter().all(|s| (s - 0.5).abs() < 0.02));
    }

    #[test]
    fn native_rate_input_passes_through() {
        let mut normalizer = InputNormalizer::new(1, SAMPLE_RATE).unwrap();
        let mut out = Vec::new();
        normalizer.push(&[0.25f32; 10], &mut |s| out.extend_from_slice(s));
        assert_eq!(out, vec![0.25f32; 10]);
    }

    #[test]
    fn failed_build_reports_error_and_joins() {
        let err = spawn_stream("test", || Err(Error::Audio("nope".into())))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "audio error: nope");
    }
}
