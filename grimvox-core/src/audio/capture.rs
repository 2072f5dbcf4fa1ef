//! Microphone capture through cpal.
//!
//! The input callback runs on an OS audio thread at elevated priority and
//! must not allocate, lock or do I/O. It only down-mixes to mono, converts to
//! f32 and calls the SPSC producer's wait-free `push_slice`. Overflow drops
//! the excess samples and counts them; the pipeline reports the count.
//!
//! `cpal::Stream` is `!Send` on several platforms, so an [`AudioCapture`] is
//! created and dropped on the pipeline thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig,
};
use tracing::info;
#[cfg(feature = "audio-cpal")]
use tracing::{error, warn};

use super::CaptureStream;
use crate::buffering::CaptureProducer;
#[cfg(feature = "audio-cpal")]
use crate::buffering::Producer;
use crate::error::{GrimvoxError, Result};

/// Mono samples converted per step of the input callback.
const CALLBACK_CHUNK: usize = 1_024;

/// Flags shared between the capture callback and the pipeline thread.
#[derive(Clone, Default)]
pub struct CaptureFlags {
    /// Callback no-ops while false.
    pub running: Arc<AtomicBool>,
    /// Samples dropped because the SPSC ring was full.
    pub dropped: Arc<AtomicU64>,
}

impl CaptureFlags {
    pub fn new(running: Arc<AtomicBool>) -> Self {
        Self {
            running,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }
}

/// Live input stream. Dropping it stops the callback.
pub struct AudioCapture {
    #[cfg(feature = "audio-cpal")]
    _stream: Stream,
    flags: CaptureFlags,
    sample_rate: u32,
}

#[cfg(feature = "audio-cpal")]
fn pick_input_device(host: &cpal::Host, preferred: Option<&str>) -> Result<Device> {
    if let Some(wanted) = preferred {
        match host.input_devices() {
            Ok(mut devices) => {
                if let Some(dev) = devices.find(|d| d.name().is_ok_and(|n| n == wanted)) {
                    return Ok(dev);
                }
                warn!(device = wanted, "preferred input device not found, falling back");
            }
            Err(e) => warn!(error = %e, "could not list input devices"),
        }
    }
    if let Some(dev) = host.default_input_device() {
        return Ok(dev);
    }
    warn!("no default input device, using first available");
    host.input_devices()
        .map_err(|e| GrimvoxError::AudioDevice(e.to_string()))?
        .next()
        .ok_or(GrimvoxError::NoDefaultInputDevice)
}

#[cfg(feature = "audio-cpal")]
fn build_mono_stream<T>(
    device: &Device,
    config: &StreamConfig,
    mut producer: CaptureProducer,
    flags: CaptureFlags,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = config.channels.max(1) as usize;
    let mut scratch = [0.0f32; CALLBACK_CHUNK];

    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            if !flags.running.load(Ordering::Relaxed) {
                return;
            }
            downmix_chunks(data, channels, &mut scratch, |s| s.to_sample::<f32>(), |mono| {
                let written = producer.push_slice(mono);
                if written < mono.len() {
                    flags
                        .dropped
                        .fetch_add((mono.len() - written) as u64, Ordering::Relaxed);
                }
            });
        },
        |err| error!(error = %err, "capture stream error"),
        None,
    )
}

/// Down-mix interleaved `data` to mono through `scratch`, handing each filled
/// chunk to `emit`. Never allocates, whatever the callback size.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn downmix_chunks<T: Copy>(
    data: &[T],
    channels: usize,
    scratch: &mut [f32],
    to_f32: impl Fn(T) -> f32,
    mut emit: impl FnMut(&[f32]),
) {
    let channels = channels.max(1);
    if scratch.is_empty() {
        return;
    }
    for block in data.chunks(channels * scratch.len()) {
        let mut n = 0;
        for (slot, frame) in scratch.iter_mut().zip(block.chunks_exact(channels)) {
            *slot = frame.iter().map(|&s| to_f32(s)).sum::<f32>() / channels as f32;
            n += 1;
        }
        emit(&scratch[..n]);
    }
}

impl AudioCapture {
    /// Open `preferred` by name, else the default input, else the first one.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        producer: CaptureProducer,
        flags: CaptureFlags,
        preferred: Option<&str>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = pick_input_device(&host, preferred)?;
        let supported = device
            .default_input_config()
            .map_err(|e| GrimvoxError::AudioDevice(e.to_string()))?;

        let sample_rate = supported.sample_rate().0;
        let config: StreamConfig = supported.config();
        info!(
            device = device.name().unwrap_or_default().as_str(),
            sample_rate,
            channels = config.channels,
            format = ?supported.sample_format(),
            "opening input device"
        );

        let cb_flags = flags.clone();
        let stream = match supported.sample_format() {
            SampleFormat::F32 => build_mono_stream::<f32>(&device, &config, producer, cb_flags),
            SampleFormat::I16 => build_mono_stream::<i16>(&device, &config, producer, cb_flags),
            SampleFormat::U16 => build_mono_stream::<u16>(&device, &config, producer, cb_flags),
            SampleFormat::U8 => build_mono_stream::<u8>(&device, &config, producer, cb_flags),
            SampleFormat::I32 => build_mono_stream::<i32>(&device, &config, producer, cb_flags),
            fmt => {
                return Err(GrimvoxError::AudioStream(format!(
                    "unsupported sample format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| GrimvoxError::AudioStream(e.to_string()))?;

        stream
            .play()
            .map_err(|e| GrimvoxError::AudioStream(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            flags,
            sample_rate,
        })
    }

    #[cfg(not(feature = "audio-cpal"))]
    pub fn open(
        _producer: CaptureProducer,
        _flags: CaptureFlags,
        _preferred: Option<&str>,
    ) -> Result<Self> {
        Err(GrimvoxError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl CaptureStream for AudioCapture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.flags.running.store(false, Ordering::Release);
        info!(
            dropped = self.flags.dropped.load(Ordering::Relaxed),
            "input stream closed"
        );
    }
}
