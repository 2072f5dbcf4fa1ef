//! Output device playback through cpal.
//!
//! A config at the buffer's own rate is preferred, mono first and then
//! stereo with the sample duplicated. Otherwise the device default is used
//! and the buffer is resampled up front. Either way the cursor reports
//! positions in the source buffer, which is what the LED loop windows.

use tracing::info;
#[cfg(feature = "audio-cpal")]
use tracing::{debug, error};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig,
};

use super::{PlaybackCursor, PlaybackDevice};
use crate::buffering::AudioBuffer;
#[cfg(feature = "audio-cpal")]
use crate::audio::resample::resample_buffer;
use crate::error::{GrimvoxError, Result};

/// Plays buffers on the default output device.
pub struct CpalPlayback {
    #[cfg(feature = "audio-cpal")]
    device: Device,
    #[cfg(feature = "audio-cpal")]
    stream: Option<Stream>,
    cursor: Option<PlaybackCursor>,
}

#[cfg(feature = "audio-cpal")]
struct Chosen {
    config: StreamConfig,
    format: SampleFormat,
}

#[cfg(feature = "audio-cpal")]
fn choose_config(device: &Device, rate: u32) -> Result<Chosen> {
    let wanted = SampleRate(rate);
    for channels in [1u16, 2] {
        let found = device
            .supported_output_configs()
            .map_err(|e| GrimvoxError::AudioDevice(e.to_string()))?
            .find(|c| {
                c.channels() == channels
                    && c.min_sample_rate() <= wanted
                    && c.max_sample_rate() >= wanted
            });
        if let Some(range) = found {
            let format = range.sample_format();
            return Ok(Chosen {
                config: range.with_sample_rate(wanted).config(),
                format,
            });
        }
    }
    let fallback = device
        .default_output_config()
        .map_err(|e| GrimvoxError::AudioDevice(e.to_string()))?;
    debug!(
        requested = rate,
        device_rate = fallback.sample_rate().0,
        "no output config at buffer rate, resampling"
    );
    Ok(Chosen {
        format: fallback.sample_format(),
        config: fallback.config(),
    })
}

#[cfg(feature = "audio-cpal")]
fn build_output<T>(
    device: &Device,
    config: &StreamConfig,
    rendered: Vec<f32>,
    source_rate: u32,
    cursor: PlaybackCursor,
) -> std::result::Result<Stream, cpal::BuildStreamError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels.max(1) as usize;
    let device_rate = config.sample_rate.0.max(1) as u64;
    let mut pos = 0usize;

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            for frame in data.chunks_mut(channels) {
                let s = rendered.get(pos).copied().unwrap_or(0.0);
                frame.fill(T::from_sample(s));
                if pos < rendered.len() {
                    pos += 1;
                }
            }
            if pos >= rendered.len() {
                cursor.finish();
            } else {
                cursor.set_position((pos as u64 * source_rate as u64 / device_rate) as usize);
            }
        },
        |err| error!(error = %err, "playback stream error"),
        None,
    )
}

impl CpalPlayback {
    #[cfg(feature = "audio-cpal")]
    pub fn open_default() -> Result<Self> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(GrimvoxError::NoDefaultOutputDevice)?;
        info!(
            device = device.name().unwrap_or_default().as_str(),
            "output device opened"
        );
        Ok(Self {
            device,
            stream: None,
            cursor: None,
        })
    }

    #[cfg(not(feature = "audio-cpal"))]
    pub fn open_default() -> Result<Self> {
        Err(GrimvoxError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

impl PlaybackDevice for CpalPlayback {
    #[cfg(feature = "audio-cpal")]
    fn start(&mut self, audio: &AudioBuffer) -> Result<PlaybackCursor> {
        self.stop();
        let cursor = PlaybackCursor::new(audio.len());
        if audio.is_empty() {
            return Ok(cursor);
        }

        let chosen = choose_config(&self.device, audio.sample_rate)?;
        let device_rate = chosen.config.sample_rate.0;
        let rendered = if device_rate == audio.sample_rate {
            audio.samples.clone()
        } else {
            resample_buffer(audio, device_rate)?.samples
        };

        let (device, config, src, cb) = (
            &self.device,
            &chosen.config,
            audio.sample_rate,
            cursor.clone(),
        );
        let stream = match chosen.format {
            SampleFormat::F32 => build_output::<f32>(device, config, rendered, src, cb),
            SampleFormat::I16 => build_output::<i16>(device, config, rendered, src, cb),
            SampleFormat::U16 => build_output::<u16>(device, config, rendered, src, cb),
            SampleFormat::I32 => build_output::<i32>(device, config, rendered, src, cb),
            fmt => {
                return Err(GrimvoxError::AudioStream(format!(
                    "unsupported output format: {fmt:?}"
                )))
            }
        }
        .map_err(|e| GrimvoxError::AudioStream(e.to_string()))?;
        stream
            .play()
            .map_err(|e| GrimvoxError::AudioStream(e.to_string()))?;

        info!(
            samples = audio.len(),
            source_rate = audio.sample_rate,
            device_rate,
            channels = chosen.config.channels,
            "playback started"
        );
        self.stream = Some(stream);
        self.cursor = Some(cursor.clone());
        Ok(cursor)
    }

    #[cfg(not(feature = "audio-cpal"))]
    fn start(&mut self, _audio: &AudioBuffer) -> Result<PlaybackCursor> {
        Err(GrimvoxError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }

    fn stop(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            cursor.finish();
        }
        #[cfg(feature = "audio-cpal")]
        if self.stream.take().is_some() {
            info!("playback stopped");
        }
    }
}

impl Drop for CpalPlayback {
    fn drop(&mut self) {
        self.stop();
    }
}
