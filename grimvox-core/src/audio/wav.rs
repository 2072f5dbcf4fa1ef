//! WAV files in and out, always as mono f32 in memory.

use std::path::Path;

use tracing::debug;

use crate::buffering::AudioBuffer;
use crate::error::Result;

/// Read any PCM or float WAV, averaging channels down to mono.
pub fn read_wav(path: impl AsRef<Path>) -> Result<AudioBuffer> {
    let path = path.as_ref();
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = usize::from(spec.channels.max(1));

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<hound::Result<_>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1_i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<hound::Result<_>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    debug!(
        path = %path.display(),
        samples = samples.len(),
        sample_rate = spec.sample_rate,
        channels,
        "wav loaded"
    );
    Ok(AudioBuffer::new(samples, spec.sample_rate))
}

/// Write `audio` as 16-bit mono PCM, clipping to [-1, 1].
pub fn write_wav(path: impl AsRef<Path>, audio: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: audio.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path.as_ref(), spec)?;
    for &s in &audio.samples {
        writer.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32).round() as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
