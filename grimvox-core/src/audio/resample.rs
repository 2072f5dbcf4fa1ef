//! Sample-rate conversion with a rubato `FastFixedIn` resampler.
//!
//! Capture devices commonly run at 44.1 or 48 kHz while the front-end works
//! at 16 kHz; synthesized replies arrive at whatever rate the voice uses and
//! the output device may not accept it. `RateConverter` covers both
//! directions on non-real-time threads.
//!
//! Equal rates make the converter a passthrough with no rubato session.

use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use tracing::{error, info};

use crate::buffering::AudioBuffer;
use crate::error::{GrimvoxError, Result};

/// Input block size used when converting a whole buffer at once.
const BUFFER_CHUNK: usize = 1_024;

/// Streaming mono f32 converter between two fixed rates.
pub struct RateConverter {
    resampler: Option<FastFixedIn<f32>>,
    /// Holds a partial input block between calls.
    pending: Vec<f32>,
    chunk_size: usize,
    output_buf: Vec<Vec<f32>>,
    from_rate: u32,
    to_rate: u32,
}

impl RateConverter {
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self> {
        if from_rate == 0 || to_rate == 0 {
            return Err(GrimvoxError::InvalidConfig(format!(
                "sample rates must be non-zero ({from_rate} → {to_rate})"
            )));
        }
        if from_rate == to_rate {
            return Ok(Self {
                resampler: None,
                pending: Vec::new(),
                chunk_size,
                output_buf: Vec::new(),
                from_rate,
                to_rate,
            });
        }

        let ratio = to_rate as f64 / from_rate as f64;
        let resampler = FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Cubic, chunk_size, 1)
            .map_err(|e| GrimvoxError::AudioDevice(format!("resampler init: {e}")))?;
        let output_buf = vec![vec![0f32; resampler.output_frames_max()]; 1];

        info!(from_rate, to_rate, chunk_size, "resampling enabled");

        Ok(Self {
            resampler: Some(resampler),
            pending: Vec::new(),
            chunk_size,
            output_buf,
            from_rate,
            to_rate,
        })
    }

    pub fn is_passthrough(&self) -> bool {
        self.resampler.is_none()
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Convert `samples`, returning whatever full blocks are ready.
    ///
    /// A remainder shorter than one block stays buffered for the next call.
    pub fn process(&mut self, samples: &[f32]) -> Vec<f32> {
        let Some(resampler) = self.resampler.as_mut() else {
            return samples.to_vec();
        };

        self.pending.extend_from_slice(samples);
        let mut out = Vec::new();

        while self.pending.len() >= self.chunk_size {
            let block = &self.pending[..self.chunk_size];
            match resampler.process_into_buffer(&[block], &mut self.output_buf, None) {
                Ok((_consumed, produced)) => out.extend_from_slice(&self.output_buf[0][..produced]),
                Err(e) => error!(error = %e, "resampler process error"),
            }
            self.pending.drain(..self.chunk_size);
        }
        out
    }

    /// Zero-pad and convert the buffered remainder.
    pub fn flush(&mut self) -> Vec<f32> {
        if self.resampler.is_none() || self.pending.is_empty() {
            self.pending.clear();
            return Vec::new();
        }
        let pad = self.chunk_size - self.pending.len();
        let mut out = self.process(&vec![0.0; pad]);
        self.pending.clear();
        // Drop output that corresponds only to the padding.
        let padding_out = (pad as f64 * self.to_rate as f64 / self.from_rate as f64) as usize;
        out.truncate(out.len().saturating_sub(padding_out));
        out
    }
}

/// Convert a whole buffer to `to_rate`; the result has the length implied
/// by the rate ratio.
pub fn resample_buffer(audio: &AudioBuffer, to_rate: u32) -> Result<AudioBuffer> {
    if audio.sample_rate == to_rate {
        return Ok(audio.clone());
    }
    let mut rc = RateConverter::new(audio.sample_rate, to_rate, BUFFER_CHUNK)?;
    let target_len =
        (audio.len() as f64 * to_rate as f64 / audio.sample_rate as f64).round() as usize;

    let mut out = rc.process(&audio.samples);
    out.extend(rc.flush());
    // Push the converter's group delay out with a final silent block.
    if out.len() < target_len {
        out.extend(rc.process(&vec![0.0; BUFFER_CHUNK]));
    }
    out.resize(target_len, 0.0);
    Ok(AudioBuffer::new(out, to_rate))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_identity() {
        let mut rc = RateConverter::new(16_000, 16_000, 960).expect("converter");
        assert!(rc.is_passthrough());
        let samples: Vec<f32> = (0..480).map(|i| i as f32 * 0.001).collect();
        assert_eq!(rc.process(&samples), samples);
        assert!(rc.flush().is_empty());
    }

    #[test]
    fn downsample_48k_to_16k_length() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).expect("converter");
        let out = rc.process(&vec![0.0f32; 960]);
        assert!((out.len() as isize - 320).unsigned_abs() <= 10, "len={}", out.len());
    }

    #[test]
    fn partial_block_waits_for_more_input() {
        let mut rc = RateConverter::new(48_000, 16_000, 960).expect("converter");
        assert!(rc.process(&vec![0.0f32; 500]).is_empty());
        assert!(!rc.process(&vec![0.0f32; 500]).is_empty());
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(RateConverter::new(0, 16_000, 960).is_err());
    }

    #[test]
    fn whole_buffer_has_ratio_length() {
        let audio = AudioBuffer::new(vec![0.1; 22_050], 22_050);
        let out = resample_buffer(&audio, 48_000).expect("resample");
        assert_eq!(out.sample_rate, 48_000);
        assert_eq!(out.len(), 48_000);
    }
}
