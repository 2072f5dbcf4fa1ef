//! Pitch and tempo stages.
//!
//! [`PitchMode::Granular`] keeps the buffer length: 40 ms Hann grains at 50%
//! overlap are each read back at the pitch ratio around their own centre and
//! overlap-added, normalised by the summed window. [`PitchMode::Resample`]
//! is plain linear resampling, so a downward shift also lengthens the buffer.

use serde::{Deserialize, Serialize};

use super::{sample_at, EffectStage};
use crate::error::{GrimvoxError, Result};

const GRAIN_SECS: f64 = 0.040;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PitchMode {
    /// Duration-preserving overlap-add.
    #[default]
    Granular,
    /// Duration changes by the inverse of the pitch ratio.
    Resample,
}

#[derive(Debug, Clone)]
pub struct PitchShift {
    ratio: f64,
    mode: PitchMode,
}

impl PitchShift {
    pub fn new(semitones: f32, mode: PitchMode) -> Self {
        Self {
            ratio: 2f64.powf(semitones as f64 / 12.0),
            mode,
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    fn resample(&self, input: &[f32]) -> Vec<f32> {
        let out_len = (input.len() as f64 / self.ratio).round() as usize;
        (0..out_len)
            .map(|i| sample_at(input, i as f64 * self.ratio))
            .collect()
    }

    fn granular(&self, input: &[f32], sample_rate: u32) -> Vec<f32> {
        let n = input.len();
        let grain = ((GRAIN_SECS * sample_rate as f64) as usize).max(4) & !1;
        let hop = grain / 2;
        let half = (grain / 2) as f64;

        // Periodic Hann: overlapping at `hop` sums to a constant.
        let window: Vec<f64> = (0..grain)
            .map(|j| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * j as f64 / grain as f64).cos())
            .collect();

        let mut acc = vec![0.0f64; n];
        let mut norm = vec![0.0f64; n];

        // First grain starts half a grain early so index 0 is fully covered.
        let mut start = -(hop as isize);
        while start < n as isize {
            let centre = start as f64 + half;
            for (j, &w) in window.iter().enumerate() {
                let out_idx = start + j as isize;
                if out_idx < 0 || out_idx >= n as isize {
                    continue;
                }
                let src = centre + (j as f64 - half) * self.ratio;
                acc[out_idx as usize] += w * sample_at(input, src) as f64;
                norm[out_idx as usize] += w;
            }
            start += hop as isize;
        }

        acc.iter()
            .zip(&norm)
            .map(|(&a, &w)| if w > 1e-9 { (a / w) as f32 } else { 0.0 })
            .collect()
    }
}

impl EffectStage for PitchShift {
    fn name(&self) -> &'static str {
        "pitch_shift"
    }

    fn process(&mut self, input: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        if (self.ratio - 1.0).abs() < 1e-9 || input.len() < 2 {
            return Ok(input.to_vec());
        }
        Ok(match self.mode {
            PitchMode::Granular => self.granular(input, sample_rate),
            PitchMode::Resample => self.resample(input),
        })
    }
}

/// Linear time stretch. `factor < 1` slows down (longer output).
#[derive(Debug, Clone)]
pub struct TempoChange {
    factor: f32,
}

impl TempoChange {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }
}

impl EffectStage for TempoChange {
    fn name(&self) -> &'static str {
        "tempo_change"
    }

    fn process(&mut self, input: &[f32], _sample_rate: u32) -> Result<Vec<f32>> {
        if !(self.factor.is_finite() && self.factor > 0.0) {
            return Err(GrimvoxError::effect(
                self.name(),
                format!("factor must be positive, got {}", self.factor),
            ));
        }
        if (self.factor - 1.0).abs() < 1e-6 || input.len() < 2 {
            return Ok(input.to_vec());
        }
        let out_len = ((input.len() as f64 / self.factor as f64).round() as usize).max(2);
        let step = (input.len() - 1) as f64 / (out_len - 1) as f64;
        Ok((0..out_len).map(|i| sample_at(input, i as f64 * step)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::peak;

    const RATE: u32 = 16_000;

    fn sine(freq: f32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin() * 0.5)
            .collect()
    }

    /// Rough fundamental estimate from positive-going zero crossings.
    fn crossings(x: &[f32]) -> usize {
        x.windows(2).filter(|w| w[0] <= 0.0 && w[1] > 0.0).count()
    }

    #[test]
    fn granular_preserves_length_and_lowers_pitch() {
        let input = sine(400.0, RATE as usize);
        let mut stage = PitchShift::new(-12.0, PitchMode::Granular);
        let out = stage.process(&input, RATE).expect("process");
        assert_eq!(out.len(), input.len());

        let before = crossings(&input) as f32;
        let after = crossings(&out) as f32;
        let ratio = after / before;
        assert!((0.4..0.6).contains(&ratio), "crossing ratio {ratio}");
    }

    #[test]
    fn granular_output_is_bounded_by_input_peak() {
        let input = sine(250.0, 8_000);
        let mut stage = PitchShift::new(-15.0, PitchMode::Granular);
        let out = stage.process(&input, RATE).expect("process");
        assert!(peak(&out) <= peak(&input) + 1e-4);
    }

    #[test]
    fn resample_mode_changes_duration() {
        let input = sine(300.0, 10_000);
        let mut stage = PitchShift::new(-12.0, PitchMode::Resample);
        let out = stage.process(&input, RATE).expect("process");
        assert_eq!(out.len(), 20_000);
    }

    #[test]
    fn zero_semitones_is_passthrough() {
        let input = sine(300.0, 1_000);
        let mut stage = PitchShift::new(0.0, PitchMode::Granular);
        assert_eq!(stage.process(&input, RATE).expect("process"), input);
    }

    #[test]
    fn tempo_slowdown_lengthens() {
        let mut stage = TempoChange::new(0.5);
        let out = stage.process(&[0.0, 1.0, 0.0, -1.0], RATE).expect("process");
        assert_eq!(out.len(), 8);
        assert_eq!(out[0], 0.0);
        assert_eq!(out[7], -1.0);
    }

    #[test]
    fn tempo_rejects_non_positive_factor() {
        let mut stage = TempoChange::new(0.0);
        assert!(stage.process(&[0.1; 10], RATE).is_err());
    }
}
