//! Formant-band shifting.
//!
//! Each formant band is isolated with a zero-phase band-pass, read back at a
//! scaled rate, and the difference between the shifted and original band is
//! mixed into the signal. Bands at or above 95% of Nyquist are skipped.

use super::filter::Biquad;
use super::{sample_at, EffectStage};
use crate::error::{GrimvoxError, Result};

const FORMANT_BANDS_HZ: [f32; 3] = [800.0, 1_200.0, 2_600.0];
const BAND_Q: f32 = 2.0;

#[derive(Debug, Clone)]
pub struct FormantShift {
    factor: f32,
    mix: f32,
}

impl FormantShift {
    pub fn new(factor: f32, mix: f32) -> Self {
        Self { factor, mix }
    }
}

impl EffectStage for FormantShift {
    fn name(&self) -> &'static str {
        "formant_shift"
    }

    fn process(&mut self, input: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        if !(self.factor.is_finite() && self.factor > 0.0) {
            return Err(GrimvoxError::effect(
                self.name(),
                format!("factor must be positive, got {}", self.factor),
            ));
        }
        if (self.factor - 1.0).abs() < 1e-6 || input.is_empty() {
            return Ok(input.to_vec());
        }

        let limit = sample_rate as f32 * 0.5 * 0.95;
        let step = 1.0 / self.factor as f64;
        let mut out = input.to_vec();

        for centre in FORMANT_BANDS_HZ.into_iter().filter(|&f| f < limit) {
            let band = Biquad::bandpass(centre, BAND_Q, sample_rate)
                .map_err(|e| GrimvoxError::effect("formant_shift", e.to_string()))?
                .filtfilt(input);
            for (i, o) in out.iter_mut().enumerate() {
                let shifted = sample_at(&band, i as f64 * step);
                *o += (shifted - band[i]) * self.mix;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unity_factor_is_passthrough() {
        let input: Vec<f32> = (0..256).map(|i| (i as f32 * 0.1).sin()).collect();
        let mut stage = FormantShift::new(1.0, 0.3);
        assert_eq!(stage.process(&input, 16_000).expect("process"), input);
    }

    #[test]
    fn shift_alters_signal_but_keeps_length() {
        let input: Vec<f32> = (0..4_000)
            .map(|i| (2.0 * std::f32::consts::PI * 1_000.0 * i as f32 / 16_000.0).sin() * 0.4)
            .collect();
        let mut stage = FormantShift::new(0.7, 0.3);
        let out = stage.process(&input, 16_000).expect("process");
        assert_eq!(out.len(), input.len());
        let diff: f32 = out.iter().zip(&input).map(|(a, b)| (a - b).abs()).sum();
        assert!(diff > 1.0);
        assert!(out.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn low_sample_rate_skips_high_bands() {
        // 2600 Hz is above 95% of Nyquist at 5 kHz; only the lower bands run.
        let mut stage = FormantShift::new(0.8, 0.3);
        let out = stage.process(&[0.2; 500], 5_000).expect("process");
        assert_eq!(out.len(), 500);
    }

    #[test]
    fn non_positive_factor_fails() {
        let mut stage = FormantShift::new(-1.0, 0.3);
        assert!(stage.process(&[0.1; 10], 16_000).is_err());
    }
}
