//! Second-order IIR sections and the shelf-style emphasis stages built on them.
//!
//! Coefficients follow the RBJ audio-EQ cookbook. Filtering is zero-phase
//! (forward pass, then backward pass over the reversed signal) with odd
//! reflection padding at both ends so the edges do not ring.

use std::f64::consts::PI;

use super::EffectStage;
use crate::error::{GrimvoxError, Result};

const BUTTERWORTH_Q: f64 = std::f64::consts::FRAC_1_SQRT_2;

/// Normalised biquad coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn omega(cutoff_hz: f32, sample_rate: u32, stage: &'static str) -> Result<f64> {
        let nyquist = sample_rate as f64 / 2.0;
        let f = cutoff_hz as f64;
        if !(f.is_finite() && f > 0.0 && f < nyquist) {
            return Err(GrimvoxError::effect(
                stage,
                format!("cutoff {cutoff_hz} Hz outside (0, {nyquist}) Hz"),
            ));
        }
        Ok(2.0 * PI * f / sample_rate as f64)
    }

    fn normalised(b: [f64; 3], a: [f64; 3]) -> Self {
        Self {
            b0: b[0] / a[0],
            b1: b[1] / a[0],
            b2: b[2] / a[0],
            a1: a[1] / a[0],
            a2: a[2] / a[0],
        }
    }

    /// 2nd-order Butterworth low-pass.
    pub fn lowpass(cutoff_hz: f32, sample_rate: u32) -> Result<Self> {
        let w0 = Self::omega(cutoff_hz, sample_rate, "lowpass")?;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * BUTTERWORTH_Q);
        Ok(Self::normalised(
            [(1.0 - cos) / 2.0, 1.0 - cos, (1.0 - cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        ))
    }

    /// 2nd-order Butterworth high-pass.
    pub fn highpass(cutoff_hz: f32, sample_rate: u32) -> Result<Self> {
        let w0 = Self::omega(cutoff_hz, sample_rate, "highpass")?;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * BUTTERWORTH_Q);
        Ok(Self::normalised(
            [(1.0 + cos) / 2.0, -(1.0 + cos), (1.0 + cos) / 2.0],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        ))
    }

    /// Band-pass with 0 dB peak gain at `center_hz`.
    pub fn bandpass(center_hz: f32, q: f32, sample_rate: u32) -> Result<Self> {
        let w0 = Self::omega(center_hz, sample_rate, "bandpass")?;
        let (sin, cos) = w0.sin_cos();
        let alpha = sin / (2.0 * q.max(0.1) as f64);
        Ok(Self::normalised(
            [alpha, 0.0, -alpha],
            [1.0 + alpha, -2.0 * cos, 1.0 - alpha],
        ))
    }

    /// One causal pass, transposed direct form II, state starting at zero.
    fn run(&self, signal: &mut [f64]) {
        let (mut z1, mut z2) = (0.0f64, 0.0f64);
        for s in signal.iter_mut() {
            let x = *s;
            let y = self.b0 * x + z1;
            z1 = self.b1 * x - self.a1 * y + z2;
            z2 = self.b2 * x - self.a2 * y;
            *s = y;
        }
    }

    /// Zero-phase filtering of `input`.
    pub fn filtfilt(&self, input: &[f32]) -> Vec<f32> {
        let n = input.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = 9.min(n - 1);

        // Odd extension: 2·x[0] − x[k] before, 2·x[n−1] − x[n−1−k] after.
        let mut ext: Vec<f64> = Vec::with_capacity(n + 2 * pad);
        let first = input[0] as f64;
        let last = input[n - 1] as f64;
        ext.extend((1..=pad).rev().map(|k| 2.0 * first - input[k] as f64));
        ext.extend(input.iter().map(|&s| s as f64));
        ext.extend((1..=pad).map(|k| 2.0 * last - input[n - 1 - k] as f64));

        self.run(&mut ext);
        ext.reverse();
        self.run(&mut ext);
        ext.reverse();

        ext[pad..pad + n].iter().map(|&s| s as f32).collect()
    }
}

fn db_to_linear(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// `x + filtered(x) · (gain − 1)`: the band passed by `filter` is scaled by
/// `gain` while the rest of the spectrum is left alone.
fn blend(input: &[f32], filtered: &[f32], gain: f32) -> Vec<f32> {
    input
        .iter()
        .zip(filtered)
        .map(|(&x, &f)| x + f * (gain - 1.0))
        .collect()
}

/// Low-frequency emphasis below `cutoff_hz`.
#[derive(Debug, Clone)]
pub struct BassBoost {
    cutoff_hz: f32,
    gain: f32,
}

impl BassBoost {
    pub fn new(cutoff_hz: f32, gain_db: f32) -> Self {
        Self {
            cutoff_hz,
            gain: db_to_linear(gain_db),
        }
    }
}

impl EffectStage for BassBoost {
    fn name(&self) -> &'static str {
        "bass_boost"
    }

    fn process(&mut self, input: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        let lp = Biquad::lowpass(self.cutoff_hz, sample_rate)
            .map_err(|e| GrimvoxError::effect(self.name(), e.to_string()))?;
        Ok(blend(input, &lp.filtfilt(input), self.gain))
    }
}

/// High-frequency attenuation above `cutoff_hz`.
#[derive(Debug, Clone)]
pub struct TrebleCut {
    cutoff_hz: f32,
    gain: f32,
}

impl TrebleCut {
    pub fn new(cutoff_hz: f32, gain_db: f32) -> Self {
        Self {
            cutoff_hz,
            gain: db_to_linear(gain_db),
        }
    }
}

impl EffectStage for TrebleCut {
    fn name(&self) -> &'static str {
        "treble_cut"
    }

    fn process(&mut self, input: &[f32], sample_rate: u32) -> Result<Vec<f32>> {
        let hp = Biquad::highpass(self.cutoff_hz, sample_rate)
            .map_err(|e| GrimvoxError::effect(self.name(), e.to_string()))?;
        Ok(blend(input, &hp.filtfilt(input), self.gain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffering::rms;
    use approx::assert_abs_diff_eq;

    const RATE: u32 = 16_000;

    fn sine(freq: f32, secs: f32) -> Vec<f32> {
        let n = (RATE as f32 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / RATE as f32).sin() * 0.5)
            .collect()
    }

    fn middle(x: &[f32]) -> &[f32] {
        &x[x.len() / 4..3 * x.len() / 4]
    }

    #[test]
    fn lowpass_passes_dc_and_blocks_high() {
        let lp = Biquad::lowpass(200.0, RATE).expect("valid cutoff");
        let dc = lp.filtfilt(&[0.5; 512]);
        assert_abs_diff_eq!(dc[256], 0.5, epsilon = 1e-4);

        let high = lp.filtfilt(&sine(4_000.0, 0.5));
        assert!(rms(middle(&high)) < 0.01);
    }

    #[test]
    fn highpass_blocks_dc() {
        let hp = Biquad::highpass(1_000.0, RATE).expect("valid cutoff");
        let out = hp.filtfilt(&[0.5; 2_048]);
        assert!(out[1_024].abs() < 1e-3);
    }

    #[test]
    fn bandpass_peaks_at_center() {
        let bp = Biquad::bandpass(1_200.0, 2.0, RATE).expect("valid center");
        let on = rms(middle(&bp.filtfilt(&sine(1_200.0, 0.5))));
        let off = rms(middle(&bp.filtfilt(&sine(5_000.0, 0.5))));
        assert!(on > 0.3, "on-center rms {on}");
        assert!(off < 0.05, "off-center rms {off}");
    }

    #[test]
    fn cutoff_above_nyquist_is_rejected() {
        assert!(Biquad::lowpass(9_000.0, RATE).is_err());
        assert!(BassBoost::new(9_000.0, 6.0).process(&[0.1; 64], RATE).is_err());
    }

    #[test]
    fn bass_boost_raises_low_tone_only() {
        let mut stage = BassBoost::new(150.0, 8.0);
        let low = sine(60.0, 0.5);
        let high = sine(3_000.0, 0.5);
        let low_out = stage.process(&low, RATE).expect("process");
        let high_out = stage.process(&high, RATE).expect("process");
        assert!(rms(middle(&low_out)) > rms(middle(&low)) * 1.5);
        assert_abs_diff_eq!(rms(middle(&high_out)), rms(middle(&high)), epsilon = 0.01);
    }

    #[test]
    fn treble_cut_lowers_high_tone() {
        let mut stage = TrebleCut::new(3_000.0, -6.0);
        let high = sine(6_000.0, 0.5);
        let out = stage.process(&high, RATE).expect("process");
        assert!(rms(middle(&out)) < rms(middle(&high)) * 0.7);
        assert_eq!(out.len(), high.len());
    }

    #[test]
    fn empty_input_stays_empty() {
        let lp = Biquad::lowpass(200.0, RATE).expect("valid cutoff");
        assert!(lp.filtfilt(&[]).is_empty());
        assert_eq!(lp.filtfilt(&[0.3]).len(), 1);
    }
}
