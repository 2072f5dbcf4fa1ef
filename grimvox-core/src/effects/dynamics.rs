//! Level and saturation stages.

use super::EffectStage;
use crate::buffering::{peak, rms};
use crate::error::Result;

/// RMS normaliser toward `target_db` dBFS, with capped gain so near-silent
/// input is not pumped up into audible noise.
#[derive(Debug, Clone)]
pub struct Normalize {
    target: f32,
    max_gain: f32,
}

impl Normalize {
    pub fn new(target_db: f32, max_gain: f32) -> Self {
        Self {
            target: 10f32.powf(target_db / 20.0),
            max_gain,
        }
    }
}

impl EffectStage for Normalize {
    fn name(&self) -> &'static str {
        "normalize"
    }

    fn process(&mut self, input: &[f32], _sample_rate: u32) -> Result<Vec<f32>> {
        let level = rms(input);
        if level <= 0.0 {
            return Ok(input.to_vec());
        }
        let gain = (self.target / level).min(self.max_gain);
        Ok(input.iter().map(|s| s * gain).collect())
    }
}

/// Post-chain peak ceiling: scales the whole buffer down uniformly when its
/// peak exceeds `ceiling`. Never scales up.
#[derive(Debug, Clone)]
pub struct FinalNormalize {
    ceiling: f32,
}

impl FinalNormalize {
    pub fn new(ceiling: f32) -> Self {
        Self { ceiling }
    }
}

impl EffectStage for FinalNormalize {
    fn name(&self) -> &'static str {
        "final_normalize"
    }

    fn process(&mut self, input: &[f32], _sample_rate: u32) -> Result<Vec<f32>> {
        let p = peak(input);
        if p <= self.ceiling {
            return Ok(input.to_vec());
        }
        let scale = self.ceiling / p;
        // Clamp absorbs the last-ulp overshoot of the multiply.
        Ok(input
            .iter()
            .map(|s| (s * scale).clamp(-self.ceiling, self.ceiling))
            .collect())
    }
}

/// `tanh` soft clipper with dry/wet mix.
#[derive(Debug, Clone)]
pub struct Distortion {
    drive: f32,
    mix: f32,
}

impl Distortion {
    pub fn new(drive: f32, mix: f32) -> Self {
        Self { drive, mix }
    }
}

impl EffectStage for Distortion {
    fn name(&self) -> &'static str {
        "distortion"
    }

    fn process(&mut self, input: &[f32], _sample_rate: u32) -> Result<Vec<f32>> {
        let dry = 1.0 - self.mix;
        Ok(input
            .iter()
            .map(|&x| x * dry + (x * self.drive).tanh() * self.mix)
            .collect())
    }
}
