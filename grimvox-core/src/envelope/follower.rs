use super::LedConfig;
use crate::buffering::rms;

/// RMS levels above this are treated as saturated.
const MAX_TRACKED_RMS: f32 = 1.0e3;

/// Exponentially smoothed loudness mapped into a brightness range.
#[derive(Debug, Clone)]
pub struct EnvelopeFollower {
    config: LedConfig,
    level: f32,
}

impl EnvelopeFollower {
    pub fn new(config: LedConfig) -> Self {
        Self { config, level: 0.0 }
    }

    pub fn config(&self) -> &LedConfig {
        &self.config
    }

    /// Smoothed RMS level.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Advance the smoother with the RMS of `window`; return the brightness.
    pub fn update(&mut self, window: &[f32]) -> f32 {
        self.update_rms(rms(window))
    }

    pub fn update_rms(&mut self, rms: f32) -> f32 {
        // NaN collapses to silence, infinity to the saturation cap.
        let rms = rms.max(0.0).min(MAX_TRACKED_RMS);
        let alpha = self.config.smoothing;
        self.level = alpha * self.level + (1.0 - alpha) * rms;
        self.brightness()
    }

    /// Current level mapped into `[brightness_min, brightness_max]`.
    pub fn brightness(&self) -> f32 {
        (self.level * self.config.gain).clamp(self.config.brightness_min, self.config.brightness_max)
    }

    /// Brightness values for a linear fade from the current brightness to
    /// the floor over `fade_ticks`. Leaves the follower reset.
    pub fn fade_out(&mut self) -> Vec<f32> {
        let from = self.brightness();
        let to = self.config.brightness_min;
        let ticks = self.config.fade_ticks.max(1);
        self.reset();
        (1..=ticks)
            .map(|i| {
                if i == ticks {
                    to
                } else {
                    from + (to - from) * i as f32 / ticks as f32
                }
            })
            .collect()
    }

    /// Back to the resting level (`brightness_min`).
    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}
