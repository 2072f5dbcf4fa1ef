//! Playback-synchronised LED brightness.
//!
//! [`EnvelopeFollower`] turns the loudness of the audible window into a
//! brightness percentage; [`LedDriver`] writes it to a [`BrightnessOutput`].
//! A missing output makes the driver a no-op rather than an error.

mod follower;
mod led;
mod pwm;

pub use follower::EnvelopeFollower;
pub use led::LedDriver;
pub use pwm::{BrightnessOutput, SysfsPwm};

use serde::{Deserialize, Serialize};

use crate::error::{GrimvoxError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LedConfig {
    /// Brightness floor in percent; also the resting level.
    pub brightness_min: f32,
    pub brightness_max: f32,
    /// Smoothed RMS × gain = brightness percent before clamping.
    pub gain: f32,
    /// Weight of the previous level in the exponential smoother.
    pub smoothing: f32,
    /// Control loop period.
    pub tick_ms: u64,
    /// Samples around the playback cursor measured each tick.
    pub window_samples: usize,
    /// Ticks used to fade back to the floor after playback.
    pub fade_ticks: u32,
}

impl Default for LedConfig {
    fn default() -> Self {
        Self {
            brightness_min: 5.0,
            brightness_max: 85.0,
            gain: 120.0,
            smoothing: 0.85,
            tick_ms: 10,
            window_samples: 1_024,
            fade_ticks: 10,
        }
    }
}

impl LedConfig {
    pub fn validate(&self) -> Result<()> {
        let pct = |v: f32| (0.0..=100.0).contains(&v);
        if !(pct(self.brightness_min)
            && pct(self.brightness_max)
            && self.brightness_min <= self.brightness_max)
        {
            return Err(GrimvoxError::InvalidConfig(format!(
                "led brightness range [{}, {}] must sit inside [0, 100]",
                self.brightness_min, self.brightness_max
            )));
        }
        if !(self.gain.is_finite() && self.gain >= 0.0) {
            return Err(GrimvoxError::InvalidConfig(format!(
                "led gain must be non-negative, got {}",
                self.gain
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(GrimvoxError::InvalidConfig(format!(
                "led smoothing must be in [0, 1), got {}",
                self.smoothing
            )));
        }
        if self.tick_ms == 0 || self.window_samples == 0 {
            return Err(GrimvoxError::InvalidConfig(
                "led tick_ms and window_samples must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Linux sysfs PWM line driving the LED.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PwmConfig {
    pub enabled: bool,
    /// `/sys/class/pwm/pwmchip{chip}`
    pub chip: u32,
    /// `pwm{channel}` under the chip.
    pub channel: u32,
    pub frequency_hz: u32,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            chip: 0,
            channel: 0,
            frequency_hz: 1_000,
        }
    }
}
