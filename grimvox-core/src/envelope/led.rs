use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use super::{BrightnessOutput, EnvelopeFollower, LedConfig, PwmConfig, SysfsPwm};

/// Envelope follower bound to an optional brightness output.
///
/// Without an output every call is a no-op. A write failure drops the
/// output for the rest of the driver's life.
pub struct LedDriver {
    follower: EnvelopeFollower,
    output: Option<Box<dyn BrightnessOutput>>,
}

impl LedDriver {
    pub fn new(config: LedConfig, output: Option<Box<dyn BrightnessOutput>>) -> Self {
        Self {
            follower: EnvelopeFollower::new(config),
            output,
        }
    }

    /// Open the configured sysfs PWM line, degrading to a no-op driver when
    /// it is unavailable.
    pub fn from_pwm(config: LedConfig, pwm: &PwmConfig) -> Self {
        let output: Option<Box<dyn BrightnessOutput>> = match SysfsPwm::open(pwm) {
            Ok(out) => Some(Box::new(out)),
            Err(e) => {
                info!(reason = %e, "led output unavailable, envelope following disabled");
                None
            }
        };
        Self::new(config, output)
    }

    pub fn disabled(config: LedConfig) -> Self {
        Self::new(config, None)
    }

    pub fn is_active(&self) -> bool {
        self.output.is_some()
    }

    pub fn config(&self) -> &LedConfig {
        self.follower.config()
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.follower.config().tick_ms)
    }

    fn write(&mut self, percent: f32) -> bool {
        let Some(out) = self.output.as_mut() else {
            return false;
        };
        match out.set_duty(percent) {
            Ok(()) => true,
            Err(e) => {
                warn!(output = %out.describe(), error = %e, "led write failed, disabling output");
                self.output = None;
                false
            }
        }
    }

    /// One control tick: follow `window`, write the brightness.
    ///
    /// Returns the brightness written, or `None` when the driver is inactive.
    pub fn tick(&mut self, window: &[f32]) -> Option<f32> {
        if !self.is_active() {
            return None;
        }
        let b = self.follower.update(window);
        self.write(b).then_some(b)
    }

    /// Fade from the current brightness to the floor, one step per tick.
    pub fn fade_out(&mut self) {
        self.fade_out_unless(&AtomicBool::new(false));
    }

    /// Like [`fade_out`](Self::fade_out), but drops straight to the floor as
    /// soon as `abort` is raised.
    pub fn fade_out_unless(&mut self, abort: &AtomicBool) {
        let steps = self.follower.fade_out();
        if !self.is_active() {
            return;
        }
        let interval = self.tick_interval();
        for b in steps {
            if abort.load(Ordering::Acquire) {
                self.rest();
                return;
            }
            if !self.write(b) {
                return;
            }
            thread::sleep(interval);
        }
    }

    /// Write the resting brightness and reset the follower.
    pub fn rest(&mut self) {
        self.follower.reset();
        let floor = self.follower.config().brightness_min;
        self.write(floor);
    }

    /// Direct write bypassing the follower, clamped to 0–100.
    pub fn set_manual_brightness(&mut self, percent: f32) {
        let pct = if percent.is_nan() { 0.0 } else { percent.clamp(0.0, 100.0) };
        if self.write(pct) {
            info!(brightness = pct, "manual led brightness set");
        }
    }
}
