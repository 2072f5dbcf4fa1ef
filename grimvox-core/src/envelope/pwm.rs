//! Hardware brightness outputs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::PwmConfig;
use crate::error::{GrimvoxError, Result};

const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

/// A single duty-cycle line, 0–100 percent.
pub trait BrightnessOutput: Send {
    fn set_duty(&mut self, percent: f32) -> Result<()>;

    fn describe(&self) -> String;
}

/// Linux sysfs PWM channel.
///
/// Opening exports the channel when needed, programs the period from
/// `frequency_hz`, zeroes the duty cycle and enables the output. Dropping
/// disables it again.
#[derive(Debug)]
pub struct SysfsPwm {
    channel_dir: PathBuf,
    period_ns: u64,
}

impl SysfsPwm {
    pub fn open(config: &PwmConfig) -> Result<Self> {
        Self::open_at(Path::new(SYSFS_PWM_ROOT), config)
    }

    /// Open under an alternative sysfs root.
    pub fn open_at(root: &Path, config: &PwmConfig) -> Result<Self> {
        if !config.enabled {
            return Err(GrimvoxError::Hardware("pwm disabled in configuration".into()));
        }
        if config.frequency_hz == 0 {
            return Err(GrimvoxError::Hardware("pwm frequency must be non-zero".into()));
        }

        let chip_dir = root.join(format!("pwmchip{}", config.chip));
        if !chip_dir.is_dir() {
            return Err(GrimvoxError::Hardware(format!(
                "{} not present",
                chip_dir.display()
            )));
        }

        let channel_dir = chip_dir.join(format!("pwm{}", config.channel));
        if !channel_dir.is_dir() {
            debug!(chip = config.chip, channel = config.channel, "exporting pwm channel");
            fs::write(chip_dir.join("export"), config.channel.to_string())
                .map_err(|e| GrimvoxError::Hardware(format!("export failed: {e}")))?;
            if !channel_dir.is_dir() {
                return Err(GrimvoxError::Hardware(format!(
                    "{} did not appear after export",
                    channel_dir.display()
                )));
            }
        }

        let period_ns = 1_000_000_000u64 / config.frequency_hz as u64;
        let pwm = Self {
            channel_dir,
            period_ns,
        };
        pwm.write_attr("duty_cycle", 0)?;
        pwm.write_attr("period", period_ns)?;
        pwm.write_attr("enable", 1)?;

        info!(
            chip = config.chip,
            channel = config.channel,
            frequency_hz = config.frequency_hz,
            "pwm output ready"
        );
        Ok(pwm)
    }

    fn write_attr(&self, attr: &str, value: u64) -> Result<()> {
        fs::write(self.channel_dir.join(attr), value.to_string()).map_err(|e| {
            GrimvoxError::Hardware(format!("{}/{attr}: {e}", self.channel_dir.display()))
        })
    }
}

impl BrightnessOutput for SysfsPwm {
    fn set_duty(&mut self, percent: f32) -> Result<()> {
        let pct = percent.clamp(0.0, 100.0) as f64;
        let duty_ns = (self.period_ns as f64 * pct / 100.0).round() as u64;
        self.write_attr("duty_cycle", duty_ns)
    }

    fn describe(&self) -> String {
        format!("sysfs pwm {}", self.channel_dir.display())
    }
}

impl Drop for SysfsPwm {
    fn drop(&mut self) {
        let _ = self.write_attr("duty_cycle", 0);
        let _ = self.write_attr("enable", 0);
    }
}
