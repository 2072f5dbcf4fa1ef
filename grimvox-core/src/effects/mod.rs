//! Voice effects.
//!
//! An [`EffectChain`] is an ordered list of [`EffectStage`]s applied once per
//! synthesized utterance before playback. Stages are built from a
//! serialisable [`StageSpec`] list, so the whole chain is configuration.
//!
//! ```text
//! normalize → bass_boost → treble_cut → pitch_shift → formant_shift
//!           → [tempo_change] → distortion → reverb → final_normalize
//! ```

mod chain;
pub mod dynamics;
pub mod filter;
pub mod formant;
pub mod pitch;
pub mod reverb;

pub use chain::{ChainStats, EffectChain};
pub use dynamics::{Distortion, FinalNormalize, Normalize};
pub use filter::{BassBoost, Biquad, TrebleCut};
pub use formant::FormantShift;
pub use pitch::{PitchMode, PitchShift, TempoChange};
pub use reverb::Reverb;

use serde::{Deserialize, Serialize};

use crate::error::{GrimvoxError, Result};

/// One named DSP transform.
///
/// `process` must return a buffer at the same sample rate as its input.
/// Stages are pure functions of their input except where they document
/// carried state, which `reset` clears.
pub trait EffectStage: Send {
    fn name(&self) -> &'static str;

    fn process(&mut self, input: &[f32], sample_rate: u32) -> Result<Vec<f32>>;

    fn reset(&mut self) {}
}

/// Linear interpolation at fractional index `pos`; zero outside the buffer.
pub(crate) fn sample_at(x: &[f32], pos: f64) -> f32 {
    if !(pos >= 0.0) {
        return 0.0;
    }
    let i = pos.floor() as usize;
    let Some(&a) = x.get(i) else {
        return 0.0;
    };
    let b = x.get(i + 1).copied().unwrap_or(0.0);
    let frac = (pos - i as f64) as f32;
    a + (b - a) * frac
}

fn default_max_gain() -> f32 {
    10.0
}

fn default_formant_mix() -> f32 {
    0.3
}

fn default_enabled() -> bool {
    true
}

/// Parameters of one stage, tagged by `stage` in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum StageConfig {
    Normalize {
        target_db: f32,
        #[serde(default = "default_max_gain")]
        max_gain: f32,
    },
    BassBoost {
        cutoff_hz: f32,
        gain_db: f32,
    },
    TrebleCut {
        cutoff_hz: f32,
        gain_db: f32,
    },
    PitchShift {
        semitones: f32,
        #[serde(default)]
        mode: PitchMode,
    },
    FormantShift {
        factor: f32,
        #[serde(default = "default_formant_mix")]
        mix: f32,
    },
    TempoChange {
        factor: f32,
    },
    Distortion {
        drive: f32,
        mix: f32,
    },
    Reverb {
        room_size: f32,
        damping: f32,
        wet: f32,
    },
    FinalNormalize {
        ceiling: f32,
    },
}

fn check(stage: &'static str, ok: bool, what: impl FnOnce() -> String) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(GrimvoxError::InvalidConfig(format!("{stage}: {}", what())))
    }
}

fn unit(v: f32) -> bool {
    (0.0..=1.0).contains(&v)
}

impl StageConfig {
    pub fn name(&self) -> &'static str {
        match self {
            StageConfig::Normalize { .. } => "normalize",
            StageConfig::BassBoost { .. } => "bass_boost",
            StageConfig::TrebleCut { .. } => "treble_cut",
            StageConfig::PitchShift { .. } => "pitch_shift",
            StageConfig::FormantShift { .. } => "formant_shift",
            StageConfig::TempoChange { .. } => "tempo_change",
            StageConfig::Distortion { .. } => "distortion",
            StageConfig::Reverb { .. } => "reverb",
            StageConfig::FinalNormalize { .. } => "final_normalize",
        }
    }

    /// Reject parameters no input could make sensible.
    pub fn validate(&self) -> Result<()> {
        let name = self.name();
        match *self {
            StageConfig::Normalize { target_db, max_gain } => {
                check(name, target_db.is_finite() && target_db <= 0.0, || {
                    format!("target_db must be ≤ 0, got {target_db}")
                })?;
                check(name, max_gain.is_finite() && max_gain >= 1.0, || {
                    format!("max_gain must be ≥ 1, got {max_gain}")
                })
            }
            StageConfig::BassBoost { cutoff_hz, gain_db }
            | StageConfig::TrebleCut { cutoff_hz, gain_db } => {
                check(name, cutoff_hz.is_finite() && cutoff_hz > 0.0, || {
                    format!("cutoff_hz must be positive, got {cutoff_hz}")
                })?;
                check(name, gain_db.is_finite(), || format!("gain_db {gain_db}"))
            }
            StageConfig::PitchShift { semitones, .. } => {
                check(name, semitones.is_finite() && semitones.abs() <= 36.0, || {
                    format!("semitones must be within ±36, got {semitones}")
                })
            }
            StageConfig::FormantShift { factor, mix } => {
                check(name, factor.is_finite() && factor > 0.0, || {
                    format!("factor must be positive, got {factor}")
                })?;
                check(name, unit(mix), || format!("mix must be in [0, 1], got {mix}"))
            }
            StageConfig::TempoChange { factor } => {
                check(name, factor.is_finite() && factor > 0.0, || {
                    format!("factor must be positive, got {factor}")
                })
            }
            StageConfig::Distortion { drive, mix } => {
                check(name, drive.is_finite() && drive > 0.0, || {
                    format!("drive must be positive, got {drive}")
                })?;
                check(name, unit(mix), || format!("mix must be in [0, 1], got {mix}"))
            }
            StageConfig::Reverb {
                room_size,
                damping,
                wet,
            } => {
                check(name, unit(room_size), || format!("room_size {room_size}"))?;
                // Feedback at or above 1 never decays.
                check(name, (0.0..1.0).contains(&damping), || {
                    format!("damping must be in [0, 1), got {damping}")
                })?;
                check(name, unit(wet), || format!("wet {wet}"))
            }
            StageConfig::FinalNormalize { ceiling } => {
                check(name, ceiling > 0.0 && ceiling <= 1.0, || {
                    format!("ceiling must be in (0, 1], got {ceiling}")
                })
            }
        }
    }

    pub fn build(&self) -> Result<Box<dyn EffectStage>> {
        self.validate()?;
        Ok(match *self {
            StageConfig::Normalize { target_db, max_gain } => {
                Box::new(Normalize::new(target_db, max_gain))
            }
            StageConfig::BassBoost { cutoff_hz, gain_db } => {
                Box::new(BassBoost::new(cutoff_hz, gain_db))
            }
            StageConfig::TrebleCut { cutoff_hz, gain_db } => {
                Box::new(TrebleCut::new(cutoff_hz, gain_db))
            }
            StageConfig::PitchShift { semitones, mode } => Box::new(PitchShift::new(semitones, mode)),
            StageConfig::FormantShift { factor, mix } => Box::new(FormantShift::new(factor, mix)),
            StageConfig::TempoChange { factor } => Box::new(TempoChange::new(factor)),
            StageConfig::Distortion { drive, mix } => Box::new(Distortion::new(drive, mix)),
            StageConfig::Reverb {
                room_size,
                damping,
                wet,
            } => Box::new(Reverb::new(room_size, damping, wet)),
            StageConfig::FinalNormalize { ceiling } => Box::new(FinalNormalize::new(ceiling)),
        })
    }
}

/// A stage plus its enabled flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub stage: StageConfig,
}

impl StageSpec {
    pub fn on(stage: StageConfig) -> Self {
        Self {
            enabled: true,
            stage,
        }
    }

    pub fn off(stage: StageConfig) -> Self {
        Self {
            enabled: false,
            stage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EffectChainConfig {
    pub stages: Vec<StageSpec>,
}

impl Default for EffectChainConfig {
    fn default() -> Self {
        Self::demonic()
    }
}

impl EffectChainConfig {
    /// The deployed voice: deep, gritty, cavernous.
    pub fn demonic() -> Self {
        Self {
            stages: vec![
                StageSpec::on(StageConfig::Normalize {
                    target_db: -6.0,
                    max_gain: 10.0,
                }),
                StageSpec::on(StageConfig::BassBoost {
                    cutoff_hz: 80.0,
                    gain_db: 8.0,
                }),
                StageSpec::on(StageConfig::TrebleCut {
                    cutoff_hz: 3_000.0,
                    gain_db: -4.0,
                }),
                StageSpec::on(StageConfig::PitchShift {
                    semitones: -15.0,
                    mode: PitchMode::Granular,
                }),
                StageSpec::on(StageConfig::FormantShift {
                    factor: 0.7,
                    mix: 0.3,
                }),
                StageSpec::off(StageConfig::TempoChange { factor: 0.88 }),
                StageSpec::on(StageConfig::Distortion {
                    drive: 2.0,
                    mix: 0.4,
                }),
                StageSpec::on(StageConfig::Reverb {
                    room_size: 0.9,
                    damping: 0.2,
                    wet: 0.3,
                }),
                StageSpec::on(StageConfig::FinalNormalize { ceiling: 0.95 }),
            ],
        }
    }

    /// Empty chain: playback of the raw synthesized voice.
    pub fn passthrough() -> Self {
        Self { stages: Vec::new() }
    }

    pub fn validate(&self) -> Result<()> {
        self.stages.iter().try_for_each(|s| s.stage.validate())
    }
}
