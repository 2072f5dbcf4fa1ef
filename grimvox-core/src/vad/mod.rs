//! Voice Activity Detection (VAD).
//!
//! `VoiceActivityDetector` is the seam the pipeline talks to. `EnergyVad` is
//! the only implementation shipped: RMS energy with a two-threshold dead band
//! and consecutive-frame hysteresis.

pub mod energy;

pub use energy::EnergyVad;

use serde::{Deserialize, Serialize};

use crate::error::{GrimvoxError, Result};

/// Debounced speech/silence state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VadState {
    #[default]
    Silence,
    Speech,
}

impl VadState {
    pub fn is_speech(self) -> bool {
        self == VadState::Speech
    }
}

/// Result of classifying one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameVerdict {
    /// Hysteresis-gated state after this frame.
    pub state: VadState,
    /// Raw per-frame decision: this frame alone crossed the speech threshold.
    pub voiced: bool,
    /// RMS energy of the frame.
    pub rms: f32,
}

/// Tuning for [`EnergyVad`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VadConfig {
    /// RMS at or above which a frame counts toward `Speech`.
    pub speech_threshold: f32,
    /// RMS below which a frame counts toward `Silence`.
    pub silence_threshold: f32,
    /// Consecutive loud frames needed to enter `Speech`.
    pub min_speech_frames: u32,
    /// Consecutive quiet frames needed to return to `Silence`.
    pub min_silence_frames: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            speech_threshold: 0.02,
            silence_threshold: 0.01,
            min_speech_frames: 3,
            min_silence_frames: 20,
        }
    }
}

impl VadConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.speech_threshold.is_finite() && self.speech_threshold > 0.0) {
            return Err(GrimvoxError::InvalidConfig(format!(
                "vad speech_threshold must be positive, got {}",
                self.speech_threshold
            )));
        }
        if !(self.silence_threshold.is_finite()
            && self.silence_threshold >= 0.0
            && self.silence_threshold <= self.speech_threshold)
        {
            return Err(GrimvoxError::InvalidConfig(format!(
                "vad silence_threshold must be in [0, speech_threshold], got {}",
                self.silence_threshold
            )));
        }
        if self.min_speech_frames == 0 || self.min_silence_frames == 0 {
            return Err(GrimvoxError::InvalidConfig(
                "vad frame counts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Trait for all VAD implementations.
///
/// Implementors are stateful and single-consumer: the pipeline thread owns
/// the detector and feeds frames strictly in capture order.
pub trait VoiceActivityDetector: Send + 'static {
    /// Classify one frame and advance the internal counters.
    fn classify(&mut self, frame: &[f32]) -> FrameVerdict;

    /// Current debounced state without consuming a frame.
    fn state(&self) -> VadState;

    /// Clear both run counters and return to `Silence`.
    fn reset(&mut self);
}
