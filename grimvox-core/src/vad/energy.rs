//! Energy-based VAD with hysteresis.
//!
//! ## Algorithm
//!
//! 1. Compute RMS of the incoming frame.
//! 2. RMS ≥ `speech_threshold` → `speech_run += 1`, `silence_run = 0`;
//!    enter `Speech` once `speech_run ≥ min_speech_frames`.
//! 3. RMS < `silence_threshold` → `silence_run += 1`, `speech_run = 0`;
//!    enter `Silence` once `silence_run ≥ min_silence_frames`.
//! 4. In between (the dead band) both runs reset and the state holds, so a
//!    frame that is neither clearly loud nor clearly quiet breaks a streak
//!    without flipping anything.

use super::{FrameVerdict, VadConfig, VadState, VoiceActivityDetector};
use crate::buffering::rms;

/// A simple energy-based voice activity detector.
#[derive(Debug, Clone)]
pub struct EnergyVad {
    config: VadConfig,
    state: VadState,
    speech_run: u32,
    silence_run: u32,
}

impl EnergyVad {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Silence,
            speech_run: 0,
            silence_run: 0,
        }
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    /// Classify a frame given its precomputed RMS.
    pub fn classify_rms(&mut self, rms: f32) -> FrameVerdict {
        let voiced = rms >= self.config.speech_threshold;

        if voiced {
            self.speech_run = self.speech_run.saturating_add(1);
            self.silence_run = 0;
            if self.speech_run >= self.config.min_speech_frames {
                self.state = VadState::Speech;
            }
        } else if rms < self.config.silence_threshold {
            self.silence_run = self.silence_run.saturating_add(1);
            self.speech_run = 0;
            if self.silence_run >= self.config.min_silence_frames {
                self.state = VadState::Silence;
            }
        } else {
            self.speech_run = 0;
            self.silence_run = 0;
        }

        FrameVerdict {
            state: self.state,
            voiced,
            rms,
        }
    }
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self::new(VadConfig::default())
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn classify(&mut self, frame: &[f32]) -> FrameVerdict {
        self.classify_rms(rms(frame))
    }

    fn state(&self) -> VadState {
        self.state
    }

    fn reset(&mut self) {
        self.state = VadState::Silence;
        self.speech_run = 0;
        self.silence_run = 0;
    }
}
