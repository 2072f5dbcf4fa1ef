//! Wake-phrase confirmation.
//!
//! Candidate wake events come from one of two sources: phrase containment in
//! a transcribed utterance ([`PhraseMatcher`]) or, when no transcriber is
//! worth running, a raw amplitude crossing over the recent capture history
//! ([`AmplitudeTrigger`]). Either way they are fed to [`WakeConfirmation`],
//! which turns a noisy stream of hits into one debounced trigger.

pub mod amplitude;
pub mod confirm;
pub mod phrase;

pub use amplitude::AmplitudeTrigger;
pub use confirm::{WakeConfirmation, WakeState};
pub use phrase::{extract_question, PhraseMatcher};

use serde::{Deserialize, Serialize};

use crate::error::{GrimvoxError, Result};

/// Where candidate wake events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WakeSource {
    /// Transcribe each utterance and look for a wake phrase.
    #[default]
    Transcript,
    /// Raw RMS threshold crossing, no transcription.
    Amplitude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WakeConfig {
    pub phrases: Vec<String>,
    /// Only count when they make up nearly the whole utterance.
    pub stop_phrases: Vec<String>,
    /// Consecutive candidate hits required to confirm.
    pub confirm_threshold: u32,
    /// Candidate events are ignored for this long after a confirmation.
    pub debounce_ms: u64,
    pub source: WakeSource,
    /// RMS over `amplitude_window_secs` that counts as a hit in amplitude mode.
    pub amplitude_threshold: f32,
    pub amplitude_window_secs: f32,
    /// Spoken when a wake is confirmed but no question follows.
    pub follow_up_prompt: String,
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            phrases: [
                "evil assistant",
                "evil assistance",
                "dark one",
                "dark 1",
                "cthulhu",
                "summon",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            stop_phrases: ["shut up", "be silent", "stop", "unsummon", "quiet"]
                .into_iter()
                .map(String::from)
                .collect(),
            confirm_threshold: 1,
            debounce_ms: 1_000,
            source: WakeSource::Transcript,
            amplitude_threshold: 0.05,
            amplitude_window_secs: 1.0,
            follow_up_prompt: "What else do you seek, mortal? I await your next command!"
                .to_string(),
        }
    }
}

impl WakeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.confirm_threshold == 0 {
            return Err(GrimvoxError::InvalidConfig(
                "wake confirm_threshold must be at least 1".into(),
            ));
        }
        if self.source == WakeSource::Transcript && self.phrases.iter().all(|p| p.trim().is_empty())
        {
            return Err(GrimvoxError::InvalidConfig(
                "transcript wake source needs at least one wake phrase".into(),
            ));
        }
        if !(self.amplitude_window_secs.is_finite() && self.amplitude_window_secs > 0.0) {
            return Err(GrimvoxError::InvalidConfig(format!(
                "wake amplitude_window_secs must be positive, got {}",
                self.amplitude_window_secs
            )));
        }
        Ok(())
    }
}
