//! Speech-segment end-pointer.
//!
//! One state machine serves every recording the listener makes: the wake
//! utterance, the question after a wake, and the shorter follow-up. They
//! differ only in their [`SegmentConfig`].
//!
//! ```text
//! Idle ──begin──▶ Recording ──silence timeout, long enough──▶ Finalized
//!                     │      ──silence timeout, too short───▶ Discarded
//!                     │      ──no onset within limit────────▶ Discarded
//!                     └──────── max duration ───────────────▶ Finalized
//! ```
//!
//! All durations are measured in samples pushed, never wall-clock time, so
//! a stalled pipeline thread cannot shorten a recording.

mod recorder;

pub use recorder::SegmentRecorder;

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::buffering::AudioBuffer;
use crate::error::{GrimvoxError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SegmentConfig {
    /// Silence after speech that closes the segment.
    pub speech_timeout_secs: f32,
    /// Segments shorter than this after trimming are discarded.
    pub min_speech_duration_secs: f32,
    /// Hard bound; reaching it force-finalizes.
    pub max_duration_secs: f32,
    /// Audio before the trigger kept at the head of the segment.
    pub pre_roll_secs: f32,
    /// Trailing silence kept after the last speech frame.
    pub trailing_keep_secs: f32,
    /// How long to wait for the first speech frame. `None` waits forever.
    pub onset_timeout_secs: Option<f32>,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self::question()
    }
}

impl SegmentConfig {
    /// Question recorded right after a wake confirmation.
    pub fn question() -> Self {
        Self {
            speech_timeout_secs: 0.8,
            min_speech_duration_secs: 0.5,
            max_duration_secs: 10.0,
            pre_roll_secs: 0.1,
            trailing_keep_secs: 0.05,
            onset_timeout_secs: Some(5.0),
        }
    }

    /// Follow-up after a reply has played.
    pub fn follow_up() -> Self {
        Self {
            speech_timeout_secs: 0.6,
            min_speech_duration_secs: 0.3,
            max_duration_secs: 8.0,
            pre_roll_secs: 0.1,
            trailing_keep_secs: 0.05,
            onset_timeout_secs: Some(4.0),
        }
    }

    /// Utterance checked for a wake phrase; started on VAD onset.
    pub fn wake_utterance() -> Self {
        Self {
            speech_timeout_secs: 0.5,
            min_speech_duration_secs: 0.3,
            max_duration_secs: 5.0,
            pre_roll_secs: 0.3,
            trailing_keep_secs: 0.05,
            onset_timeout_secs: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let positive = |name: &str, v: f32| {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(GrimvoxError::InvalidConfig(format!(
                    "segment {name} must be positive, got {v}"
                )))
            }
        };
        positive("speech_timeout_secs", self.speech_timeout_secs)?;
        positive("max_duration_secs", self.max_duration_secs)?;
        if let Some(onset) = self.onset_timeout_secs {
            positive("onset_timeout_secs", onset)?;
        }
        for (name, v) in [
            ("min_speech_duration_secs", self.min_speech_duration_secs),
            ("pre_roll_secs", self.pre_roll_secs),
            ("trailing_keep_secs", self.trailing_keep_secs),
        ] {
            if !(v.is_finite() && v >= 0.0) {
                return Err(GrimvoxError::InvalidConfig(format!(
                    "segment {name} must be non-negative, got {v}"
                )));
            }
        }
        if self.min_speech_duration_secs > self.max_duration_secs {
            return Err(GrimvoxError::InvalidConfig(
                "segment min_speech_duration_secs exceeds max_duration_secs".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentPhase {
    Idle,
    Recording,
    Finalized,
    Discarded,
}

/// A closed, non-empty recording.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub audio: AudioBuffer,
    pub started_at: Instant,
    /// Duration of `audio` in seconds.
    pub total_duration_secs: f64,
    /// True when the max-duration bound closed the segment.
    pub forced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DiscardReason {
    /// No speech frame arrived within `onset_timeout_secs`.
    NoOnset,
    TooShort { duration_secs: f64 },
}

#[derive(Debug, Clone)]
pub enum SegmentOutcome {
    /// Still recording (or idle; see [`SegmentRecorder::push`]).
    Continue,
    Finalized(SpeechSegment),
    Discarded(DiscardReason),
}

impl SegmentOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SegmentOutcome::Continue)
    }
}
