//! # grimvox-core
//!
//! Audio front-end for a talking voice appliance.
//!
//! ## Architecture
//!
//! ```text
//! Microphone → AudioCapture → SPSC ring → pipeline thread
//!                                              │ resample, frame
//!                                         RingBuffer (history)
//!                                              │
//!                                   EnergyVad → WakeConfirmation
//!                                              │
//!                                       SegmentRecorder → Transcriber
//!                                              │
//!                                       speaker thread
//!                     Responder → Synthesizer → EffectChain → playback
//!                                                               │
//!                                              EnvelopeFollower → PWM LED
//! ```
//!
//! The capture callback never allocates. Speech-to-text, response generation
//! and text-to-speech are supplied by the host through the traits in
//! [`collab`].

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod collab;
pub mod effects;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod events;
pub mod playback;
pub mod segment;
pub mod vad;
pub mod wake;

// Convenience re-exports for downstream crates
pub use buffering::{AudioBuffer, RingBuffer};
pub use collab::{Collaborators, Responder, Synthesizer, Transcriber, Transcript};
pub use effects::{EffectChain, EffectChainConfig};
pub use engine::{Devices, EngineConfig, Orchestrator};
pub use envelope::{EnvelopeFollower, LedConfig, LedDriver, PwmConfig};
pub use error::{GrimvoxError, Result};
pub use events::{
    ActivityEvent, EngineStatus, EngineStatusEvent, TranscriptEvent, TranscriptKind, WakeEvent,
};
pub use playback::{play_with_envelope, PlaybackOutcome};
pub use segment::{SegmentConfig, SegmentRecorder};
pub use vad::{EnergyVad, VadConfig, VadState, VoiceActivityDetector};
pub use wake::{WakeConfig, WakeConfirmation};
