use thiserror::Error;

/// All errors produced by grimvox-core.
#[derive(Debug, Error)]
pub enum GrimvoxError {
    #[error("audio device error: {0}")]
    AudioDevice(String),

    #[error("audio stream error: {0}")]
    AudioStream(String),

    #[error("no default input device found")]
    NoDefaultInputDevice,

    #[error("no default output device found")]
    NoDefaultOutputDevice,

    #[error("effect stage `{stage}` failed: {reason}")]
    Effect { stage: &'static str, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("brightness output unavailable: {0}")]
    Hardware(String),

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("engine is already running")]
    AlreadyRunning,

    #[error("engine is not running")]
    NotRunning,

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl GrimvoxError {
    pub(crate) fn effect(stage: &'static str, reason: impl Into<String>) -> Self {
        Self::Effect {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GrimvoxError>;
