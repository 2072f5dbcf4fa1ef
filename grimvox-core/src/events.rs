//! Events broadcast by the orchestrator.
//!
//! | Event | Subscription |
//! |-------|--------------|
//! | `EngineStatusEvent` | `Orchestrator::subscribe_status` |
//! | `WakeEvent` | `Orchestrator::subscribe_wake` |
//! | `TranscriptEvent` | `Orchestrator::subscribe_transcripts` |
//! | `ActivityEvent` | `Orchestrator::subscribe_activity` |
//!
//! All of them serialise as camelCase JSON so a host can forward them as-is.

use serde::{Deserialize, Serialize};

use crate::vad::VadState;

/// What the engine is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineStatus {
    /// Constructed, `start()` not called yet.
    #[default]
    Idle,
    /// Waiting for a wake phrase.
    Listening,
    /// Recording a question or follow-up.
    Recording,
    /// Transcribing or waiting on the responder.
    Thinking,
    /// Playing a reply.
    Speaking,
    Stopped,
    /// Device failure; restart required.
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatusEvent {
    pub status: EngineStatus,
    pub detail: Option<String>,
}

/// Emitted once per confirmed wake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakeEvent {
    pub seq: u64,
    /// Matched phrase; `None` for an amplitude-triggered wake.
    pub phrase: Option<String>,
    /// Question spoken in the same breath as the wake phrase.
    pub question: Option<String>,
}

/// Which listening step produced a transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptKind {
    Wake,
    Question,
    FollowUp,
    /// Short utterance heard during playback, checked for stop phrases.
    StopCheck,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEvent {
    pub seq: u64,
    pub kind: TranscriptKind,
    pub text: String,
    pub confidence: f32,
    /// Length of the audio that was transcribed.
    pub duration_secs: f64,
}

/// Throttled level meter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub seq: u64,
    pub rms: f32,
    pub vad: VadState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_event_uses_camel_case_and_snake_kind() {
        let event = TranscriptEvent {
            seq: 4,
            kind: TranscriptKind::FollowUp,
            text: "and then?".into(),
            confidence: 0.75,
            duration_secs: 1.5,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["kind"], "follow_up");
        assert_eq!(json["durationSecs"], 1.5);
        assert_eq!(json["text"], "and then?");

        let back: TranscriptEvent = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.kind, TranscriptKind::FollowUp);
    }

    #[test]
    fn status_event_is_lowercase() {
        let event = EngineStatusEvent {
            status: EngineStatus::Speaking,
            detail: None,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["status"], "speaking");
        assert!(json["detail"].is_null());
        assert!(serde_json::from_str::<EngineStatus>(r#""Speaking""#).is_err());
    }

    #[test]
    fn activity_event_carries_vad_state() {
        let event = ActivityEvent {
            seq: 1,
            rms: 0.25,
            vad: VadState::Speech,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["vad"], "speech");
    }

    #[test]
    fn amplitude_wake_has_no_phrase() {
        let event = WakeEvent {
            seq: 9,
            phrase: None,
            question: None,
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert!(json["phrase"].is_null());
    }
}
