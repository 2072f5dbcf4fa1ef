use std::time::Instant;

use tracing::{debug, trace};

use super::{DiscardReason, SegmentConfig, SegmentOutcome, SegmentPhase, SpeechSegment};
use crate::buffering::{secs_to_samples, AudioBuffer};

/// Accumulates frames into one bounded utterance.
pub struct SegmentRecorder {
    config: SegmentConfig,
    sample_rate: u32,
    phase: SegmentPhase,
    samples: Vec<f32>,
    started_at: Instant,
    speech_started: bool,
    /// Samples of silence since the last voiced frame (post-onset only).
    silence_run: usize,
    /// Samples pushed while waiting for onset.
    waited: usize,

    pre_roll_len: usize,
    timeout_len: usize,
    min_len: usize,
    max_len: usize,
    keep_len: usize,
    onset_len: Option<usize>,
}

impl SegmentRecorder {
    pub fn new(config: SegmentConfig, sample_rate: u32) -> Self {
        let pre_roll_len = secs_to_samples(config.pre_roll_secs, sample_rate);
        let timeout_len = secs_to_samples(config.speech_timeout_secs, sample_rate).max(1);
        let min_len = secs_to_samples(config.min_speech_duration_secs, sample_rate);
        let max_len = secs_to_samples(config.max_duration_secs, sample_rate).max(1);
        let keep_len = secs_to_samples(config.trailing_keep_secs, sample_rate);
        let onset_len = config
            .onset_timeout_secs
            .map(|s| secs_to_samples(s, sample_rate).max(1));

        Self {
            config,
            sample_rate,
            phase: SegmentPhase::Idle,
            samples: Vec::new(),
            started_at: Instant::now(),
            speech_started: false,
            silence_run: 0,
            waited: 0,
            pre_roll_len,
            timeout_len,
            min_len,
            max_len,
            keep_len,
            onset_len,
        }
    }

    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    pub fn phase(&self) -> SegmentPhase {
        self.phase
    }

    pub fn is_recording(&self) -> bool {
        self.phase == SegmentPhase::Recording
    }

    /// Seconds accumulated so far in the current recording.
    pub fn recorded_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Current post-onset silence run in seconds.
    pub fn silence_run_secs(&self) -> f64 {
        self.silence_run as f64 / self.sample_rate.max(1) as f64
    }

    /// Start recording and wait for the first speech frame.
    ///
    /// `pre_roll` is audio captured before the trigger, oldest first.
    pub fn begin(&mut self, pre_roll: &[f32]) {
        self.start(pre_roll, false);
    }

    /// Start recording when speech onset has already been observed and is
    /// contained in `pre_roll`.
    pub fn begin_with_speech(&mut self, pre_roll: &[f32]) {
        self.start(pre_roll, true);
    }

    fn start(&mut self, pre_roll: &[f32], speech_started: bool) {
        self.samples.clear();
        self.samples.extend_from_slice(pre_roll);
        self.started_at = Instant::now();
        self.speech_started = speech_started;
        self.silence_run = 0;
        self.waited = 0;
        self.phase = SegmentPhase::Recording;
        trace!(
            pre_roll = pre_roll.len(),
            speech_started,
            "segment recording started"
        );
    }

    /// Append one frame.
    ///
    /// `voiced` is the detector's raw decision for this frame. Frames pushed
    /// while not recording are ignored and yield `Continue`.
    pub fn push(&mut self, frame: &[f32], voiced: bool) -> SegmentOutcome {
        if self.phase != SegmentPhase::Recording {
            return SegmentOutcome::Continue;
        }

        self.samples.extend_from_slice(frame);

        if voiced {
            if !self.speech_started {
                debug!(waited = self.waited, "segment speech onset");
            }
            self.speech_started = true;
            self.silence_run = 0;
        } else if self.speech_started {
            self.silence_run += frame.len();
        } else {
            // Pre-onset audio slides through a pre-roll sized window.
            self.waited += frame.len();
            if self.samples.len() > self.pre_roll_len {
                let excess = self.samples.len() - self.pre_roll_len;
                self.samples.drain(..excess);
            }
            if self.onset_len.is_some_and(|limit| self.waited >= limit) {
                debug!(waited = self.waited, "segment discarded: no speech onset");
                return self.discard(DiscardReason::NoOnset);
            }
            return SegmentOutcome::Continue;
        }

        if self.silence_run >= self.timeout_len {
            let drop = self.silence_run.saturating_sub(self.keep_len);
            let keep = self.samples.len().saturating_sub(drop);
            self.samples.truncate(keep);

            if self.samples.len() < self.min_len {
                let duration_secs = self.recorded_secs();
                debug!(duration_secs, "segment discarded: too short");
                return self.discard(DiscardReason::TooShort { duration_secs });
            }
            return self.finalize(false);
        }

        if self.samples.len() >= self.max_len {
            debug!(
                max_secs = self.config.max_duration_secs,
                "segment force-finalized at max duration"
            );
            return self.finalize(true);
        }

        SegmentOutcome::Continue
    }

    /// Abandon the current recording and return to `Idle`.
    pub fn abort(&mut self) {
        self.samples.clear();
        self.speech_started = false;
        self.silence_run = 0;
        self.waited = 0;
        self.phase = SegmentPhase::Idle;
    }

    fn finalize(&mut self, forced: bool) -> SegmentOutcome {
        let samples = std::mem::take(&mut self.samples);
        let audio = AudioBuffer::new(samples, self.sample_rate);
        let total_duration_secs = audio.duration_secs();
        self.phase = SegmentPhase::Finalized;
        debug!(total_duration_secs, forced, "segment finalized");
        SegmentOutcome::Finalized(SpeechSegment {
            audio,
            started_at: self.started_at,
            total_duration_secs,
            forced,
        })
    }

    fn discard(&mut self, reason: DiscardReason) -> SegmentOutcome {
        self.samples.clear();
        self.phase = SegmentPhase::Discarded;
        SegmentOutcome::Discarded(reason)
    }
}
