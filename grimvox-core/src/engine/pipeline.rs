//! Blocking capture loop on the pipeline thread.
//!
//! ## Per iteration
//!
//! ```text
//! 1. Drain the SPSC capture ring (device rate, mono)
//! 2. Report samples the callback had to drop
//! 3. Resample to the engine rate
//! 4. Cut fixed-length frames; each one is written to the RingBuffer and
//!    handed to the listener
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use super::listener::Listener;
use super::EngineShared;
use crate::audio::{CaptureFlags, RateConverter};
use crate::buffering::{CaptureConsumer, Consumer};
use crate::collab::Transcriber;

#[derive(Default)]
pub struct PipelineDiagnostics {
    pub frames_in: AtomicUsize,
    pub samples_dropped: AtomicUsize,
    pub vad_speech_frames: AtomicUsize,
    pub segments_finalized: AtomicUsize,
    pub segments_discarded: AtomicUsize,
    pub wake_confirmations: AtomicUsize,
    pub transcriptions: AtomicUsize,
    pub transcription_errors: AtomicUsize,
    pub replies_completed: AtomicUsize,
    pub replies_interrupted: AtomicUsize,
    pub collaborator_errors: AtomicUsize,
}

impl PipelineDiagnostics {
    pub fn reset(&self) {
        for counter in self.counters() {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn counters(&self) -> [&AtomicUsize; 11] {
        [
            &self.frames_in,
            &self.samples_dropped,
            &self.vad_speech_frames,
            &self.segments_finalized,
            &self.segments_discarded,
            &self.wake_confirmations,
            &self.transcriptions,
            &self.transcription_errors,
            &self.replies_completed,
            &self.replies_interrupted,
            &self.collaborator_errors,
        ]
    }

    pub(crate) fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        let load = |c: &AtomicUsize| c.load(Ordering::Relaxed);
        DiagnosticsSnapshot {
            frames_in: load(&self.frames_in),
            samples_dropped: load(&self.samples_dropped),
            vad_speech_frames: load(&self.vad_speech_frames),
            segments_finalized: load(&self.segments_finalized),
            segments_discarded: load(&self.segments_discarded),
            wake_confirmations: load(&self.wake_confirmations),
            transcriptions: load(&self.transcriptions),
            transcription_errors: load(&self.transcription_errors),
            replies_completed: load(&self.replies_completed),
            replies_interrupted: load(&self.replies_interrupted),
            collaborator_errors: load(&self.collaborator_errors),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub frames_in: usize,
    pub samples_dropped: usize,
    pub vad_speech_frames: usize,
    pub segments_finalized: usize,
    pub segments_discarded: usize,
    pub wake_confirmations: usize,
    pub transcriptions: usize,
    pub transcription_errors: usize,
    pub replies_completed: usize,
    pub replies_interrupted: usize,
    pub collaborator_errors: usize,
}

/// Everything the loop needs, moved onto the pipeline thread in one piece.
pub(crate) struct PipelineContext {
    pub frame_len: usize,
    pub target_rate: u32,
    pub capture_rate: u32,
    pub consumer: CaptureConsumer,
    pub flags: CaptureFlags,
    pub listener: Listener,
    pub shared: Arc<EngineShared>,
}

/// Samples drained from the capture ring per iteration.
const DRAIN_CHUNK: usize = 4_096;

/// Resampler input block. 20 ms at 48 kHz.
const RESAMPLE_CHUNK: usize = 960;

/// Sleep when the capture ring is empty.
const EMPTY_SLEEP: Duration = Duration::from_millis(5);

/// Run until the engine's running flag clears; hands the transcriber back.
pub(crate) fn run(mut ctx: PipelineContext) -> Box<dyn Transcriber> {
    let mut resampler = match RateConverter::new(ctx.capture_rate, ctx.target_rate, RESAMPLE_CHUNK)
    {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to create resampler");
            ctx.shared.running.store(false, Ordering::Release);
            return ctx.listener.into_transcriber();
        }
    };
    info!(
        capture_rate = ctx.capture_rate,
        target_rate = ctx.target_rate,
        frame_len = ctx.frame_len,
        "pipeline started"
    );

    let mut raw = vec![0f32; DRAIN_CHUNK];
    let mut pending: Vec<f32> = Vec::with_capacity(ctx.frame_len * 8);
    let mut frame: Vec<f32> = Vec::with_capacity(ctx.frame_len);
    let mut dropped_seen = 0u64;

    while ctx.shared.is_running() {
        let n = ctx.consumer.pop_slice(&mut raw);
        if n == 0 {
            std::thread::sleep(EMPTY_SLEEP);
            continue;
        }

        let dropped = ctx.flags.dropped.load(Ordering::Relaxed);
        if dropped > dropped_seen {
            warn!(
                dropped = dropped - dropped_seen,
                total = dropped,
                "capture ring overflow, samples dropped"
            );
            ctx.shared
                .diagnostics
                .samples_dropped
                .store(dropped as usize, Ordering::Relaxed);
            dropped_seen = dropped;
        }

        pending.extend(resampler.process(&raw[..n]));

        let mut offset = 0;
        while pending.len() - offset >= ctx.frame_len {
            frame.clear();
            frame.extend_from_slice(&pending[offset..offset + ctx.frame_len]);
            offset += ctx.frame_len;

            ctx.shared.ring.write(&frame);
            PipelineDiagnostics::bump(&ctx.shared.diagnostics.frames_in);
            ctx.listener.on_frame(&frame);
            if !ctx.shared.is_running() {
                break;
            }
        }
        pending.drain(..offset);
    }

    ctx.listener.shutdown();
    let snap = ctx.shared.diagnostics.snapshot();
    info!(
        frames = snap.frames_in,
        dropped = snap.samples_dropped,
        wakes = snap.wake_confirmations,
        "pipeline stopped"
    );
    ctx.listener.into_transcriber()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_and_reset() {
        let d = PipelineDiagnostics::default();
        PipelineDiagnostics::bump(&d.frames_in);
        PipelineDiagnostics::bump(&d.frames_in);
        PipelineDiagnostics::bump(&d.wake_confirmations);
        let snap = d.snapshot();
        assert_eq!(snap.frames_in, 2);
        assert_eq!(snap.wake_confirmations, 1);

        d.reset();
        assert_eq!(d.snapshot(), DiagnosticsSnapshot::default());
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let json = serde_json::to_value(DiagnosticsSnapshot::default()).expect("serialize");
        assert_eq!(json["segmentsFinalized"], 0);
        assert_eq!(json["samplesDropped"], 0);
    }
}
