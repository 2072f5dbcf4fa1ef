//! Playback with the LED following the audible envelope.
//!
//! ```text
//! caller thread                      scoped LED thread
//! ─────────────                      ─────────────────
//! device.start(audio) → cursor
//! spawn ──────────────────────────►  every tick: window around cursor → led.tick
//! poll: stop flag / cursor / deadline
//! device.stop() if interrupted
//! done = true ────────────────────►  loop exits, fade (cut short by stop)
//! join ◄──────────────────────────── returns
//! ```
//!
//! The LED loop lives inside `std::thread::scope`, so it is joined on every
//! path out of [`play_with_envelope`], including errors and interruption.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audio::{PlaybackCursor, PlaybackDevice};
use crate::buffering::AudioBuffer;
use crate::envelope::LedDriver;
use crate::error::Result;

/// Default period between checks of the stop flag.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Extra time a device may take past the buffer's duration before playback is
/// abandoned.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackOutcome {
    Completed,
    Interrupted,
}

/// Play `audio` on `device`, driving `led` from the audio under the cursor,
/// until it finishes or `stop` is raised.
///
/// Returns within one `poll` interval of `stop` being set. The LED fades out
/// after a completed reply and drops straight to its floor on interruption.
pub fn play_with_envelope(
    device: &mut dyn PlaybackDevice,
    audio: &AudioBuffer,
    led: &mut LedDriver,
    stop: &AtomicBool,
    poll: Duration,
) -> Result<PlaybackOutcome> {
    if stop.load(Ordering::Acquire) {
        return Ok(PlaybackOutcome::Interrupted);
    }
    let cursor = device.start(audio)?;
    let done = AtomicBool::new(false);
    let deadline = Instant::now() + Duration::from_secs_f64(audio.duration_secs()) + DRAIN_GRACE;

    let outcome = thread::scope(|scope| {
        let led_loop = scope.spawn(|| follow_cursor(led, &audio.samples, &cursor, &done, stop));

        let outcome = wait_for_end(&cursor, stop, poll, deadline);
        if outcome == PlaybackOutcome::Interrupted || cursor.is_playing() {
            device.stop();
        }
        done.store(true, Ordering::Release);
        if led_loop.join().is_err() {
            warn!("led loop panicked");
        }
        outcome
    });

    info!(
        ?outcome,
        played = cursor.position(),
        total = audio.len(),
        "playback finished"
    );
    Ok(outcome)
}

fn wait_for_end(
    cursor: &PlaybackCursor,
    stop: &AtomicBool,
    poll: Duration,
    deadline: Instant,
) -> PlaybackOutcome {
    loop {
        if stop.load(Ordering::Acquire) {
            return PlaybackOutcome::Interrupted;
        }
        if !cursor.is_playing() {
            return PlaybackOutcome::Completed;
        }
        if Instant::now() >= deadline {
            warn!(
                position = cursor.position(),
                total = cursor.total(),
                "playback overran its duration, abandoning"
            );
            return PlaybackOutcome::Completed;
        }
        thread::sleep(poll);
    }
}

fn follow_cursor(
    led: &mut LedDriver,
    samples: &[f32],
    cursor: &PlaybackCursor,
    done: &AtomicBool,
    stop: &AtomicBool,
) {
    if !led.is_active() {
        return;
    }
    let interval = led.tick_interval();
    let half = led.config().window_samples / 2;
    let mut ticks = 0u64;

    while !done.load(Ordering::Acquire) && cursor.is_playing() {
        let pos = cursor.position().min(samples.len());
        let end = (pos + half).min(samples.len());
        led.tick(&samples[pos.saturating_sub(half)..end]);
        ticks += 1;
        thread::sleep(interval);
    }
    debug!(ticks, "led loop ending");
    led.fade_out_unless(stop);
}
