//! Audio devices: capture, playback, enumeration, rate conversion and WAV I/O.
//!
//! The engine never names cpal types directly. It receives a
//! [`CaptureFactory`] and a [`PlaybackFactory`] and calls them on the thread
//! that will own the stream, since cpal streams are `!Send`.

pub mod capture;
pub mod device;
pub mod playback;
pub mod resample;
pub mod wav;

pub use capture::{AudioCapture, CaptureFlags};
pub use device::{list_input_devices, list_output_devices, DeviceInfo};
pub use playback::CpalPlayback;
pub use resample::{resample_buffer, RateConverter};
pub use wav::{read_wav, write_wav};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::buffering::{AudioBuffer, CaptureProducer};
use crate::error::Result;

/// A running input stream feeding a [`CaptureProducer`]. Dropping it stops
/// delivery.
pub trait CaptureStream {
    /// Rate of the samples pushed into the producer.
    fn sample_rate(&self) -> u32;
}

/// Opens an input stream on the calling thread.
pub type CaptureFactory =
    Arc<dyn Fn(CaptureProducer, CaptureFlags) -> Result<Box<dyn CaptureStream>> + Send + Sync>;

/// Opens an output device on the calling thread.
pub type PlaybackFactory = Arc<dyn Fn() -> Result<Box<dyn PlaybackDevice>> + Send + Sync>;

/// An output device that plays one buffer at a time.
pub trait PlaybackDevice {
    /// Begin playing `audio`, replacing anything already playing.
    fn start(&mut self, audio: &AudioBuffer) -> Result<PlaybackCursor>;

    /// Halt playback now. The cursor reports finished afterwards.
    fn stop(&mut self);
}

struct CursorState {
    position: AtomicUsize,
    finished: AtomicBool,
    total: usize,
}

/// Shared view of playback progress, in samples of the source buffer.
///
/// Written by the device side, read by the LED loop. Cheap to clone.
#[derive(Clone)]
pub struct PlaybackCursor {
    state: Arc<CursorState>,
}

impl PlaybackCursor {
    pub fn new(total: usize) -> Self {
        Self {
            state: Arc::new(CursorState {
                position: AtomicUsize::new(0),
                finished: AtomicBool::new(total == 0),
                total,
            }),
        }
    }

    pub fn position(&self) -> usize {
        self.state.position.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.state.total
    }

    pub fn is_playing(&self) -> bool {
        !self.state.finished.load(Ordering::Acquire)
    }

    /// Move to `position`; reaching the end marks the cursor finished.
    pub fn set_position(&self, position: usize) {
        let clamped = position.min(self.state.total);
        self.state.position.store(clamped, Ordering::Release);
        if clamped >= self.state.total {
            self.finish();
        }
    }

    pub fn advance(&self, samples: usize) {
        self.set_position(self.position().saturating_add(samples));
    }

    pub fn finish(&self) {
        self.state.finished.store(true, Ordering::Release);
    }
}

/// Factory for the real input device, optionally preferring one by name.
pub fn cpal_capture(preferred: Option<String>) -> CaptureFactory {
    Arc::new(move |producer: CaptureProducer, flags: CaptureFlags| {
        let capture = AudioCapture::open(producer, flags, preferred.as_deref())?;
        Ok(Box::new(capture) as Box<dyn CaptureStream>)
    })
}

/// Factory for the default output device.
pub fn cpal_playback() -> PlaybackFactory {
    Arc::new(|| Ok(Box::new(CpalPlayback::open_default()?) as Box<dyn PlaybackDevice>))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_finishes_at_end() {
        let cursor = PlaybackCursor::new(100);
        assert!(cursor.is_playing());
        cursor.advance(60);
        assert_eq!(cursor.position(), 60);
        assert!(cursor.is_playing());
        cursor.advance(60);
        assert_eq!(cursor.position(), 100);
        assert!(!cursor.is_playing());
    }

    #[test]
    fn empty_cursor_is_already_finished() {
        assert!(!PlaybackCursor::new(0).is_playing());
    }

    #[test]
    fn clones_share_state() {
        let a = PlaybackCursor::new(10);
        let b = a.clone();
        a.finish();
        assert!(!b.is_playing());
    }
}
