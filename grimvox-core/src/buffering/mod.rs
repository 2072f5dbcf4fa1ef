//! Audio buffering.
//!
//! Two distinct stores live here:
//!
//! - the capture SPSC ring (`ringbuf::HeapRb<f32>`) whose wait-free
//!   `push_slice` is the only thing the real-time device callback touches;
//! - [`RingBuffer`], the fixed-duration history the pipeline thread writes
//!   after draining and resampling, read for pre-roll and amplitude checks.

pub mod buffer;
pub mod ring;

pub use buffer::{peak, rms, secs_to_samples, AudioBuffer};
pub use ring::RingBuffer;

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, owned by the device callback.
pub type CaptureProducer = ringbuf::HeapProd<f32>;

/// Consumer half, owned by the pipeline thread.
pub type CaptureConsumer = ringbuf::HeapCons<f32>;

/// 2^18 = 262 144 f32 samples ≈ 5.5 s at 48 kHz.
///
/// The pipeline drains every few milliseconds; this only has to absorb a
/// stall while a collaborator call runs on the listener side.
pub const CAPTURE_RING_CAPACITY: usize = 1 << 18;

/// Create a matched producer/consumer pair for the capture path.
pub fn create_capture_ring() -> (CaptureProducer, CaptureConsumer) {
    HeapRb::<f32>::new(CAPTURE_RING_CAPACITY).split()
}
