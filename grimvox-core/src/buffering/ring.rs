//! Fixed-capacity history of the most recent capture audio.
//!
//! Written by the pipeline thread once per drained block, read by the
//! listener for pre-roll and the amplitude wake trigger. One
//! `parking_lot::Mutex` guards cursor and storage; both critical sections are
//! a single `copy_from_slice` pair, so a reader never stalls the writer for
//! longer than a memcpy.

use parking_lot::Mutex;
use tracing::debug;

use super::buffer::secs_to_samples;

struct RingState {
    data: Vec<f32>,
    /// Next index to write. Always `< data.len()`.
    write_pos: usize,
    total_written: u64,
}

/// Circular sample store of capacity `duration_secs × sample_rate`.
pub struct RingBuffer {
    state: Mutex<RingState>,
    sample_rate: u32,
    capacity: usize,
}

impl RingBuffer {
    /// Create a zero-filled ring holding `duration_secs` of audio.
    pub fn new(duration_secs: f32, sample_rate: u32) -> Self {
        let capacity = secs_to_samples(duration_secs, sample_rate).max(1);
        Self {
            state: Mutex::new(RingState {
                data: vec![0.0; capacity],
                write_pos: 0,
                total_written: 0,
            }),
            sample_rate,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Total samples ever written (monotonic, not reduced by wraparound).
    pub fn total_written(&self) -> u64 {
        self.state.lock().total_written
    }

    /// Append samples, overwriting the oldest data once full.
    pub fn write(&self, samples: &[f32]) {
        if samples.is_empty() {
            return;
        }
        let cap = self.capacity;
        let mut state = self.state.lock();
        state.total_written += samples.len() as u64;

        if samples.len() >= cap {
            // Only the newest `cap` samples survive; lay them out from index 0.
            state.data.copy_from_slice(&samples[samples.len() - cap..]);
            state.write_pos = 0;
            return;
        }

        let pos = state.write_pos;
        let first = (cap - pos).min(samples.len());
        state.data[pos..pos + first].copy_from_slice(&samples[..first]);
        let rest = samples.len() - first;
        if rest > 0 {
            state.data[..rest].copy_from_slice(&samples[first..]);
        }
        state.write_pos = (pos + samples.len()) % cap;
    }

    /// Copy of the most recent `duration_secs` of audio, oldest sample first.
    ///
    /// Requests longer than the ring are clamped to its capacity.
    pub fn read_latest(&self, duration_secs: f32) -> Vec<f32> {
        self.read_latest_samples(secs_to_samples(duration_secs, self.sample_rate))
    }

    /// Copy of the most recent `count` samples, oldest sample first.
    pub fn read_latest_samples(&self, count: usize) -> Vec<f32> {
        let cap = self.capacity;
        if count > cap {
            debug!(requested = count, capacity = cap, "ring read clamped to capacity");
        }
        let n = count.min(cap);
        let mut out = vec![0.0f32; n];
        if n == 0 {
            return out;
        }

        let state = self.state.lock();
        let start = (state.write_pos + cap - n) % cap;
        let first = (cap - start).min(n);
        out[..first].copy_from_slice(&state.data[start..start + first]);
        if first < n {
            out[first..].copy_from_slice(&state.data[..n - first]);
        }
        out
    }

    /// RMS of the most recent `duration_secs`.
    pub fn rms_latest(&self, duration_secs: f32) -> f32 {
        super::buffer::rms(&self.read_latest(duration_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn ramp(from: usize, to: usize) -> Vec<f32> {
        (from..to).map(|i| i as f32).collect()
    }

    #[test]
    fn read_before_wrap_returns_latest_in_order() {
        let ring = RingBuffer::new(1.0, 100);
        ring.write(&ramp(0, 40));
        assert_eq!(ring.read_latest(0.1), ramp(30, 40));
    }

    #[test]
    fn wraparound_preserves_temporal_order() {
        let ring = RingBuffer::new(1.0, 100);
        let all = ramp(0, 357);
        for block in all.chunks(13) {
            ring.write(block);
        }
        assert_eq!(ring.read_latest(0.5), ramp(307, 357));
        assert_eq!(ring.read_latest(1.0), ramp(257, 357));
        assert_eq!(ring.total_written(), 357);
    }

    #[test]
    fn oversized_write_keeps_only_newest_capacity() {
        let ring = RingBuffer::new(0.5, 100);
        ring.write(&ramp(0, 10));
        ring.write(&ramp(10, 180));
        assert_eq!(ring.read_latest(0.5), ramp(130, 180));
        ring.write(&ramp(180, 185));
        assert_eq!(ring.read_latest(0.1), ramp(175, 185));
    }

    #[test]
    fn request_beyond_capacity_is_clamped() {
        let ring = RingBuffer::new(0.2, 100);
        ring.write(&ramp(0, 50));
        let out = ring.read_latest(5.0);
        assert_eq!(out.len(), 20);
        assert_eq!(out, ramp(30, 50));
    }

    #[test]
    fn unwritten_history_reads_as_silence() {
        let ring = RingBuffer::new(1.0, 100);
        ring.write(&[1.0, 1.0]);
        let out = ring.read_latest(0.05);
        assert_eq!(out, vec![0.0, 0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn concurrent_writer_and_reader_never_tear_blocks() {
        // Each block is a constant value; a torn read would show a value
        // change that is not on a block boundary relative to the write cursor.
        let ring = Arc::new(RingBuffer::new(0.64, 100));
        let writer = {
            let ring = Arc::clone(&ring);
            thread::spawn(move || {
                for i in 0..2_000 {
                    ring.write(&[i as f32; 16]);
                }
            })
        };
        for _ in 0..2_000 {
            let snapshot = ring.read_latest_samples(64);
            assert_eq!(snapshot.len(), 64);
            for pair in snapshot.windows(2) {
                assert!(pair[1] >= pair[0], "history went backwards: {pair:?}");
            }
        }
        writer.join().expect("writer panicked");
    }
}
