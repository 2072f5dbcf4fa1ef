//! Debounced wake confirmation state machine.

use std::time::{Duration, Instant};

use tracing::{debug, trace};

/// Observable state of a [`WakeConfirmation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    Idle,
    Candidate { hits: u32 },
    /// Confirmed and still inside the debounce window.
    Confirmed,
}

/// Requires `confirm_threshold` consecutive hits, then suppresses further
/// events for `debounce`.
#[derive(Debug, Clone)]
pub struct WakeConfirmation {
    confirm_threshold: u32,
    debounce: Duration,
    state: WakeState,
    confirmed_at: Option<Instant>,
}

impl WakeConfirmation {
    /// A `confirm_threshold` of 0 is treated as 1.
    pub fn new(confirm_threshold: u32, debounce: Duration) -> Self {
        Self {
            confirm_threshold: confirm_threshold.max(1),
            debounce,
            state: WakeState::Idle,
            confirmed_at: None,
        }
    }

    pub fn state(&self) -> WakeState {
        self.state
    }

    /// True while a previous confirmation is still suppressing events.
    pub fn is_debouncing(&self, now: Instant) -> bool {
        self.confirmed_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.debounce)
    }

    /// Feed one candidate event using the wall clock.
    pub fn observe(&mut self, hit: bool) -> bool {
        self.observe_at(hit, Instant::now())
    }

    /// Feed one candidate event observed at `now`.
    ///
    /// Returns `true` exactly once per confirmation.
    pub fn observe_at(&mut self, hit: bool, now: Instant) -> bool {
        if let Some(at) = self.confirmed_at {
            if now.saturating_duration_since(at) < self.debounce {
                trace!(hit, "wake event ignored during debounce");
                return false;
            }
            self.confirmed_at = None;
            self.state = WakeState::Idle;
        }

        if !hit {
            if let WakeState::Candidate { hits } = self.state {
                trace!(hits, "wake candidate reset by miss");
            }
            self.state = WakeState::Idle;
            return false;
        }

        let hits = match self.state {
            WakeState::Candidate { hits } => hits + 1,
            _ => 1,
        };

        if hits >= self.confirm_threshold {
            debug!(hits, "wake confirmed");
            self.state = WakeState::Confirmed;
            self.confirmed_at = Some(now);
            true
        } else {
            self.state = WakeState::Candidate { hits };
            false
        }
    }

    /// Drop any partial streak and any active debounce.
    pub fn reset(&mut self) {
        self.state = WakeState::Idle;
        self.confirmed_at = None;
    }
}
