//! Virtual wall clock of a test.
//!
//! The clock is either frozen at an instant or running at real time plus a
//! shift. Freezing discards the shift and shifting releases the freeze.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use hostbed_core::NowFn;
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct ClockState {
    frozen: Option<DateTime<Utc>>,
    shift: TimeDelta,
}

/// A clock tests can freeze and move.
#[derive(Debug, Default)]
pub struct VirtualClock {
    state: Mutex<ClockState>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// The frozen instant, or real time plus the shift.
    pub fn now(&self) -> DateTime<Utc> {
        let state = self.state.lock();
        state.frozen.unwrap_or_else(|| Utc::now() + state.shift)
    }

    /// Moves the clock by `delta` on top of any earlier shift.
    pub fn time_shift(&self, delta: TimeDelta) {
        let mut state = self.state.lock();
        state.frozen = None;
        state.shift += delta;
    }

    /// Shifts the clock so that it reads `target` right now.
    ///
    /// The shift is computed once; the clock keeps running from `target`.
    pub fn time_shift_to(&self, target: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.frozen = None;
        state.shift = target - Utc::now();
    }

    /// Pins [`now`](Self::now) to `instant`.
    pub fn freeze_time(&self, instant: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.shift = TimeDelta::zero();
        state.frozen = Some(instant);
    }

    pub fn unfreeze_time(&self) {
        self.state.lock().frozen = None;
    }

    pub fn is_frozen(&self) -> bool {
        self.state.lock().frozen.is_some()
    }

    /// A clock function reading this clock, for handler contexts.
    pub fn now_fn(self: &Arc<Self>) -> NowFn {
        let clock = Arc::clone(self);
        Arc::new(move || clock.now())
    }
}
