use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

// Pointer axis that rotation is mapped onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub fn toggled(self) -> Self {
        match self {
            Axis::X => Axis::Y,
            Axis::Y => Axis::X,
        }
    }
}

// Rotation direction of a single detent step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

impl Direction {
    /// Signed step value. Clockwise moves right on X and down on Y.
    pub fn step(self) -> i64 {
        match self {
            Direction::Clockwise => 1,
            Direction::CounterClockwise => -1,
        }
    }
}

// Relative pointer motion produced by a drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionEvent {
    pub axis: Axis,
    pub delta: i32,
}

/// Snapshot of the accumulator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationState {
    pub steps: i64,
    pub axis: Axis,
}

impl RotationState {
    fn take_motion(&mut self, scale_factor: i32) -> Option<MotionEvent> {
        let steps = std::mem::take(&mut self.steps);
        if steps == 0 {
            return None;
        }

        let delta = steps
            .saturating_mul(i64::from(scale_factor))
            .clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;

        debug!("Drained {} steps -> {:?} delta {}", steps, self.axis, delta);
        Some(MotionEvent {
            axis: self.axis,
            delta,
        })
    }
}

/// Counts encoder ticks and hands them out as scaled motion.
///
/// Steps and axis live under one lock. A drain reads the count, resets it and tags it
/// with the axis in a single critical section, and
/// [`drain_and_toggle`](Self::drain_and_toggle) also flips the axis before releasing
/// it, so steps counted under one axis are never reported on the other. The lock is
/// only held for a few arithmetic operations, so interrupt threads calling
/// [`on_tick`](Self::on_tick) never wait on anything slow.
#[derive(Debug)]
pub struct RotationAccumulator {
    state: Mutex<RotationState>,
}

impl Default for RotationAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl RotationAccumulator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RotationState {
                steps: 0,
                axis: Axis::X,
            }),
        }
    }

    // A panicking holder cannot leave the counter half-written
    fn lock(&self) -> MutexGuard<'_, RotationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn on_tick(&self, direction: Direction) {
        let mut state = self.lock();
        state.steps = state.steps.saturating_add(direction.step());
    }

    /// Takes all pending steps and scales them onto the current axis.
    ///
    /// Returns `None` when the net rotation since the last drain is zero.
    pub fn drain_and_scale(&self, scale_factor: i32) -> Option<MotionEvent> {
        debug_assert!(scale_factor > 0);
        self.lock().take_motion(scale_factor)
    }

    /// Drains pending steps under the current axis, then switches to the other axis.
    ///
    /// Returns the drained motion, if any, and the new axis.
    pub fn drain_and_toggle(&self, scale_factor: i32) -> (Option<MotionEvent>, Axis) {
        debug_assert!(scale_factor > 0);
        let mut state = self.lock();
        let motion = state.take_motion(scale_factor);
        state.axis = state.axis.toggled();
        (motion, state.axis)
    }

    pub fn set_axis(&self, axis: Axis) {
        self.lock().axis = axis;
    }

    pub fn axis(&self) -> Axis {
        self.lock().axis
    }

    pub fn snapshot(&self) -> RotationState {
        *self.lock()
    }
}
