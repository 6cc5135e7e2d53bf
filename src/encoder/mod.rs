//! Encoder state: rotation counting and press classification
//!
//! Both components are pure state owners with no I/O:
//!
//! 1. [`rotation`] - lock-free tick counter drained into scaled [`MotionEvent`]s
//! 2. [`press`] - Idle/Pressed/HoldFired machine turning edges into [`ActionEvent`]s
//!
//! ```text
//! A/B ticks ──► RotationAccumulator ──drain──► MotionEvent
//! button    ──► PressClassifier     ─────────► ToggleMode | Click
//! ```

pub mod press;
pub mod rotation;

pub use press::{
    timer_handle, ActionEvent, ButtonEdge, ButtonState, ClassifierError, PressClassifier,
    PressPhase, TimedEdge,
};
pub use rotation::{Axis, Direction, MotionEvent, RotationAccumulator, RotationState};
