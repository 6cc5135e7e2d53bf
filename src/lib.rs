//! Rotary encoder to virtual pointer bridge.
//!
//! Turning the knob moves the cursor along one axis, a short press switches between
//! the X and Y axis, and holding the button clicks.

pub mod bridge;
pub mod config;
pub mod emitter;
pub mod encoder;
pub mod gpio;
