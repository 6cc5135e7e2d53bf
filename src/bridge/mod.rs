//! Encoder to pointer bridge
//!
//! Runs three tasks around the shared encoder state:
//!
//! 1. drain task - wakes on rotation ticks and turns them into motion
//! 2. button task - feeds edges to the press classifier and runs the hold timer
//! 3. emitter task - sole owner of the virtual device
//!
//! # Architecture
//!
//! ```text
//! GPIO A/B ──tick──► RotationAccumulator ──drain──┐
//!                                                 ├──► emitter ──► uinput
//! GPIO SW ──edge──► PressClassifier ──click/toggle┘
//! ```
//!
//! Counting happens on the GPIO interrupt thread and never waits for the tasks, so a
//! slow device only delays motion, it never loses it.

pub mod bridge_handle;
pub mod input;
mod tasks;

pub use bridge_handle::{Bridge, BridgeError, BridgeState, Initializing, Running};
pub use input::{ButtonInput, RotationInput};
