use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

// Action decided for one physical press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionEvent {
    ToggleMode,
    Click,
}

// Physical button edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    Pressed,
    Released,
}

// Timestamped edge as delivered by the GPIO layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedEdge {
    pub edge: ButtonEdge,
    pub at: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressPhase {
    Idle,
    Pressed { pressed_at: Instant },
    HoldFired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonState {
    pub phase: PressPhase,
    pub hold_threshold: Duration,
}

impl ButtonState {
    pub fn pressed_at(&self) -> Option<Instant> {
        match self.phase {
            PressPhase::Pressed { pressed_at } => Some(pressed_at),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Hold timer unavailable: {0}")]
    ClockUnavailable(String),
}

/// Returns the runtime handle whose time driver runs the hold deadline.
///
/// Fails with [`ClassifierError::ClockUnavailable`] outside a tokio runtime, or inside
/// one built without `enable_time`, so callers refuse to start instead of classifying
/// every press as a toggle.
pub fn timer_handle() -> Result<tokio::runtime::Handle, ClassifierError> {
    let handle = tokio::runtime::Handle::try_current()
        .map_err(|e| ClassifierError::ClockUnavailable(e.to_string()))?;

    // Creating a sleep panics when the time driver is disabled
    let _guard = handle.enter();
    std::panic::catch_unwind(|| drop(tokio::time::sleep(Duration::ZERO))).map_err(|_| {
        ClassifierError::ClockUnavailable("runtime has timers disabled".to_string())
    })?;

    Ok(handle)
}

/// Splits presses of a single switch into short toggles and long holds.
///
/// The classifier never decides on the press edge. The owner schedules a wakeup at
/// [`hold_deadline`](Self::hold_deadline) and calls [`poll_hold`](Self::poll_hold);
/// whichever of deadline or release comes first wins, with a release exactly on the
/// deadline counted as a hold.
#[derive(Debug)]
pub struct PressClassifier {
    state: ButtonState,
}

impl PressClassifier {
    pub fn new(hold_threshold: Duration) -> Self {
        Self {
            state: ButtonState {
                phase: PressPhase::Idle,
                hold_threshold,
            },
        }
    }

    pub fn state(&self) -> &ButtonState {
        &self.state
    }

    pub fn on_edge(&mut self, edge: TimedEdge) -> Option<ActionEvent> {
        match edge.edge {
            ButtonEdge::Pressed => {
                self.on_press(edge.at);
                None
            }
            ButtonEdge::Released => self.on_release(edge.at),
        }
    }

    pub fn on_press(&mut self, at: Instant) {
        if self.state.phase != PressPhase::Idle {
            // Missed a release edge; treat this as a fresh press.
            warn!("Press edge while {:?}, restarting press", self.state.phase);
        }
        self.state.phase = PressPhase::Pressed { pressed_at: at };
        debug!("Button pressed, hold deadline in {:?}", self.state.hold_threshold);
    }

    pub fn on_release(&mut self, at: Instant) -> Option<ActionEvent> {
        let phase = std::mem::replace(&mut self.state.phase, PressPhase::Idle);
        match phase {
            PressPhase::Idle => {
                warn!("Release edge without a press, ignoring");
                None
            }
            PressPhase::HoldFired => {
                debug!("Released after hold, nothing to emit");
                None
            }
            PressPhase::Pressed { pressed_at } => {
                let held = at.saturating_duration_since(pressed_at);
                if held < self.state.hold_threshold {
                    debug!("Short press of {:?} -> toggle", held);
                    Some(ActionEvent::ToggleMode)
                } else {
                    // The deadline passed before the timer got to run.
                    debug!("Release at {:?} reached the hold threshold -> click", held);
                    Some(ActionEvent::Click)
                }
            }
        }
    }

    /// Fires the hold action if the threshold has elapsed at `now`.
    pub fn poll_hold(&mut self, now: Instant) -> Option<ActionEvent> {
        let deadline = self.hold_deadline()?;
        if now < deadline {
            return None;
        }
        self.state.phase = PressPhase::HoldFired;
        debug!("Hold threshold reached -> click");
        Some(ActionEvent::Click)
    }

    /// Instant at which a still-pressed button turns into a hold.
    pub fn hold_deadline(&self) -> Option<Instant> {
        self.state
            .pressed_at()
            .map(|pressed_at| pressed_at + self.state.hold_threshold)
    }
}
