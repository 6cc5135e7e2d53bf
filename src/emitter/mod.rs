//! Virtual pointer output
//!
//! [`EventEmitter`] is the seam between the bridge and whatever injects events into
//! the host. [`VirtualPointer`] owns one emitter and guarantees it is closed exactly
//! once, either explicitly or when dropped on an error path.

pub mod uinput;

use crate::encoder::MotionEvent;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

pub use uinput::UinputEmitter;

// Button reported by a click
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickButton {
    #[default]
    Left,
    Right,
    Middle,
}

// What the virtual device is created with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub name: String,
    pub click_button: ClickButton,
}

impl Default for DeviceCapabilities {
    fn default() -> Self {
        Self {
            name: "Rotary Pointer".to_string(),
            click_button: ClickButton::Left,
        }
    }
}

// Event forwarded to the host input subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Motion(MotionEvent),
    Click,
}

#[derive(Debug, thiserror::Error)]
pub enum EmitterError {
    #[error("Failed to create virtual device: {0}")]
    DeviceCreationFailed(String),

    #[error("Failed to emit event: {0}")]
    EmitFailed(String),

    #[error("Virtual device already closed")]
    Closed,
}

pub trait EventEmitter: Send {
    fn emit(&mut self, event: &PointerEvent) -> Result<(), EmitterError>;

    /// Destroys the device. Called once by [`VirtualPointer`].
    fn close(&mut self) -> Result<(), EmitterError>;
}

/// Scoped owner of a created device.
pub struct VirtualPointer {
    emitter: Option<Box<dyn EventEmitter>>,
}

impl VirtualPointer {
    pub fn new(emitter: Box<dyn EventEmitter>) -> Self {
        Self {
            emitter: Some(emitter),
        }
    }

    pub fn emit(&mut self, event: &PointerEvent) -> Result<(), EmitterError> {
        match self.emitter.as_mut() {
            Some(emitter) => {
                debug!("Emitting {:?}", event);
                emitter.emit(event)
            }
            None => Err(EmitterError::Closed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.emitter.is_none()
    }

    pub fn close(&mut self) -> Result<(), EmitterError> {
        match self.emitter.take() {
            Some(mut emitter) => {
                info!("Closing virtual pointer device");
                emitter.close()
            }
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for VirtualPointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualPointer")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Drop for VirtualPointer {
    fn drop(&mut self) {
        if self.emitter.is_some() {
            warn!("Virtual pointer dropped without explicit close");
            if let Err(e) = self.close() {
                error!("Failed to close virtual pointer: {}", e);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    pub struct Recording {
        pub events: Vec<PointerEvent>,
        pub closes: usize,
    }

    /// Emitter double that records into shared state.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingEmitter {
        pub log: Arc<Mutex<Recording>>,
    }

    impl RecordingEmitter {
        pub fn events(&self) -> Vec<PointerEvent> {
            self.log.lock().unwrap().events.clone()
        }

        pub fn closes(&self) -> usize {
            self.log.lock().unwrap().closes
        }
    }

    impl EventEmitter for RecordingEmitter {
        fn emit(&mut self, event: &PointerEvent) -> Result<(), EmitterError> {
            let mut log = self.log.lock().unwrap();
            if log.closes > 0 {
                return Err(EmitterError::Closed);
            }
            log.events.push(*event);
            Ok(())
        }

        fn close(&mut self) -> Result<(), EmitterError> {
            self.log.lock().unwrap().closes += 1;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingEmitter;
    use super::*;
    use crate::encoder::Axis;

    #[test]
    fn close_runs_once() {
        let rec = RecordingEmitter::default();
        let mut pointer = VirtualPointer::new(Box::new(rec.clone()));

        pointer.close().unwrap();
        pointer.close().unwrap();
        drop(pointer);

        assert_eq!(rec.closes(), 1);
    }

    #[test]
    fn drop_closes() {
        let rec = RecordingEmitter::default();
        {
            let mut pointer = VirtualPointer::new(Box::new(rec.clone()));
            pointer.emit(&PointerEvent::Click).unwrap();
        }
        assert_eq!(rec.closes(), 1);
        assert_eq!(rec.events(), vec![PointerEvent::Click]);
    }

    #[test]
    fn emit_after_close_fails() {
        let rec = RecordingEmitter::default();
        let mut pointer = VirtualPointer::new(Box::new(rec.clone()));
        pointer.close().unwrap();

        let motion = PointerEvent::Motion(MotionEvent {
            axis: Axis::X,
            delta: 1,
        });
        assert!(matches!(pointer.emit(&motion), Err(EmitterError::Closed)));
        assert!(pointer.is_closed());
        assert!(rec.events().is_empty());
    }

    #[test]
    fn click_button_names() {
        #[derive(Deserialize)]
        struct Wrap {
            button: ClickButton,
        }
        let w: Wrap = toml::from_str("button = \"middle\"").unwrap();
        assert_eq!(w.button, ClickButton::Middle);
    }
}
