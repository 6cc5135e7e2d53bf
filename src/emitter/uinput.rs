use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use tracing::{debug, error, info};

use super::{ClickButton, DeviceCapabilities, EmitterError, EventEmitter, PointerEvent};
use crate::encoder::Axis;

/// Linux uinput backed pointer.
pub struct UinputEmitter {
    device: Option<VirtualDevice>,
    button: Key,
}

impl UinputEmitter {
    pub fn create(capabilities: &DeviceCapabilities) -> Result<Self, EmitterError> {
        info!("Creating uinput device '{}'", capabilities.name);
        let button = button_key(capabilities.click_button);

        let mut keys = AttributeSet::<Key>::new();
        keys.insert(button);

        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| builder.name(&capabilities.name).with_keys(&keys))
            .and_then(|builder| builder.with_relative_axes(&axes))
            .and_then(|builder| builder.build())
            .map_err(|e| {
                error!("Failed to build uinput device: {}", e);
                EmitterError::DeviceCreationFailed(e.to_string())
            })?;

        info!(
            "Virtual pointer ready with REL_X, REL_Y and {:?}",
            capabilities.click_button
        );
        Ok(Self {
            device: Some(device),
            button,
        })
    }

    fn write(&mut self, events: &[InputEvent]) -> Result<(), EmitterError> {
        let device = self.device.as_mut().ok_or(EmitterError::Closed)?;
        // emit() terminates each batch with SYN_REPORT
        device
            .emit(events)
            .map_err(|e| EmitterError::EmitFailed(e.to_string()))
    }
}

impl EventEmitter for UinputEmitter {
    fn emit(&mut self, event: &PointerEvent) -> Result<(), EmitterError> {
        match event {
            PointerEvent::Motion(motion) => {
                let axis = match motion.axis {
                    Axis::X => RelativeAxisType::REL_X,
                    Axis::Y => RelativeAxisType::REL_Y,
                };
                self.write(&[InputEvent::new(EventType::RELATIVE, axis.0, motion.delta)])
            }
            PointerEvent::Click => {
                let code = self.button.code();
                self.write(&[InputEvent::new(EventType::KEY, code, 1)])?;
                self.write(&[InputEvent::new(EventType::KEY, code, 0)])
            }
        }
    }

    fn close(&mut self) -> Result<(), EmitterError> {
        match self.device.take() {
            Some(device) => {
                drop(device);
                debug!("uinput device destroyed");
                Ok(())
            }
            None => Err(EmitterError::Closed),
        }
    }
}

fn button_key(button: ClickButton) -> Key {
    match button {
        ClickButton::Left => Key::BTN_LEFT,
        ClickButton::Right => Key::BTN_RIGHT,
        ClickButton::Middle => Key::BTN_MIDDLE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_buttons_map_to_mouse_keys() {
        assert_eq!(button_key(ClickButton::Left), Key::BTN_LEFT);
        assert_eq!(button_key(ClickButton::Right), Key::BTN_RIGHT);
        assert_eq!(button_key(ClickButton::Middle), Key::BTN_MIDDLE);
    }
}
