//! GPIO binding for the encoder and its switch
//!
//! Encoder channels are decoded on the interrupt thread and fed straight into the
//! accumulator; button edges are timestamped and queued for the button task. Nothing
//! in a callback blocks beyond the short decoder lock.

pub mod quadrature;

use rppal::gpio::{Event, Gpio, InputPin, Trigger};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::bridge::{ButtonInput, RotationInput};
use crate::config::PinConfig;
use crate::encoder::ButtonEdge;
pub use quadrature::QuadratureDecoder;

#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("Failed to open GPIO controller: {0}")]
    Init(#[source] rppal::gpio::Error),

    #[error("GPIO pin {pin}: {source}")]
    Pin {
        pin: u8,
        #[source]
        source: rppal::gpio::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    A,
    B,
}

/// Keeps the configured pins and their interrupts alive. Dropping it detaches them.
pub struct GpioBinding {
    encoder_a: InputPin,
    encoder_b: InputPin,
    button: InputPin,
}

impl GpioBinding {
    pub fn attach(
        pins: &PinConfig,
        rotation: RotationInput,
        button: ButtonInput,
    ) -> Result<Self, GpioError> {
        info!(
            "Attaching GPIO: encoder A={} B={}, button={}",
            pins.encoder_a, pins.encoder_b, pins.button
        );
        let gpio = Gpio::new().map_err(GpioError::Init)?;

        let input = |pin: u8| -> Result<InputPin, GpioError> {
            gpio.get(pin)
                .map(|p| p.into_input_pullup())
                .map_err(|source| GpioError::Pin { pin, source })
        };
        let mut encoder_a = input(pins.encoder_a)?;
        let mut encoder_b = input(pins.encoder_b)?;
        let mut button_pin = input(pins.button)?;

        let decoder = Arc::new(Mutex::new(QuadratureDecoder::new(
            encoder_a.is_high(),
            encoder_b.is_high(),
        )));

        for (pin, number, channel) in [
            (&mut encoder_a, pins.encoder_a, Channel::A),
            (&mut encoder_b, pins.encoder_b, Channel::B),
        ] {
            let decoder = decoder.clone();
            let rotation = rotation.clone();
            pin.set_async_interrupt(Trigger::Both, None, move |event: Event| {
                let level = trigger_level(event.trigger);
                let tick = match decoder.lock() {
                    Ok(mut decoder) => match channel {
                        Channel::A => decoder.set_a(level),
                        Channel::B => decoder.set_b(level),
                    },
                    Err(_) => {
                        error!("Quadrature decoder lock poisoned");
                        None
                    }
                };
                if let Some(direction) = tick {
                    rotation.tick(direction);
                }
            })
            .map_err(|source| GpioError::Pin {
                pin: number,
                source,
            })?;
        }

        let active_low = pins.button_active_low;
        let debounce = match pins.button_debounce_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        button_pin
            .set_async_interrupt(Trigger::Both, debounce, move |event: Event| {
                let edge = button_edge(trigger_level(event.trigger), active_low);
                debug!("Button edge {:?} (seq {})", edge, event.seqno);
                button.edge(edge);
            })
            .map_err(|source| GpioError::Pin {
                pin: pins.button,
                source,
            })?;

        info!("GPIO interrupts armed");
        Ok(Self {
            encoder_a,
            encoder_b,
            button: button_pin,
        })
    }

    pub fn detach(mut self) {
        for pin in [&mut self.encoder_a, &mut self.encoder_b, &mut self.button] {
            if let Err(e) = pin.clear_async_interrupt() {
                warn!("Failed to clear interrupt on GPIO {}: {}", pin.pin(), e);
            }
        }
        info!("GPIO interrupts cleared");
    }
}

fn trigger_level(trigger: Trigger) -> bool {
    match trigger {
        Trigger::RisingEdge => true,
        Trigger::FallingEdge => false,
        other => {
            warn!("Unexpected trigger {:?}, assuming low", other);
            false
        }
    }
}

fn button_edge(high: bool, active_low: bool) -> ButtonEdge {
    if high != active_low {
        ButtonEdge::Pressed
    } else {
        ButtonEdge::Released
    }
}
