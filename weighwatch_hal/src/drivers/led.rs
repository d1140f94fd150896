//! Status LED driver.

use crate::pin::DigitalPin;
use crate::registry::PinRegistry;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::types::{Direction, Level, PinId};

/// Owner name recorded in the pin registry.
pub const OWNER: &str = "led";

/// Single LED on an output line.
#[derive(Debug)]
pub struct StatusLed {
    pin: DigitalPin,
    half_period: Duration,
}

impl StatusLed {
    /// Claim `pin` as an output and switch the LED off.
    pub fn new(
        registry: &Arc<PinRegistry>,
        pin: PinId,
        half_period: Duration,
    ) -> Result<Self, GpioError> {
        let pin = registry.claim(pin, OWNER, Direction::Output)?;
        let led = Self { pin, half_period };
        led.set(Level::Low);
        Ok(led)
    }

    /// Pin in use.
    pub fn pin(&self) -> PinId {
        self.pin.pin()
    }

    fn set(&self, level: Level) {
        if let Err(e) = self.pin.write(level) {
            warn!("LED write failed on pin {}: {}", self.pin.pin(), e);
        }
    }

    /// Switch on.
    pub fn on(&self) {
        self.set(Level::High);
    }

    /// Switch off.
    pub fn off(&self) {
        self.set(Level::Low);
    }

    /// Flash `count` times at the configured half-period. Ends off.
    pub fn flash(&self, count: u32) {
        debug!("Flashing LED on pin {} x{}", self.pin.pin(), count);
        for i in 0..count {
            self.on();
            thread::sleep(self.half_period);
            self.off();
            if i + 1 < count {
                thread::sleep(self.half_period);
            }
        }
        self.off();
    }

    /// Switch off and release the pin.
    pub fn cleanup(self) {
        self.off();
        self.pin.release();
    }
}
