//! Raspberry Pi GPIO backend built on `rppal`.
//!
//! `rppal` addresses lines by BCM number; BOARD pins are translated through
//! the fixed header table before every call.

use super::GpioBackend;
use ::rppal::gpio::{Gpio, IoPin, Level as RppalLevel, Mode};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::{debug, info};
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::numbering::{board_to_bcm, NumberingMode};
use weighwatch_common::gpio::types::{Direction, Level, PinId};

/// GPIO backend for the Raspberry Pi header.
pub struct RppalGpio {
    gpio: Gpio,
    mode: RwLock<NumberingMode>,
    /// Configured lines keyed by BCM number. Dropping an `IoPin` restores
    /// the line's original mode.
    lines: Mutex<HashMap<u8, IoPin>>,
}

impl RppalGpio {
    /// Open the GPIO peripheral.
    ///
    /// # Errors
    /// Returns `GpioError::HardwareAbsent` if the peripheral cannot be opened
    /// (not a Raspberry Pi, missing `/dev/gpiomem`, insufficient permissions).
    pub fn new() -> Result<Self, GpioError> {
        let gpio = Gpio::new().map_err(|e| GpioError::HardwareAbsent(e.to_string()))?;
        info!("Opened Raspberry Pi GPIO peripheral");
        Ok(Self {
            gpio,
            mode: RwLock::new(NumberingMode::Bcm),
            lines: Mutex::new(HashMap::new()),
        })
    }

    fn bcm(&self, pin: PinId) -> Result<u8, GpioError> {
        let mode = *self.mode.read();
        match mode {
            NumberingMode::Bcm => Ok(pin.number()),
            NumberingMode::Board => board_to_bcm(pin)
                .map(PinId::number)
                .ok_or(GpioError::InvalidPin { pin, mode }),
        }
    }
}

fn to_mode(direction: Direction) -> Mode {
    match direction {
        Direction::Input => Mode::Input,
        Direction::Output => Mode::Output,
    }
}

fn to_rppal(level: Level) -> RppalLevel {
    match level {
        Level::Low => RppalLevel::Low,
        Level::High => RppalLevel::High,
    }
}

fn from_rppal(level: RppalLevel) -> Level {
    match level {
        RppalLevel::Low => Level::Low,
        RppalLevel::High => Level::High,
    }
}

impl GpioBackend for RppalGpio {
    fn name(&self) -> &'static str {
        "rppal"
    }

    fn set_numbering(&self, mode: NumberingMode) -> Result<(), GpioError> {
        *self.mode.write() = mode;
        Ok(())
    }

    fn setup(&self, pin: PinId, direction: Direction) -> Result<(), GpioError> {
        let bcm = self.bcm(pin)?;
        let mut lines = self.lines.lock();
        if let Some(line) = lines.get_mut(&bcm) {
            line.set_mode(to_mode(direction));
        } else {
            let line = self
                .gpio
                .get(bcm)
                .map_err(|e| GpioError::Backend(format!("BCM {bcm}: {e}")))?
                .into_io(to_mode(direction));
            lines.insert(bcm, line);
        }
        debug!("Pin {} (BCM {}) set up as {}", pin, bcm, direction);
        Ok(())
    }

    fn write(&self, pin: PinId, level: Level) -> Result<(), GpioError> {
        let bcm = self.bcm(pin)?;
        let mut lines = self.lines.lock();
        let line = lines
            .get_mut(&bcm)
            .ok_or_else(|| GpioError::Backend(format!("pin {pin} not set up")))?;
        line.write(to_rppal(level));
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<Level, GpioError> {
        let bcm = self.bcm(pin)?;
        let lines = self.lines.lock();
        let line = lines
            .get(&bcm)
            .ok_or_else(|| GpioError::Backend(format!("pin {pin} not set up")))?;
        Ok(from_rppal(line.read()))
    }

    fn cleanup(&self, pin: PinId) -> Result<(), GpioError> {
        let bcm = self.bcm(pin)?;
        self.lines.lock().remove(&bcm);
        Ok(())
    }

    fn cleanup_all(&self) -> Result<(), GpioError> {
        let mut lines = self.lines.lock();
        debug!("Releasing {} Raspberry Pi lines", lines.len());
        lines.clear();
        Ok(())
    }
}
