//! Owned handle to one GPIO line.

use crate::registry::{PinRegistry, ReleaseOutcome};
use std::fmt;
use std::sync::Arc;
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::types::{Direction, Level, PinId};

/// Per-pin read/write handle.
///
/// Obtained only through [`PinRegistry::claim`], so holding one means the
/// registry recorded the holder as the pin's owner. The handle is not
/// `Clone`: one handle, one writer. Dropping it releases the pin if the
/// registry still lists this owner.
pub struct DigitalPin {
    registry: Arc<PinRegistry>,
    pin: PinId,
    owner: Arc<str>,
    direction: Direction,
    released: bool,
}

impl DigitalPin {
    pub(crate) fn new(
        registry: Arc<PinRegistry>,
        pin: PinId,
        owner: Arc<str>,
        direction: Direction,
    ) -> Self {
        Self {
            registry,
            pin,
            owner,
            direction,
            released: false,
        }
    }

    /// Pin number in the registry's numbering scheme.
    pub fn pin(&self) -> PinId {
        self.pin
    }

    /// Owner name recorded in the registry.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Direction requested at allocation.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sample the line.
    #[inline]
    pub fn read(&self) -> Result<Level, GpioError> {
        self.registry.read(self.pin, &self.owner)
    }

    /// Drive the line.
    #[inline]
    pub fn write(&self, level: Level) -> Result<(), GpioError> {
        self.registry.write(self.pin, &self.owner, level)
    }

    /// Drive the line high.
    pub fn set_high(&self) -> Result<(), GpioError> {
        self.write(Level::High)
    }

    /// Drive the line low.
    pub fn set_low(&self) -> Result<(), GpioError> {
        self.write(Level::Low)
    }

    /// Release the pin now and report what the registry did.
    pub fn release(mut self) -> ReleaseOutcome {
        self.released = true;
        self.registry.release(self.pin, &self.owner)
    }
}

impl Drop for DigitalPin {
    fn drop(&mut self) {
        if !self.released && self.registry.is_owned_by(self.pin, &self.owner) {
            self.registry.release(self.pin, &self.owner);
        }
    }
}

impl fmt::Debug for DigitalPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DigitalPin")
            .field("pin", &self.pin)
            .field("owner", &self.owner)
            .field("direction", &self.direction)
            .finish()
    }
}
