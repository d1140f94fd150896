//! GPIO backends and the backend registry.
//!
//! A backend is the only code that touches physical lines. The
//! [`PinRegistry`](crate::registry::PinRegistry) drives a backend through the
//! [`GpioBackend`] trait, so drivers run unchanged on real hardware and in
//! simulation.
//!
//! - [`simulation`] - In-memory lines with attachable simulated devices
//! - `raspberry` - Raspberry Pi GPIO via `rppal` (feature `hardware`)
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `backend/`
//! 2. Implement [`GpioBackend`]
//! 3. Register a factory in [`BackendRegistry::with_builtin`]

pub mod simulation;

#[cfg(feature = "hardware")]
pub mod raspberry;

use std::collections::HashMap;
use std::sync::Arc;
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::numbering::NumberingMode;
use weighwatch_common::gpio::types::{Direction, Level, PinId};

/// Capability interface over the physical GPIO subsystem.
///
/// Pins are given in the numbering scheme passed to
/// [`set_numbering`](GpioBackend::set_numbering). All methods take `&self`;
/// implementations serialize access to their own state.
///
/// # Contract
///
/// - `setup` must precede `read`/`write` on a pin
/// - `cleanup` returns a line to its idle (input) state
/// - every failure is reported as a [`GpioError`], never a panic
pub trait GpioBackend: Send + Sync {
    /// Returns the backend's unique identifier (e.g. "simulation", "rppal").
    fn name(&self) -> &'static str;

    /// Select the numbering scheme for all later calls.
    fn set_numbering(&self, mode: NumberingMode) -> Result<(), GpioError>;

    /// Configure a line's direction.
    fn setup(&self, pin: PinId, direction: Direction) -> Result<(), GpioError>;

    /// Drive an output line.
    fn write(&self, pin: PinId, level: Level) -> Result<(), GpioError>;

    /// Sample a line.
    fn read(&self, pin: PinId) -> Result<Level, GpioError>;

    /// Return one line to its idle state.
    fn cleanup(&self, pin: PinId) -> Result<(), GpioError>;

    /// Return every configured line to its idle state.
    fn cleanup_all(&self) -> Result<(), GpioError>;
}

/// Factory function type for creating backend instances.
pub type BackendFactory = fn() -> Result<Arc<dyn GpioBackend>, GpioError>;

/// Registry of available GPIO backends.
///
/// Constructed at startup and queried by name. No global state.
pub struct BackendRegistry {
    factories: HashMap<&'static str, BackendFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Create a registry holding the built-in backends.
    ///
    /// `rppal` is always registered; without the `hardware` feature its
    /// factory reports [`GpioError::HardwareAbsent`].
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register("simulation", simulation::create_backend);
        registry.register("rppal", create_rppal_backend);
        registry
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: BackendFactory) {
        if self.factories.contains_key(name) {
            panic!("Backend '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a backend factory by name.
    pub fn get_factory(&self, name: &str) -> Option<BackendFactory> {
        self.factories.get(name).copied()
    }

    /// Create a backend instance by name.
    ///
    /// # Errors
    /// - `GpioError::BackendNotFound` if no backend with the given name is registered
    /// - `GpioError::HardwareAbsent` if the backend cannot reach its hardware
    pub fn create(&self, name: &str) -> Result<Arc<dyn GpioBackend>, GpioError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| GpioError::BackendNotFound(name.to_string()))?;
        factory()
    }

    /// List all registered backend names.
    pub fn list_backends(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "hardware")]
fn create_rppal_backend() -> Result<Arc<dyn GpioBackend>, GpioError> {
    Ok(Arc::new(raspberry::RppalGpio::new()?))
}

#[cfg(not(feature = "hardware"))]
fn create_rppal_backend() -> Result<Arc<dyn GpioBackend>, GpioError> {
    Err(GpioError::HardwareAbsent(
        "built without the `hardware` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_backends_registered() {
        let reg = BackendRegistry::with_builtin();
        let mut names = reg.list_backends();
        names.sort();
        assert_eq!(names, vec!["rppal", "simulation"]);
    }

    #[test]
    fn create_simulation_backend() {
        let reg = BackendRegistry::with_builtin();
        let backend = reg.create("simulation").expect("should create");
        assert_eq!(backend.name(), "simulation");
    }

    #[test]
    fn backend_not_found() {
        let reg = BackendRegistry::new();
        let result = reg.create("spidev");
        assert!(matches!(result, Err(GpioError::BackendNotFound(_))));
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn rppal_without_feature_is_hardware_absent() {
        let reg = BackendRegistry::with_builtin();
        assert!(matches!(
            reg.create("rppal"),
            Err(GpioError::HardwareAbsent(_))
        ));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn registry_duplicate_panics() {
        let mut reg = BackendRegistry::new();
        reg.register("dup", simulation::create_backend);
        reg.register("dup", simulation::create_backend);
    }
}
