//! # Weighwatch HAL Library
//!
//! Pin-ownership registry, bit-banged protocol drivers and the weighing
//! station loop.
//!
//! # Module Structure
//!
//! - [`backend`] - GPIO backends (simulation, Raspberry Pi) and their registry
//! - [`registry`] - Pin ownership and numbering mode authority
//! - [`pin`] - Owner-checked per-pin handle
//! - [`drivers`] - Load-cell ADC, buzzer and LED drivers
//! - [`actuation`] - Cross-thread actuation request queue
//! - [`monitor`] - Station orchestrator
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        weighwatch_hal                            │
//! │  ┌──────────────┐   ┌────────────────┐   ┌────────────────────┐  │
//! │  │ Actuation    │──►│ WeightMonitor  │──►│ WeightSensor       │  │
//! │  │ queue        │   │ (main thread)  │   │ ToneDriver / LED   │  │
//! │  └──────────────┘   └────────────────┘   └─────────┬──────────┘  │
//! │                                                    │ DigitalPin  │
//! │                                                    ▼             │
//! │                    ┌──────────────┐      ┌────────────────────┐  │
//! │                    │ GpioBackend  │◄─────│ PinRegistry        │  │
//! │                    │ (trait)      │      │ (ownership, mode)  │  │
//! │                    └──────────────┘      └────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod actuation;
pub mod backend;
pub mod drivers;
pub mod monitor;
pub mod pin;
pub mod registry;

// Re-export key types for convenience
pub use crate::backend::{BackendRegistry, GpioBackend};
pub use crate::monitor::{MonitorError, WeightMonitor};
pub use crate::pin::DigitalPin;
pub use crate::registry::{AllocationOutcome, PinRegistry, ReleaseOutcome};
