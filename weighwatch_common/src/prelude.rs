//! Prelude module for common re-exports.
//!
//! ```rust
//! use weighwatch_common::prelude::*;
//! ```

// ─── Logging ────────────────────────────────────────────────────────
pub use crate::config::LogLevel;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, SharedConfig, StationConfig};

// ─── GPIO ───────────────────────────────────────────────────────────
pub use crate::gpio::error::GpioError;
pub use crate::gpio::numbering::{convert_pin, NumberingMode};
pub use crate::gpio::types::{Direction, Level, PinId};

// ─── Drivers ────────────────────────────────────────────────────────
pub use crate::calibration::{CalibrationRecord, CalibrationStore, Gain};
pub use crate::melody::{Melody, MelodyTiming, Note};
