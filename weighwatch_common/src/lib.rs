//! Weighwatch Common Library
//!
//! This crate provides shared constants, configuration loading and the
//! data types exchanged between the pin registry, the protocol drivers
//! and the orchestrator.
//!
//! # Module Structure
//!
//! - [`gpio`] - Pin identifiers, numbering schemes and GPIO error types
//! - [`calibration`] - Load-cell calibration record and its persistence
//! - [`melody`] - Melody data types and timing
//! - [`config`] - Configuration loading traits and the station config
//! - [`consts`] - Timing budgets and hardware defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! Add to your `Cargo.toml` with alias for shorter imports:
//! ```toml
//! [dependencies]
//! weighwatch = { package = "weighwatch_common", path = "../weighwatch_common" }
//! ```
//!
//! Then import:
//! ```rust
//! use weighwatch_common::gpio::{NumberingMode, PinId};
//! use weighwatch_common::config::{ConfigLoader, StationConfig};
//! ```

pub mod calibration;
pub mod config;
pub mod consts;
pub mod gpio;
pub mod melody;
pub mod prelude;
