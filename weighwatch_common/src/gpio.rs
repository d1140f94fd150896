//! GPIO identifiers, numbering schemes and error types.
//!
//! These types are shared by the pin registry, the GPIO backends and the
//! protocol drivers.

pub mod error;
pub mod numbering;
pub mod types;

pub use error::GpioError;
pub use numbering::NumberingMode;
pub use types::{Direction, Level, PinId};
