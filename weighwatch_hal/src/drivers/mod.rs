//! Protocol drivers built on [`DigitalPin`](crate::pin::DigitalPin).
//!
//! - [`weight`] - 24-bit load-cell ADC (bit-banged shift read)
//! - [`tone`] - Square-wave buzzer and melody sequencer
//! - [`led`] - Status LED
//!
//! Each driver claims its pins from the registry at construction and
//! releases them in `cleanup`.

pub mod led;
pub mod tone;
pub mod weight;

pub use led::StatusLed;
pub use tone::{MelodyTask, Playback, SpawnError, StopHandle, ToneDriver};
pub use weight::{AdcTiming, WeightSensor};
