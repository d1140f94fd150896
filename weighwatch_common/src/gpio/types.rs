//! Pin-level value types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Pin number in the process-wide numbering scheme.
///
/// A `PinId` carries no scheme of its own: it is interpreted in whatever
/// [`NumberingMode`](super::numbering::NumberingMode) the registry was
/// initialized with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PinId(pub u8);

impl PinId {
    /// Raw pin number.
    #[inline]
    pub const fn number(self) -> u8 {
        self.0
    }
}

impl From<u8> for PinId {
    fn from(n: u8) -> Self {
        Self(n)
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pin direction requested at allocation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Driven by an external device.
    Input,
    /// Driven by this process.
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "IN"),
            Self::Output => write!(f, "OUT"),
        }
    }
}

/// Logic level of a digital line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Level {
    /// Logic 0.
    #[default]
    Low,
    /// Logic 1.
    High,
}

impl Level {
    /// `true` for [`Level::High`].
    #[inline]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }

    /// `true` for [`Level::Low`].
    #[inline]
    pub const fn is_low(self) -> bool {
        matches!(self, Self::Low)
    }
}

impl From<bool> for Level {
    fn from(high: bool) -> Self {
        if high { Self::High } else { Self::Low }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::High => write!(f, "HIGH"),
        }
    }
}
