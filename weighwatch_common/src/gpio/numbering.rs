//! Pin numbering schemes and the fixed BCM ↔ BOARD translation table.
//!
//! Two conventions coexist on the 40-pin header:
//! - `Bcm` - logical silicon numbering (GPIO17, GPIO18, ...)
//! - `Board` - physical connector position (pin 11, pin 12, ...)
//!
//! Translation is a pure table lookup and never touches ownership state.

use super::types::PinId;
use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;
use std::fmt;
use std::str::FromStr;

/// Process-wide pin numbering scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberingMode {
    /// Physical connector numbering.
    Board,
    /// Broadcom silicon numbering.
    Bcm,
}

impl fmt::Display for NumberingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Board => write!(f, "BOARD"),
            Self::Bcm => write!(f, "BCM"),
        }
    }
}

impl FromStr for NumberingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "board" => Ok(Self::Board),
            "bcm" => Ok(Self::Bcm),
            other => Err(format!("unknown numbering mode '{other}' (expected board|bcm)")),
        }
    }
}

/// `(bcm, board)` pairs for every general-purpose header pin.
pub const BCM_TO_BOARD: [(u8, u8); 26] = [
    (2, 3),
    (3, 5),
    (4, 7),
    (5, 29),
    (6, 31),
    (7, 26),
    (8, 24),
    (9, 21),
    (10, 19),
    (11, 23),
    (12, 32),
    (13, 33),
    (14, 8),
    (15, 10),
    (16, 36),
    (17, 11),
    (18, 12),
    (19, 35),
    (20, 38),
    (21, 40),
    (22, 15),
    (23, 16),
    (24, 18),
    (25, 22),
    (26, 37),
    (27, 13),
];

const_assert_eq!(BCM_TO_BOARD.len(), 26);

/// Candidate pins for automatic allocation, BOARD numbering.
///
/// Excludes the I2C, UART and SPI0 chip-select lines.
pub const SAFE_PINS_BOARD: [u8; 21] = [
    11, 12, 13, 15, 16, 18, 19, 21, 22, 23, 24, 26, 29, 31, 32, 33, 35, 36, 37, 38, 40,
];

/// Candidate pins for automatic allocation, BCM numbering.
pub const SAFE_PINS_BCM: [u8; 21] = [
    17, 18, 27, 22, 23, 24, 10, 9, 25, 11, 8, 7, 5, 6, 12, 13, 19, 16, 26, 20, 21,
];

/// BCM → BOARD.
pub fn bcm_to_board(pin: PinId) -> Option<PinId> {
    BCM_TO_BOARD
        .iter()
        .find(|(bcm, _)| *bcm == pin.0)
        .map(|&(_, board)| PinId(board))
}

/// BOARD → BCM.
pub fn board_to_bcm(pin: PinId) -> Option<PinId> {
    BCM_TO_BOARD
        .iter()
        .find(|(_, board)| *board == pin.0)
        .map(|&(bcm, _)| PinId(bcm))
}

/// Convert a pin between numbering schemes.
///
/// Identity when `from == to`. Returns `None` for pins that are not
/// general-purpose header pins.
pub fn convert_pin(pin: PinId, from: NumberingMode, to: NumberingMode) -> Option<PinId> {
    match (from, to) {
        (a, b) if a == b => Some(pin),
        (NumberingMode::Bcm, NumberingMode::Board) => bcm_to_board(pin),
        (NumberingMode::Board, NumberingMode::Bcm) => board_to_bcm(pin),
        _ => None,
    }
}

/// Safe candidate list for the given scheme.
pub fn safe_pins(mode: NumberingMode) -> &'static [u8] {
    match mode {
        NumberingMode::Board => &SAFE_PINS_BOARD,
        NumberingMode::Bcm => &SAFE_PINS_BCM,
    }
}
