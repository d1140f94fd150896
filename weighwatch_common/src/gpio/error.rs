//! GPIO error types.

use super::numbering::NumberingMode;
use super::types::PinId;
use thiserror::Error;

/// Errors reported by the pin registry and GPIO backends.
///
/// None of these are fatal: callers log them and fall back, or pick
/// another pin.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GpioError {
    /// `initialize` has not succeeded yet.
    #[error("GPIO not initialized")]
    NotInitialized,

    /// Numbering mode already fixed to a different scheme.
    #[error("GPIO already initialized in {current} mode, cannot switch to {requested}")]
    ModeConflict {
        /// Mode fixed at first initialization.
        current: NumberingMode,
        /// Mode that was requested.
        requested: NumberingMode,
    },

    /// Pin owned by another module.
    #[error("pin {pin} is owned by '{owner}', '{requested_by}' cannot use it")]
    PinConflict {
        /// Contested pin.
        pin: PinId,
        /// Current owner.
        owner: String,
        /// Module that asked for it.
        requested_by: String,
    },

    /// Owner already holds a handle to this pin.
    #[error("pin {pin} already claimed by '{owner}'")]
    AlreadyClaimed {
        /// Claimed pin.
        pin: PinId,
        /// Holder of the existing handle.
        owner: String,
    },

    /// Caller does not own the pin it tried to drive or sample.
    #[error("pin {pin} not owned by '{caller}' (owner: {owner:?})")]
    NotOwner {
        /// Pin being accessed.
        pin: PinId,
        /// Module that attempted the access.
        caller: String,
        /// Recorded owner, if any.
        owner: Option<String>,
    },

    /// Pin number not valid in the active scheme.
    #[error("invalid pin {pin} for {mode} numbering")]
    InvalidPin {
        /// Offending pin.
        pin: PinId,
        /// Active scheme.
        mode: NumberingMode,
    },

    /// A single backend operation failed (transient).
    #[error("GPIO backend error: {0}")]
    Backend(String),

    /// The GPIO subsystem is not present on this host.
    #[error("GPIO hardware absent: {0}")]
    HardwareAbsent(String),

    /// No backend registered under the requested name.
    #[error("GPIO backend not found: {0}")]
    BackendNotFound(String),
}

impl GpioError {
    /// `true` for ownership conflicts the caller can route around.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::PinConflict { .. } | Self::AlreadyClaimed { .. } | Self::NotOwner { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_both_modules() {
        let err = GpioError::PinConflict {
            pin: PinId(12),
            owner: "buzzer".to_string(),
            requested_by: "led".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("buzzer"));
        assert!(msg.contains("led"));
        assert!(err.is_conflict());
    }

    #[test]
    fn mode_conflict_display() {
        let err = GpioError::ModeConflict {
            current: NumberingMode::Board,
            requested: NumberingMode::Bcm,
        };
        assert!(err.to_string().contains("BOARD"));
        assert!(err.to_string().contains("BCM"));
        assert!(!err.is_conflict());
    }
}
