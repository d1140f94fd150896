//! Pin-ownership registry.
//!
//! [`PinRegistry`] is the single authority over which module owns which
//! line and under which numbering scheme. It is constructed explicitly,
//! shared behind an `Arc`, and is the only code that configures lines
//! through the backend.
//!
//! # Locking
//!
//! - `initialize`, `allocate`, `release`, `find_available` and
//!   `cleanup_all` run under one allocation lock, so at most one allocation
//!   decision is in flight at a time.
//! - `read` and `write` never take the allocation lock. They consult a
//!   read-locked snapshot of the ownership table and rely on the owning
//!   driver to serialize its own pin traffic.

use crate::backend::GpioBackend;
use crate::pin::DigitalPin;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::numbering::{
    bcm_to_board, board_to_bcm, convert_pin, safe_pins, NumberingMode,
};
use weighwatch_common::gpio::types::{Direction, Level, PinId};

/// Result of a successful allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// Pin was free and is now owned by the caller.
    Allocated,
    /// Caller already owned the pin; nothing changed.
    AlreadyOwned,
}

/// Result of a release request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Ownership record cleared.
    Released,
    /// Pin is owned by someone else; nothing changed.
    NotOwner {
        /// Current owner.
        held_by: String,
    },
    /// Pin was not allocated.
    NotHeld,
}

impl ReleaseOutcome {
    /// `true` if the ownership record was cleared.
    pub fn is_released(&self) -> bool {
        matches!(self, Self::Released)
    }
}

/// Registry snapshot for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStatus {
    /// Whether a numbering scheme has been fixed.
    pub initialized: bool,
    /// Active numbering scheme.
    pub mode: Option<NumberingMode>,
    /// Backend in use.
    pub backend: &'static str,
    /// Allocated pins and their owners.
    pub allocated: BTreeMap<PinId, String>,
}

#[derive(Debug, Clone)]
struct Ownership {
    owner: Arc<str>,
    direction: Direction,
}

/// Authoritative table of pin ownership and numbering mode.
pub struct PinRegistry {
    backend: Arc<dyn GpioBackend>,
    /// Serializes every ownership decision.
    allocation: Mutex<()>,
    /// Written only under `allocation`.
    mode: RwLock<Option<NumberingMode>>,
    /// Written only under `allocation`.
    owners: RwLock<HashMap<PinId, Ownership>>,
}

impl PinRegistry {
    /// Create an uninitialized registry over the given backend.
    pub fn new(backend: Arc<dyn GpioBackend>) -> Self {
        Self {
            backend,
            allocation: Mutex::new(()),
            mode: RwLock::new(None),
            owners: RwLock::new(HashMap::new()),
        }
    }

    /// Name of the backend in use.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Active numbering scheme, if initialized.
    pub fn mode(&self) -> Option<NumberingMode> {
        *self.mode.read()
    }

    /// Whether a numbering scheme has been fixed.
    pub fn is_initialized(&self) -> bool {
        self.mode().is_some()
    }

    /// Fix the process-wide numbering scheme.
    ///
    /// Idempotent for the same mode. A different mode is rejected and
    /// nothing changes.
    pub fn initialize(&self, mode: NumberingMode) -> Result<(), GpioError> {
        let _guard = self.allocation.lock();

        if let Some(current) = *self.mode.read() {
            if current == mode {
                debug!("GPIO already initialized in {} mode", mode);
                return Ok(());
            }
            warn!(
                "GPIO already initialized in {} mode, refusing switch to {}",
                current, mode
            );
            return Err(GpioError::ModeConflict {
                current,
                requested: mode,
            });
        }

        self.backend.set_numbering(mode)?;
        *self.mode.write() = Some(mode);
        info!("GPIO initialized in {} mode ({} backend)", mode, self.backend.name());
        Ok(())
    }

    fn require_mode(&self) -> Result<NumberingMode, GpioError> {
        self.mode().ok_or(GpioError::NotInitialized)
    }

    fn validate_pin(mode: NumberingMode, pin: PinId) -> Result<(), GpioError> {
        let known = match mode {
            NumberingMode::Board => board_to_bcm(pin).is_some(),
            NumberingMode::Bcm => bcm_to_board(pin).is_some(),
        };
        if known {
            Ok(())
        } else {
            Err(GpioError::InvalidPin { pin, mode })
        }
    }

    /// Allocate `pin` to `owner` and configure its direction.
    ///
    /// # Errors
    /// - `GpioError::NotInitialized` before [`initialize`](Self::initialize)
    /// - `GpioError::InvalidPin` for pins outside the header table
    /// - `GpioError::PinConflict` if another owner holds the pin (no mutation)
    /// - backend errors from configuring the line (no record is made)
    pub fn allocate(
        &self,
        pin: PinId,
        owner: &str,
        direction: Direction,
    ) -> Result<AllocationOutcome, GpioError> {
        let _guard = self.allocation.lock();
        let mode = self.require_mode()?;
        Self::validate_pin(mode, pin)?;

        if let Some(existing) = self.owners.read().get(&pin) {
            if &*existing.owner == owner {
                if existing.direction != direction {
                    debug!(
                        "Pin {} already owned by '{}' as {}, ignoring {} request",
                        pin, owner, existing.direction, direction
                    );
                }
                return Ok(AllocationOutcome::AlreadyOwned);
            }
            warn!(
                "Pin {} conflict: owned by '{}', requested by '{}'",
                pin, existing.owner, owner
            );
            return Err(GpioError::PinConflict {
                pin,
                owner: existing.owner.to_string(),
                requested_by: owner.to_string(),
            });
        }

        self.backend.setup(pin, direction)?;
        self.owners.write().insert(
            pin,
            Ownership {
                owner: Arc::from(owner),
                direction,
            },
        );
        info!("Pin {} allocated to '{}' ({})", pin, owner, direction);
        Ok(AllocationOutcome::Allocated)
    }

    /// Allocate `pin` and return the owner's handle to it.
    ///
    /// This is the only way to obtain a [`DigitalPin`]. Unlike
    /// [`allocate`](Self::allocate) it is not idempotent: a pin already held
    /// by `owner` yields `GpioError::AlreadyClaimed`, so each line has at
    /// most one handle.
    pub fn claim(
        self: &Arc<Self>,
        pin: PinId,
        owner: &str,
        direction: Direction,
    ) -> Result<DigitalPin, GpioError> {
        match self.allocate(pin, owner, direction)? {
            AllocationOutcome::Allocated => Ok(DigitalPin::new(
                Arc::clone(self),
                pin,
                Arc::from(owner),
                direction,
            )),
            AllocationOutcome::AlreadyOwned => {
                warn!("Pin {} already claimed by '{}'", pin, owner);
                Err(GpioError::AlreadyClaimed {
                    pin,
                    owner: owner.to_string(),
                })
            }
        }
    }

    /// Clear `owner`'s record for `pin`.
    ///
    /// The line is left at its last driven level. Mismatches are logged and
    /// change nothing.
    pub fn release(&self, pin: PinId, owner: &str) -> ReleaseOutcome {
        let _guard = self.allocation.lock();
        let mut owners = self.owners.write();

        let held_by = owners.get(&pin).map(|o| Arc::clone(&o.owner));
        match held_by {
            None => {
                warn!("Release of pin {} by '{}': pin not allocated", pin, owner);
                ReleaseOutcome::NotHeld
            }
            Some(existing) if &*existing != owner => {
                warn!(
                    "Release of pin {} by '{}' refused: owned by '{}'",
                    pin, owner, existing
                );
                ReleaseOutcome::NotOwner {
                    held_by: existing.to_string(),
                }
            }
            Some(_) => {
                owners.remove(&pin);
                info!("Pin {} released by '{}'", pin, owner);
                ReleaseOutcome::Released
            }
        }
    }

    /// Current owner of `pin`.
    pub fn owner_of(&self, pin: PinId) -> Option<String> {
        self.owners.read().get(&pin).map(|o| o.owner.to_string())
    }

    /// Whether `owner` currently holds `pin`.
    pub fn is_owned_by(&self, pin: PinId, owner: &str) -> bool {
        self.owners
            .read()
            .get(&pin)
            .is_some_and(|o| &*o.owner == owner)
    }

    fn check_owner(&self, pin: PinId, caller: &str) -> Result<(), GpioError> {
        self.require_mode()?;
        match self.owners.read().get(&pin) {
            Some(o) if &*o.owner == caller => Ok(()),
            other => {
                let owner = other.map(|o| o.owner.to_string());
                debug!("Pin {} access by '{}' denied (owner: {:?})", pin, caller, owner);
                Err(GpioError::NotOwner {
                    pin,
                    caller: caller.to_string(),
                    owner,
                })
            }
        }
    }

    /// Drive `pin` on behalf of `owner`.
    ///
    /// Nothing is written unless `owner` holds the pin.
    pub fn write(&self, pin: PinId, owner: &str, level: Level) -> Result<(), GpioError> {
        self.check_owner(pin, owner)?;
        self.backend.write(pin, level)
    }

    /// Sample `pin` on behalf of `owner`.
    ///
    /// Callers that cannot handle the error treat the line as low.
    pub fn read(&self, pin: PinId, owner: &str) -> Result<Level, GpioError> {
        self.check_owner(pin, owner)?;
        self.backend.read(pin)
    }

    /// Round-trip a HIGH/LOW toggle on an unowned line.
    fn test_pin(&self, pin: PinId) -> bool {
        let round_trip = || -> Result<bool, GpioError> {
            self.backend.setup(pin, Direction::Output)?;
            self.backend.write(pin, Level::Low)?;
            let low = self.backend.read(pin)?;
            self.backend.write(pin, Level::High)?;
            let high = self.backend.read(pin)?;
            self.backend.write(pin, Level::Low)?;
            Ok(low.is_low() && high.is_high())
        };
        let ok = round_trip().unwrap_or_else(|e| {
            debug!("Pin {} round-trip failed: {}", pin, e);
            false
        });
        if let Err(e) = self.backend.cleanup(pin) {
            debug!("Pin {} cleanup after test failed: {}", pin, e);
        }
        trace!("Pin {} round-trip {}", pin, if ok { "ok" } else { "failed" });
        ok
    }

    /// Find up to `count` free pins from the safe candidate list.
    ///
    /// Candidates in `excluded` or already owned are skipped; every other
    /// candidate must round-trip a HIGH/LOW toggle. Returns an empty list
    /// before initialization.
    pub fn find_available(&self, count: usize, excluded: &[PinId]) -> Vec<PinId> {
        let _guard = self.allocation.lock();
        let Some(mode) = self.mode() else {
            warn!("find_available called before GPIO initialization");
            return Vec::new();
        };

        let mut found = Vec::with_capacity(count);
        for &n in safe_pins(mode) {
            if found.len() >= count {
                break;
            }
            let pin = PinId(n);
            if excluded.contains(&pin) || self.owners.read().contains_key(&pin) {
                continue;
            }
            if self.test_pin(pin) {
                found.push(pin);
            }
        }

        debug!("find_available({}) in {} mode -> {:?}", count, mode, found);
        found
    }

    /// Convert a pin between numbering schemes. Pure table lookup.
    pub fn convert(&self, pin: PinId, from: NumberingMode, to: NumberingMode) -> Option<PinId> {
        convert_pin(pin, from, to)
    }

    /// Snapshot of the registry for diagnostics.
    pub fn status(&self) -> RegistryStatus {
        let mode = self.mode();
        RegistryStatus {
            initialized: mode.is_some(),
            mode,
            backend: self.backend.name(),
            allocated: self
                .owners
                .read()
                .iter()
                .map(|(pin, o)| (*pin, o.owner.to_string()))
                .collect(),
        }
    }

    /// Full teardown: reset every line, clear ownership and the mode.
    ///
    /// A no-op when nothing is allocated, unless `force` is set. Ownership
    /// and mode are cleared even if the backend reports an error.
    pub fn cleanup_all(&self, force: bool) -> Result<(), GpioError> {
        let _guard = self.allocation.lock();
        let mut owners = self.owners.write();

        if owners.is_empty() && !force {
            debug!("GPIO cleanup skipped: no pins allocated");
            return Ok(());
        }

        let result = self.backend.cleanup_all();
        let count = owners.len();
        owners.clear();
        *self.mode.write() = None;

        match &result {
            Ok(()) => info!("GPIO cleanup complete ({} pins released)", count),
            Err(e) => warn!("GPIO backend cleanup failed: {}", e),
        }
        result
    }
}
