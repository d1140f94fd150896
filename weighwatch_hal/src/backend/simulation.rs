//! Simulated GPIO backend.
//!
//! Keeps every line in memory and records what was done to it, so the
//! drivers can be exercised without a board. Devices implementing
//! [`SimulatedDevice`] can be attached to react to output edges and drive
//! input lines.
//!
//! Input lines that no device drives read [`Level::High`] (pull-up idle).
//! An unconnected load-cell ADC therefore never signals ready, and the
//! weight driver falls back to synthetic samples exactly as it does on a
//! board with the ADC unplugged.

use super::GpioBackend;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};
use weighwatch_common::consts::ADC_DATA_BITS;
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::numbering::NumberingMode;
use weighwatch_common::gpio::types::{Direction, Level, PinId};

/// A device wired to simulated lines.
pub trait SimulatedDevice: Send {
    /// Called after an output line is driven.
    fn on_write(&mut self, pin: PinId, level: Level);

    /// Level the device drives onto `pin`, or `None` if it is not connected.
    fn on_read(&mut self, pin: PinId) -> Option<Level>;
}

/// Observable state of one simulated line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinSnapshot {
    /// Configured direction.
    pub direction: Direction,
    /// Last driven level (outputs only).
    pub level: Level,
    /// Low-to-high transitions since setup or the last counter reset.
    pub rising_edges: u64,
    /// Successful writes since setup or the last counter reset.
    pub writes: u64,
}

#[derive(Default)]
struct SimState {
    mode: Option<NumberingMode>,
    pins: HashMap<PinId, PinSnapshot>,
    stuck: HashMap<PinId, Level>,
    write_faults: HashMap<PinId, u32>,
    devices: Vec<Box<dyn SimulatedDevice>>,
}

/// In-memory GPIO backend.
#[derive(Default)]
pub struct SimulatedGpio {
    state: Mutex<SimState>,
}

/// Factory used by the backend registry.
pub fn create_backend() -> Result<Arc<dyn GpioBackend>, GpioError> {
    Ok(Arc::new(SimulatedGpio::new()))
}

impl SimulatedGpio {
    /// Create a backend with no lines configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a device. Devices see every write and are asked, in attach
    /// order, for the level of every input read.
    pub fn attach<D: SimulatedDevice + 'static>(&self, device: D) {
        self.state.lock().devices.push(Box::new(device));
    }

    /// Numbering scheme last selected by the registry.
    pub fn numbering(&self) -> Option<NumberingMode> {
        self.state.lock().mode
    }

    /// State of a configured line.
    pub fn snapshot(&self, pin: PinId) -> Option<PinSnapshot> {
        self.state.lock().pins.get(&pin).copied()
    }

    /// Last driven level of a configured line.
    pub fn level(&self, pin: PinId) -> Option<Level> {
        self.snapshot(pin).map(|p| p.level)
    }

    /// Rising edges seen on a line (0 if not configured).
    pub fn rising_edges(&self, pin: PinId) -> u64 {
        self.snapshot(pin).map_or(0, |p| p.rising_edges)
    }

    /// Zero the edge and write counters of every line.
    pub fn reset_counters(&self) {
        for p in self.state.lock().pins.values_mut() {
            p.rising_edges = 0;
            p.writes = 0;
        }
    }

    /// Force reads of `pin` to return `level` regardless of what is driven.
    /// `None` removes the fault.
    pub fn set_stuck(&self, pin: PinId, level: Option<Level>) {
        let mut state = self.state.lock();
        match level {
            Some(l) => {
                state.stuck.insert(pin, l);
            }
            None => {
                state.stuck.remove(&pin);
            }
        }
    }

    /// Make the next `count` writes to `pin` fail.
    pub fn inject_write_faults(&self, pin: PinId, count: u32) {
        self.state.lock().write_faults.insert(pin, count);
    }
}

impl GpioBackend for SimulatedGpio {
    fn name(&self) -> &'static str {
        "simulation"
    }

    fn set_numbering(&self, mode: NumberingMode) -> Result<(), GpioError> {
        debug!("Simulated GPIO numbering set to {}", mode);
        self.state.lock().mode = Some(mode);
        Ok(())
    }

    fn setup(&self, pin: PinId, direction: Direction) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        let entry = state.pins.entry(pin).or_insert(PinSnapshot {
            direction,
            level: Level::Low,
            rising_edges: 0,
            writes: 0,
        });
        entry.direction = direction;
        trace!("Simulated pin {} set up as {}", pin, direction);
        Ok(())
    }

    fn write(&self, pin: PinId, level: Level) -> Result<(), GpioError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if let Some(remaining) = state.write_faults.get_mut(&pin) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(GpioError::Backend(format!(
                    "injected write fault on pin {pin}"
                )));
            }
        }

        let line = state
            .pins
            .get_mut(&pin)
            .ok_or_else(|| GpioError::Backend(format!("pin {pin} not set up")))?;
        if line.direction != Direction::Output {
            return Err(GpioError::Backend(format!("pin {pin} is an input")));
        }
        if line.level.is_low() && level.is_high() {
            line.rising_edges += 1;
        }
        line.level = level;
        line.writes += 1;

        for device in state.devices.iter_mut() {
            device.on_write(pin, level);
        }
        Ok(())
    }

    fn read(&self, pin: PinId) -> Result<Level, GpioError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let line = state
            .pins
            .get(&pin)
            .ok_or_else(|| GpioError::Backend(format!("pin {pin} not set up")))?;
        if let Some(level) = state.stuck.get(&pin) {
            return Ok(*level);
        }
        if line.direction == Direction::Output {
            return Ok(line.level);
        }
        let driven = state
            .devices
            .iter_mut()
            .find_map(|device| device.on_read(pin));
        Ok(driven.unwrap_or(Level::High))
    }

    fn cleanup(&self, pin: PinId) -> Result<(), GpioError> {
        self.state.lock().pins.remove(&pin);
        Ok(())
    }

    fn cleanup_all(&self) -> Result<(), GpioError> {
        let mut state = self.state.lock();
        debug!("Simulated GPIO cleanup ({} lines)", state.pins.len());
        state.pins.clear();
        Ok(())
    }
}

// ─── Simulated load-cell ADC ────────────────────────────────────────

#[derive(Debug)]
struct LoadCellState {
    sck: PinId,
    dt: PinId,
    raw: u32,
    ready: bool,
    clock_high: bool,
    pulses: u32,
    last_gain_pulses: Option<u32>,
    conversions: u64,
}

/// Simulated 24-bit load-cell ADC.
///
/// Holds DT low while a conversion is ready, then shifts the configured raw
/// value out MSB-first, one bit per SCK rising edge. Clock pulses past the
/// 24th are counted as gain pulses; the frame closes on the next ready poll.
///
/// The handle is cheap to clone: keep one to change the reading while a
/// clone is attached to a [`SimulatedGpio`].
#[derive(Debug, Clone)]
pub struct SimulatedLoadCell {
    inner: Arc<Mutex<LoadCellState>>,
}

impl SimulatedLoadCell {
    /// Create an ADC on the given clock and data lines.
    pub fn new(sck: PinId, dt: PinId, raw: i32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LoadCellState {
                sck,
                dt,
                raw: Self::encode(raw),
                ready: true,
                clock_high: false,
                pulses: 0,
                last_gain_pulses: None,
                conversions: 0,
            })),
        }
    }

    fn encode(raw: i32) -> u32 {
        (raw as u32) & 0x00FF_FFFF
    }

    /// Value shifted out by the next conversion (truncated to 24 bits).
    pub fn set_raw(&self, raw: i32) {
        self.inner.lock().raw = Self::encode(raw);
    }

    /// Whether DT signals a ready conversion.
    pub fn set_ready(&self, ready: bool) {
        self.inner.lock().ready = ready;
    }

    /// Gain pulses clocked after the data bits of the latest conversion.
    pub fn gain_pulses(&self) -> Option<u32> {
        let s = self.inner.lock();
        if s.pulses >= ADC_DATA_BITS {
            Some(s.pulses - ADC_DATA_BITS)
        } else {
            s.last_gain_pulses
        }
    }

    /// Completed conversions.
    pub fn conversions(&self) -> u64 {
        self.inner.lock().conversions
    }
}

impl SimulatedDevice for SimulatedLoadCell {
    fn on_write(&mut self, pin: PinId, level: Level) {
        let mut s = self.inner.lock();
        if pin != s.sck {
            return;
        }
        if level.is_high() && !s.clock_high {
            s.pulses += 1;
        }
        s.clock_high = level.is_high();
    }

    fn on_read(&mut self, pin: PinId) -> Option<Level> {
        let mut s = self.inner.lock();
        if pin != s.dt {
            return None;
        }

        if s.clock_high {
            let bit = match s.pulses {
                k @ 1..=ADC_DATA_BITS => (s.raw >> (ADC_DATA_BITS - k)) & 1,
                _ => 0,
            };
            return Some(Level::from(bit == 1));
        }

        // Ready poll: close the previous frame.
        if s.pulses >= ADC_DATA_BITS {
            s.last_gain_pulses = Some(s.pulses - ADC_DATA_BITS);
            s.conversions += 1;
        }
        s.pulses = 0;
        Some(if s.ready { Level::Low } else { Level::High })
    }
}
