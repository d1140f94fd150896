//! Bit-banged 24-bit load-cell ADC driver.
//!
//! Two lines: SCK is driven by us, DT by the converter. DT idles high and
//! drops low when a conversion is ready. A read is:
//!
//! ```text
//! poll DT until LOW (bounded)
//! 24 x { SCK HIGH, sample DT, SCK LOW }      data, MSB first
//! 1..3 x { SCK HIGH, SCK LOW }                gain for the NEXT conversion
//! sign-extend bit 23
//! ```
//!
//! A converter that never signals ready is treated as absent: the read
//! returns a synthetic sample around the current offset instead of failing.

use crate::pin::DigitalPin;
use crate::registry::PinRegistry;
use heapless::Deque;
use rand::Rng;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use weighwatch_common::calibration::{CalibrationRecord, CalibrationStore, Gain};
use weighwatch_common::config::{ConfigError, ScaleSection};
use weighwatch_common::consts::{
    ADC_DATA_BITS, ADC_INTER_READ_DELAY, ADC_READY_POLL, ADC_READY_RETRIES, STABLE_BUFFER_SIZE,
    SYNTHETIC_IDLE_NOISE, SYNTHETIC_LOAD_NOISE,
};
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::types::{Direction, Level, PinId};

/// Owner name recorded in the pin registry.
pub const OWNER: &str = "hx711";

/// Sign-extend a 24-bit two's-complement value.
///
/// Bits above 23 are ignored.
#[inline]
pub const fn sign_extend_24(raw: u32) -> i32 {
    ((raw << 8) as i32) >> 8
}

/// Polling and pacing budgets for the converter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcTiming {
    /// Ready polls before the converter is declared absent.
    pub ready_retries: u32,
    /// Sleep between ready polls.
    pub ready_poll: Duration,
    /// Delay between consecutive reads of an average.
    pub inter_read_delay: Duration,
}

impl Default for AdcTiming {
    fn default() -> Self {
        Self {
            ready_retries: ADC_READY_RETRIES,
            ready_poll: ADC_READY_POLL,
            inter_read_delay: ADC_INTER_READ_DELAY,
        }
    }
}

impl From<&ScaleSection> for AdcTiming {
    fn from(config: &ScaleSection) -> Self {
        Self {
            ready_retries: config.ready_retries,
            ready_poll: config.ready_poll(),
            inter_read_delay: config.inter_read_delay(),
        }
    }
}

/// Load-cell ADC driver with tare and a stabilized-weight filter.
#[derive(Debug)]
pub struct WeightSensor {
    sck: DigitalPin,
    dt: DigitalPin,
    calibration: CalibrationRecord,
    store: Option<CalibrationStore>,
    timing: AdcTiming,
    stable: Deque<f64, STABLE_BUFFER_SIZE>,
    synthetic_load: Option<f64>,
    timeouts: u64,
}

impl WeightSensor {
    /// Claim the clock and data lines and start from `calibration`.
    ///
    /// # Errors
    /// Allocation errors from the registry. On failure no pin stays claimed.
    pub fn new(
        registry: &Arc<PinRegistry>,
        sck: PinId,
        dt: PinId,
        calibration: CalibrationRecord,
        timing: AdcTiming,
    ) -> Result<Self, GpioError> {
        let sck = registry.claim(sck, OWNER, Direction::Output)?;
        let dt = registry.claim(dt, OWNER, Direction::Input)?;
        if let Err(e) = sck.set_low() {
            warn!("Failed to idle SCK low: {}", e);
        }

        info!(
            "Load cell on SCK={} DT={} (gain {}, {})",
            sck.pin(),
            dt.pin(),
            calibration.gain.factor(),
            if calibration.calibrated { "calibrated" } else { "uncalibrated" }
        );

        Ok(Self {
            sck,
            dt,
            calibration,
            store: None,
            timing,
            stable: Deque::new(),
            synthetic_load: None,
            timeouts: 0,
        })
    }

    /// Build from the `[scale]` config section.
    ///
    /// Calibration is loaded from `calibration_file` when present; otherwise
    /// built-in defaults apply with the configured gain and the driver stays
    /// uncalibrated.
    pub fn open(registry: &Arc<PinRegistry>, config: &ScaleSection) -> Result<Self, GpioError> {
        let store = CalibrationStore::new(&config.calibration_file);
        let mut calibration = store.load_or_default();
        if !calibration.calibrated {
            calibration.gain = Gain::from(config.gain);
        }
        let sensor = Self::new(
            registry,
            config.sck_pin,
            config.dt_pin,
            calibration,
            AdcTiming::from(config),
        )?;
        Ok(sensor.with_store(store))
    }

    /// Persist calibration to `store` on [`save_calibration`](Self::save_calibration).
    pub fn with_store(mut self, store: CalibrationStore) -> Self {
        self.store = Some(store);
        self
    }

    // ─── Protocol ───────────────────────────────────────────────────

    /// `true` when DT is low (conversion ready).
    pub fn is_ready(&self) -> bool {
        match self.dt.read() {
            Ok(level) => level.is_low(),
            Err(e) => {
                debug!("DT read failed: {}", e);
                false
            }
        }
    }

    fn wait_ready(&self) -> bool {
        for _ in 0..self.timing.ready_retries {
            if self.is_ready() {
                return true;
            }
            thread::sleep(self.timing.ready_poll);
        }
        false
    }

    fn clock(&self, level: Level) {
        if let Err(e) = self.sck.write(level) {
            warn!("SCK write failed: {}", e);
        }
    }

    fn sample_bit(&self) -> u32 {
        match self.dt.read() {
            Ok(level) => level.is_high() as u32,
            Err(e) => {
                warn!("DT sample failed, reading as LOW: {}", e);
                0
            }
        }
    }

    /// One conversion, sign-extended.
    ///
    /// Falls back to a synthetic sample if the converter does not signal
    /// ready within the retry budget.
    pub fn read_raw(&mut self) -> i32 {
        if !self.wait_ready() {
            self.timeouts += 1;
            if self.timeouts == 1 {
                warn!(
                    "Load cell not ready after {} polls, using synthetic samples",
                    self.timing.ready_retries
                );
            } else {
                debug!("Load cell handshake timeout #{}", self.timeouts);
            }
            return self.synthetic_sample();
        }

        let mut value: u32 = 0;
        for _ in 0..ADC_DATA_BITS {
            self.clock(Level::High);
            let bit = self.sample_bit();
            self.clock(Level::Low);
            value = (value << 1) | bit;
        }

        // Selects the gain of the next conversion.
        for _ in 0..self.calibration.gain.pulses() {
            self.clock(Level::High);
            self.clock(Level::Low);
        }

        let raw = sign_extend_24(value);
        trace!("Raw conversion 0x{:06X} -> {}", value, raw);
        raw
    }

    fn synthetic_sample(&self) -> i32 {
        let mut rng = rand::thread_rng();
        let (center, noise) = match self.synthetic_load {
            Some(grams) => (
                self.calibration.offset + grams / self.calibration.coefficient,
                rng.gen_range(-SYNTHETIC_LOAD_NOISE..=SYNTHETIC_LOAD_NOISE),
            ),
            None => (
                self.calibration.offset,
                rng.gen_range(-SYNTHETIC_IDLE_NOISE..=SYNTHETIC_IDLE_NOISE),
            ),
        };
        (center.round() as i64 + noise) as i32
    }

    // ─── Derived readings ───────────────────────────────────────────

    /// Mean of `times` raw reads (at least one).
    pub fn read_average(&mut self, times: u32) -> f64 {
        let times = times.max(1);
        let mut sum = 0.0;
        for i in 0..times {
            sum += f64::from(self.read_raw());
            if i + 1 < times {
                thread::sleep(self.timing.inter_read_delay);
            }
        }
        sum / f64::from(times)
    }

    /// Zero the scale: `offset = read_average(times)`.
    pub fn tare(&mut self, times: u32) -> f64 {
        let offset = self.read_average(times);
        self.calibration.offset = offset;
        self.calibration.calibrated = true;
        info!("Tare complete, offset={:.0}", offset);
        offset
    }

    /// Weight for an averaged raw value.
    ///
    /// Negative results clamp to zero.
    pub fn weight_from_raw(&self, raw_average: f64) -> f64 {
        ((raw_average - self.calibration.offset) * self.calibration.coefficient).max(0.0)
    }

    /// Weight in grams from `times` averaged reads, floored at zero.
    pub fn get_weight(&mut self, times: u32) -> f64 {
        let raw = self.read_average(times);
        self.weight_from_raw(raw)
    }

    /// Weight smoothed over the last three readings.
    ///
    /// With fewer than two buffered readings the new reading is returned
    /// unchanged.
    pub fn get_stable_weight(&mut self, times: u32) -> f64 {
        let weight = self.get_weight(times);
        if self.stable.is_full() {
            self.stable.pop_front();
        }
        // Cannot fail: a slot was just freed.
        let _ = self.stable.push_back(weight);

        if self.stable.len() < 2 {
            return weight;
        }
        self.stable.iter().sum::<f64>() / self.stable.len() as f64
    }

    /// Forget smoothed history.
    pub fn reset_stable_buffer(&mut self) {
        self.stable.clear();
    }

    // ─── Calibration ────────────────────────────────────────────────

    /// Current calibration.
    pub fn calibration(&self) -> &CalibrationRecord {
        &self.calibration
    }

    /// Whether a tare, explicit offset or loaded record calibrated the driver.
    pub fn is_calibrated(&self) -> bool {
        self.calibration.calibrated
    }

    /// Set grams per raw count. Zero and non-finite values are ignored.
    pub fn set_coefficient(&mut self, coefficient: f64) {
        if !coefficient.is_finite() || coefficient == 0.0 {
            warn!("Ignoring invalid calibration coefficient {}", coefficient);
            return;
        }
        self.calibration.coefficient = coefficient;
        info!("Calibration coefficient set to {:.8}", coefficient);
    }

    /// Set the zero offset and mark the driver calibrated.
    pub fn set_offset(&mut self, offset: f64) {
        self.calibration.offset = offset;
        self.calibration.calibrated = true;
        info!("Calibration offset set to {:.0}", offset);
    }

    /// Select the gain. Takes effect from the conversion after the next read.
    pub fn set_gain(&mut self, gain: Gain) {
        self.calibration.gain = gain;
    }

    /// Load used to centre synthetic samples when the converter is absent.
    pub fn set_synthetic_load(&mut self, grams: Option<f64>) {
        self.synthetic_load = grams;
    }

    /// Number of handshake timeouts so far.
    pub fn timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Write the current calibration to the configured store.
    pub fn save_calibration(&mut self) -> Result<(), ConfigError> {
        let store = self.store.as_ref().ok_or_else(|| {
            ConfigError::PersistenceError("no calibration file configured".to_string())
        })?;
        let saved = store.save(&self.calibration)?;
        self.calibration.timestamp = saved.timestamp;
        Ok(())
    }

    /// Idle SCK low and release both lines.
    pub fn cleanup(self) {
        if let Err(e) = self.sck.set_low() {
            debug!("SCK idle on cleanup failed: {}", e);
        }
        self.sck.release();
        self.dt.release();
        debug!("Load cell released");
    }
}
