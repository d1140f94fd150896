//! Timing budgets and hardware defaults.
//!
//! Every polling loop in the workspace is bounded by one of the budgets
//! below. Nothing blocks indefinitely.

use std::time::Duration;

/// Canonical service name (used for logging).
pub const SERVICE_NAME: &str = "weighwatch";

/// Default station configuration path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/weighwatch/station.toml";

/// Default calibration record file name.
pub const DEFAULT_CALIBRATION_FILE: &str = "hx711_calibration.json";

// ─── Load-cell ADC ──────────────────────────────────────────────────

/// Clock pin (BOARD numbering).
pub const DEFAULT_SCALE_SCK_PIN: u8 = 11;

/// Data/ready pin (BOARD numbering).
pub const DEFAULT_SCALE_DT_PIN: u8 = 13;

/// Default calibration coefficient (grams per raw count).
pub const DEFAULT_COEFFICIENT: f64 = 0.001_275_51;

/// Default zero offset in raw counts.
pub const DEFAULT_OFFSET: f64 = 41_562.0;

/// Default amplifier gain.
pub const DEFAULT_GAIN: u32 = 128;

/// Number of data bits clocked out per conversion.
pub const ADC_DATA_BITS: u32 = 24;

/// Ready-handshake poll budget.
pub const ADC_READY_RETRIES: u32 = 100;

/// Sleep between ready polls.
pub const ADC_READY_POLL: Duration = Duration::from_millis(1);

/// Delay between consecutive reads in an average.
pub const ADC_INTER_READ_DELAY: Duration = Duration::from_millis(10);

/// Capacity of the stable-weight FIFO.
pub const STABLE_BUFFER_SIZE: usize = 3;

/// Synthetic noise amplitude (raw counts) when nothing is on the scale.
pub const SYNTHETIC_IDLE_NOISE: i64 = 100;

/// Synthetic noise amplitude (raw counts) with a simulated load.
pub const SYNTHETIC_LOAD_NOISE: i64 = 200;

// ─── Buzzer ─────────────────────────────────────────────────────────

/// Buzzer pin (BOARD numbering, BCM 18).
pub const DEFAULT_BUZZER_PIN: u8 = 12;

/// Base note unit: 60 * 1000 * 4 * 0.8 / 16.
pub const DEFAULT_BASE_UNIT_MS: f64 = 12_000.0;

/// Default melody tempo.
pub const DEFAULT_TEMPO_BPM: f64 = 137.0;

/// Accepted melody tempo range.
pub const TEMPO_BPM_RANGE: (f64, f64) = (0.001, 10_000.0);

/// Largest accepted base note unit.
pub const MAX_BASE_UNIT_MS: f64 = 600_000.0;

// ─── Status LED ─────────────────────────────────────────────────────

/// LED pin in BCM numbering (converted to BOARD at setup).
pub const DEFAULT_LED_PIN_BCM: u8 = 19;

/// LED flash half-period.
pub const LED_FLASH_HALF_PERIOD: Duration = Duration::from_millis(500);

/// Minimum number of flashes for an alert.
pub const LED_MIN_FLASHES: u32 = 3;

// ─── Monitor ────────────────────────────────────────────────────────

/// Orchestrator loop period.
pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(300);

/// Readings within this band (grams) count as stable.
pub const STABILITY_BAND_G: f64 = 1.0;

/// Longest accepted weight check window (one day).
pub const MAX_CHECK_TIMEOUT_S: f64 = 86_400.0;

/// Consecutive stable readings before the weight is reported stable.
pub const STABLE_READINGS_REQUIRED: u32 = 3;
