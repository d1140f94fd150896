//! Configuration loading traits and the station configuration.
//!
//! # Usage
//!
//! ```rust,no_run
//! use weighwatch_common::config::{ConfigLoader, ConfigError, StationConfig};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = StationConfig::load(Path::new("station.toml"))?;
//!     config.validate()?;
//!     println!("Scale clock on pin {}", config.scale.sck_pin);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    ADC_INTER_READ_DELAY, ADC_READY_POLL, ADC_READY_RETRIES, DEFAULT_BASE_UNIT_MS,
    DEFAULT_BUZZER_PIN, DEFAULT_CALIBRATION_FILE, DEFAULT_GAIN, DEFAULT_LED_PIN_BCM,
    DEFAULT_SCALE_DT_PIN, DEFAULT_SCALE_SCK_PIN, DEFAULT_TEMPO_BPM, LED_FLASH_HALF_PERIOD,
    LED_MIN_FLASHES, MAX_BASE_UNIT_MS, MAX_CHECK_TIMEOUT_S, MONITOR_POLL_INTERVAL, SERVICE_NAME,
    STABILITY_BAND_G, TEMPO_BPM_RANGE,
};
use crate::gpio::numbering::{bcm_to_board, NumberingMode};
use crate::gpio::types::PinId;
use crate::melody::MelodyTiming;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Station config and calibration record failures.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// No file at the given path.
    #[error("station config file missing")]
    FileNotFound,

    /// File unreadable or not valid TOML/JSON.
    #[error("cannot parse config: {0}")]
    ParseError(String),

    /// Parsed but inconsistent.
    #[error("invalid config: {0}")]
    ValidationError(String),

    /// Calibration record could not be written.
    #[error("cannot persist record: {0}")]
    PersistenceError(String),
}

/// Default log verbosity, written `log_level = "debug"` in TOML.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Per-bit and per-cycle detail.
    Trace,
    /// Driver internals.
    Debug,
    /// Allocations, calibration, check results.
    #[default]
    Info,
    /// Conflicts, timeouts, fallbacks.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_directive(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// `[shared]` section: how this station logs and names itself.
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "weighwatch-bench-01"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Overridden by `--verbose` and `RUST_LOG`.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Station name shown in logs.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            service_name: SERVICE_NAME.to_string(),
        }
    }
}

impl SharedConfig {
    /// The station name must not be blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "shared.service_name is blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// Read any deserializable section tree from a TOML file.
///
/// A missing file is `FileNotFound` so callers can fall back to defaults;
/// every other read or syntax problem is `ParseError`. No validation.
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Parse `path` as TOML.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

// ─── Station configuration ──────────────────────────────────────────

/// GPIO subsystem settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GpioSection {
    /// Numbering scheme fixed at registry initialization.
    pub mode: NumberingMode,
    /// Backend name (`rppal` or `simulation`).
    pub backend: String,
}

impl Default for GpioSection {
    fn default() -> Self {
        Self {
            mode: NumberingMode::Board,
            backend: "rppal".to_string(),
        }
    }
}

/// Load-cell ADC settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScaleSection {
    /// Clock pin.
    pub sck_pin: PinId,
    /// Data/ready pin.
    pub dt_pin: PinId,
    /// Gain used when no calibration record exists.
    pub gain: u32,
    /// Calibration record path.
    pub calibration_file: PathBuf,
    /// Ready-handshake poll budget.
    pub ready_retries: u32,
    /// Sleep between ready polls [µs].
    pub ready_poll_us: u64,
    /// Delay between reads of an average [ms].
    pub inter_read_delay_ms: u64,
    /// Samples averaged for tare.
    pub tare_samples: u32,
    /// Samples averaged per weight reading.
    pub read_samples: u32,
}

impl Default for ScaleSection {
    fn default() -> Self {
        Self {
            sck_pin: PinId(DEFAULT_SCALE_SCK_PIN),
            dt_pin: PinId(DEFAULT_SCALE_DT_PIN),
            gain: DEFAULT_GAIN,
            calibration_file: PathBuf::from(DEFAULT_CALIBRATION_FILE),
            ready_retries: ADC_READY_RETRIES,
            ready_poll_us: ADC_READY_POLL.as_micros() as u64,
            inter_read_delay_ms: ADC_INTER_READ_DELAY.as_millis() as u64,
            tare_samples: 10,
            read_samples: 5,
        }
    }
}

impl ScaleSection {
    /// Sleep between ready polls.
    pub fn ready_poll(&self) -> Duration {
        Duration::from_micros(self.ready_poll_us)
    }

    /// Delay between reads of an average.
    pub fn inter_read_delay(&self) -> Duration {
        Duration::from_millis(self.inter_read_delay_ms)
    }
}

/// Buzzer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuzzerSection {
    /// Buzzer pin.
    pub pin: PinId,
    /// Milliseconds of one note unit at 1 bpm.
    pub base_unit_ms: f64,
    /// Playback tempo.
    pub tempo_bpm: f64,
}

impl Default for BuzzerSection {
    fn default() -> Self {
        Self {
            pin: PinId(DEFAULT_BUZZER_PIN),
            base_unit_ms: DEFAULT_BASE_UNIT_MS,
            tempo_bpm: DEFAULT_TEMPO_BPM,
        }
    }
}

impl BuzzerSection {
    /// Melody timing derived from this section.
    pub fn timing(&self) -> MelodyTiming {
        MelodyTiming {
            base_unit_ms: self.base_unit_ms,
            tempo_bpm: self.tempo_bpm,
        }
    }
}

/// Status LED settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedSection {
    /// LED pin in BCM numbering.
    pub pin_bcm: PinId,
    /// On (and off) time of one flash [ms].
    pub flash_half_period_ms: u64,
    /// Minimum flashes per alert.
    pub min_flashes: u32,
}

impl Default for LedSection {
    fn default() -> Self {
        Self {
            pin_bcm: PinId(DEFAULT_LED_PIN_BCM),
            flash_half_period_ms: LED_FLASH_HALF_PERIOD.as_millis() as u64,
            min_flashes: LED_MIN_FLASHES,
        }
    }
}

impl LedSection {
    /// Flash half-period.
    pub fn flash_half_period(&self) -> Duration {
        Duration::from_millis(self.flash_half_period_ms)
    }
}

/// Weight check settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorSection {
    /// Expected weight [g].
    pub standard_weight: f64,
    /// Accepted deviation from `standard_weight` [g].
    pub weight_tolerance: f64,
    /// Time allowed to reach the expected weight [s].
    pub check_timeout_s: f64,
    /// Play the alert melody when the check fails.
    pub enable_music: bool,
    /// Loop period [ms].
    pub poll_interval_ms: u64,
    /// Consecutive readings closer than this are stable [g].
    pub stability_band: f64,
}

impl Default for MonitorSection {
    fn default() -> Self {
        Self {
            standard_weight: 200.0,
            weight_tolerance: 10.0,
            check_timeout_s: 10.0,
            enable_music: true,
            poll_interval_ms: MONITOR_POLL_INTERVAL.as_millis() as u64,
            stability_band: STABILITY_BAND_G,
        }
    }
}

impl MonitorSection {
    /// Check window. Out-of-range values saturate instead of panicking.
    pub fn check_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.check_timeout_s.max(0.0)).unwrap_or(Duration::MAX)
    }

    /// Loop period.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_shared() -> SharedConfig {
    SharedConfig::default()
}

/// Complete station configuration (`station.toml`).
///
/// Every section is optional; a missing section uses built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StationConfig {
    /// Logging and identity.
    #[serde(default = "default_shared")]
    pub shared: SharedConfig,
    /// GPIO subsystem.
    #[serde(default)]
    pub gpio: GpioSection,
    /// Load-cell ADC.
    #[serde(default)]
    pub scale: ScaleSection,
    /// Buzzer.
    #[serde(default)]
    pub buzzer: BuzzerSection,
    /// Status LED.
    #[serde(default)]
    pub led: LedSection,
    /// Weight check.
    #[serde(default)]
    pub monitor: MonitorSection,
}

impl StationConfig {
    /// Load from `path`, or fall back to defaults if the file is missing.
    ///
    /// Parse and validation errors are still reported.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        let config = match Self::load(path) {
            Ok(c) => c,
            Err(ConfigError::FileNotFound) => {
                warn!("No station config at {:?}, using defaults", path);
                Self::default()
            }
            Err(e) => return Err(e),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Validation Rules
    /// 1. `shared.service_name` non-empty
    /// 2. scale clock and data pins differ
    /// 3. buzzer pin differs from both scale pins
    /// 4. `ready_retries`, `tare_samples`, `read_samples` > 0
    /// 5. buzzer tempo and base unit finite and within range
    /// 6. LED pin is a general-purpose BCM pin
    /// 7. monitor weights finite, tolerance >= 0
    /// 8. check timeout finite, between 0 s and one day
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;

        let scale = &self.scale;
        if scale.sck_pin == scale.dt_pin {
            return Err(ConfigError::ValidationError(format!(
                "scale sck_pin and dt_pin must differ (both {})",
                scale.sck_pin
            )));
        }
        if self.buzzer.pin == scale.sck_pin || self.buzzer.pin == scale.dt_pin {
            return Err(ConfigError::ValidationError(format!(
                "buzzer pin {} collides with a scale pin",
                self.buzzer.pin
            )));
        }
        if scale.ready_retries == 0 {
            return Err(ConfigError::ValidationError(
                "scale.ready_retries must be greater than 0".to_string(),
            ));
        }
        if scale.tare_samples == 0 || scale.read_samples == 0 {
            return Err(ConfigError::ValidationError(
                "scale sample counts must be greater than 0".to_string(),
            ));
        }
        let (min_tempo, max_tempo) = TEMPO_BPM_RANGE;
        if !(min_tempo..=max_tempo).contains(&self.buzzer.tempo_bpm) {
            return Err(ConfigError::ValidationError(format!(
                "buzzer.tempo_bpm must be within {min_tempo}..={max_tempo}, got {}",
                self.buzzer.tempo_bpm
            )));
        }
        if !(self.buzzer.base_unit_ms > 0.0 && self.buzzer.base_unit_ms <= MAX_BASE_UNIT_MS) {
            return Err(ConfigError::ValidationError(format!(
                "buzzer.base_unit_ms must be within (0, {MAX_BASE_UNIT_MS}], got {}",
                self.buzzer.base_unit_ms
            )));
        }
        if bcm_to_board(self.led.pin_bcm).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "led.pin_bcm {} is not a general-purpose pin",
                self.led.pin_bcm
            )));
        }
        let monitor = &self.monitor;
        if !(monitor.standard_weight.is_finite() && monitor.stability_band.is_finite()) {
            return Err(ConfigError::ValidationError(
                "monitor.standard_weight and monitor.stability_band must be finite".to_string(),
            ));
        }
        if !(monitor.weight_tolerance.is_finite() && monitor.weight_tolerance >= 0.0) {
            return Err(ConfigError::ValidationError(format!(
                "monitor.weight_tolerance must be finite and non-negative, got {}",
                monitor.weight_tolerance
            )));
        }
        if !(0.0..=MAX_CHECK_TIMEOUT_S).contains(&monitor.check_timeout_s) {
            return Err(ConfigError::ValidationError(format!(
                "monitor.check_timeout_s must be within 0..={MAX_CHECK_TIMEOUT_S}, got {}",
                monitor.check_timeout_s
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_log_level_default() {
        assert_eq!(LogLevel::default(), LogLevel::Info);
        assert_eq!(LogLevel::Warn.as_directive(), "warn");
    }

    #[test]
    fn test_shared_config_validation_empty_service_name() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: "".to_string(),
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_default_station_config_is_valid() {
        let config = StationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gpio.mode, NumberingMode::Board);
        assert_eq!(config.scale.sck_pin, PinId(11));
        assert_eq!(config.scale.dt_pin, PinId(13));
        assert_eq!(config.buzzer.pin, PinId(12));
        assert_eq!(config.led.pin_bcm, PinId(19));
        assert_eq!(config.monitor.standard_weight, 200.0);
    }

    #[test]
    fn test_config_loader_file_not_found() {
        let result = StationConfig::load(Path::new("/nonexistent/path/station.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound)));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config =
            StationConfig::load_or_default(Path::new("/nonexistent/path/station.toml")).unwrap();
        assert_eq!(config.shared.service_name, SERVICE_NAME);
    }

    #[test]
    fn test_partial_station_config() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[gpio]
mode = "bcm"

[monitor]
standard_weight = 150.0
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = StationConfig::load(file.path()).unwrap();
        assert_eq!(config.gpio.mode, NumberingMode::Bcm);
        assert_eq!(config.gpio.backend, "rppal");
        assert_eq!(config.monitor.standard_weight, 150.0);
        assert_eq!(config.monitor.weight_tolerance, 10.0);
        assert_eq!(config.scale.ready_retries, ADC_READY_RETRIES);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<StationConfig, _> = toml::from_str("[scale]\nclock = 3\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_infinite_check_timeout_rejected() {
        let config: StationConfig = toml::from_str("[monitor]\ncheck_timeout_s = inf\n").unwrap();
        assert!(config.monitor.check_timeout_s.is_infinite());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
        // Unvalidated sections still convert without panicking.
        assert_eq!(config.monitor.check_timeout(), Duration::MAX);
    }

    #[test]
    fn test_out_of_range_timing_rejected() {
        let mut config = StationConfig::default();
        config.buzzer.tempo_bpm = 1e-310;
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.buzzer.base_unit_ms = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.monitor.check_timeout_s = -1.0;
        assert!(config.validate().is_err());

        let mut config = StationConfig::default();
        config.monitor.weight_tolerance = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pin_collision_rejected() {
        let mut config = StationConfig::default();
        config.buzzer.pin = config.scale.dt_pin;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_led_pin_must_translate() {
        let mut config = StationConfig::default();
        config.led.pin_bcm = PinId(40);
        assert!(config.validate().is_err());
    }
}
