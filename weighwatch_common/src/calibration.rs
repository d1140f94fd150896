//! Load-cell calibration record and its JSON persistence.
//!
//! The record is shared with external calibration tooling, so the on-disk
//! format is a flat JSON object:
//!
//! ```json
//! {
//!   "coefficient": 0.00127551,
//!   "offset": 41562.0,
//!   "gain": 128,
//!   "is_calibrated": true,
//!   "timestamp": "2026-10-18 09:30:00"
//! }
//! ```
//!
//! Other keys in the same file are preserved on save.

use crate::config::ConfigError;
use crate::consts::{DEFAULT_COEFFICIENT, DEFAULT_GAIN, DEFAULT_OFFSET};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Amplifier gain of the 24-bit load-cell ADC.
///
/// The gain is selected by the number of extra clock pulses issued after
/// the 24 data bits, and takes effect on the *next* conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum Gain {
    /// Channel A, gain 128.
    #[default]
    A128,
    /// Channel A, gain 64.
    A64,
    /// Channel B, gain 32.
    B32,
}

impl Gain {
    /// Extra clock pulses after the data bits.
    pub const fn pulses(self) -> u32 {
        match self {
            Self::A128 => 1,
            Self::A64 => 3,
            Self::B32 => 2,
        }
    }

    /// Numeric gain factor.
    pub const fn factor(self) -> u32 {
        match self {
            Self::A128 => 128,
            Self::A64 => 64,
            Self::B32 => 32,
        }
    }
}

impl From<u32> for Gain {
    /// Unsupported factors fall back to 128.
    fn from(factor: u32) -> Self {
        match factor {
            64 => Self::A64,
            32 => Self::B32,
            _ => Self::A128,
        }
    }
}

impl From<Gain> for u32 {
    fn from(gain: Gain) -> Self {
        gain.factor()
    }
}

fn default_coefficient() -> f64 {
    DEFAULT_COEFFICIENT
}

fn default_offset() -> f64 {
    DEFAULT_OFFSET
}

fn default_gain() -> Gain {
    Gain::from(DEFAULT_GAIN)
}

fn default_true() -> bool {
    true
}

fn default_timestamp() -> String {
    "unknown".to_string()
}

/// Calibration state of a load-cell driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Grams per raw count.
    #[serde(default = "default_coefficient")]
    pub coefficient: f64,
    /// Raw reading with nothing on the scale.
    #[serde(default = "default_offset")]
    pub offset: f64,
    /// Amplifier gain.
    #[serde(default = "default_gain")]
    pub gain: Gain,
    /// A record present on disk counts as calibrated unless it says otherwise.
    #[serde(rename = "is_calibrated", default = "default_true")]
    pub calibrated: bool,
    /// When the record was written.
    #[serde(default = "default_timestamp")]
    pub timestamp: String,
}

impl Default for CalibrationRecord {
    /// Built-in defaults, explicitly uncalibrated.
    fn default() -> Self {
        Self {
            coefficient: DEFAULT_COEFFICIENT,
            offset: DEFAULT_OFFSET,
            gain: default_gain(),
            calibrated: false,
            timestamp: default_timestamp(),
        }
    }
}

impl CalibrationRecord {
    /// Check the numbers are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.coefficient.is_finite() || self.coefficient == 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "calibration coefficient must be finite and non-zero, got {}",
                self.coefficient
            )));
        }
        if !self.offset.is_finite() {
            return Err(ConfigError::ValidationError(format!(
                "calibration offset must be finite, got {}",
                self.offset
            )));
        }
        Ok(())
    }
}

/// File-backed calibration persistence.
#[derive(Debug, Clone)]
pub struct CalibrationStore {
    path: PathBuf,
}

impl CalibrationStore {
    /// Create a store for the given file.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record.
    ///
    /// Returns `Ok(None)` when the file does not exist.
    pub fn load(&self) -> Result<Option<CalibrationRecord>, ConfigError> {
        debug!("Loading calibration from {:?}", self.path);

        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Calibration file does not exist");
                return Ok(None);
            }
            Err(e) => {
                return Err(ConfigError::PersistenceError(format!(
                    "Failed to read calibration file {:?}: {}",
                    self.path, e
                )));
            }
        };

        let record: CalibrationRecord = serde_json::from_str(&content)
            .map_err(|e| ConfigError::ParseError(format!("{:?}: {}", self.path, e)))?;
        record.validate()?;

        info!(
            "Loaded calibration (saved {}): coefficient={:.8}, offset={:.0}, gain={}",
            record.timestamp,
            record.coefficient,
            record.offset,
            record.gain.factor()
        );
        Ok(Some(record))
    }

    /// Load the record, falling back to uncalibrated defaults on any failure.
    pub fn load_or_default(&self) -> CalibrationRecord {
        match self.load() {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!(
                    "No calibration file at {:?}, using defaults (uncalibrated)",
                    self.path
                );
                CalibrationRecord::default()
            }
            Err(e) => {
                warn!("Failed to load calibration: {}, using defaults (uncalibrated)", e);
                CalibrationRecord::default()
            }
        }
    }

    /// Save the record, stamping it with the current local time.
    ///
    /// Unrelated keys already present in the file are kept.
    pub fn save(&self, record: &CalibrationRecord) -> Result<CalibrationRecord, ConfigError> {
        let mut record = record.clone();
        record.timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();

        let mut object = match fs::read_to_string(&self.path) {
            Ok(existing) => match serde_json::from_str::<serde_json::Value>(&existing) {
                Ok(serde_json::Value::Object(map)) => map,
                _ => serde_json::Map::new(),
            },
            Err(_) => serde_json::Map::new(),
        };

        let fields = serde_json::to_value(&record)
            .map_err(|e| ConfigError::PersistenceError(format!("Failed to encode calibration: {}", e)))?;
        if let serde_json::Value::Object(fields) = fields {
            object.extend(fields);
        }

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    ConfigError::PersistenceError(format!("Failed to create directory: {}", e))
                })?;
            }
        }

        let text = serde_json::to_string_pretty(&serde_json::Value::Object(object))
            .map_err(|e| ConfigError::PersistenceError(format!("Failed to encode calibration: {}", e)))?;
        fs::write(&self.path, text).map_err(|e| {
            ConfigError::PersistenceError(format!(
                "Failed to write calibration file {:?}: {}",
                self.path, e
            ))
        })?;

        info!("Saved calibration to {:?}", self.path);
        Ok(record)
    }
}
