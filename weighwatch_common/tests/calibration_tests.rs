//! Calibration persistence tests.
//!
//! Load/save of the JSON calibration record: missing file, malformed file,
//! extra keys preserved on save, timestamp stamping.

use std::fs;
use tempfile::TempDir;
use weighwatch_common::calibration::{CalibrationRecord, CalibrationStore, Gain};
use weighwatch_common::config::ConfigError;
use weighwatch_common::consts::{DEFAULT_COEFFICIENT, DEFAULT_OFFSET};

#[test]
fn test_missing_file_loads_none() {
    let dir = TempDir::new().unwrap();
    let store = CalibrationStore::new(dir.path().join("hx711_calibration.json"));
    assert!(store.load().unwrap().is_none());

    let record = store.load_or_default();
    assert!(!record.calibrated);
    assert_eq!(record.coefficient, DEFAULT_COEFFICIENT);
    assert_eq!(record.offset, DEFAULT_OFFSET);
}

#[test]
fn test_malformed_file_falls_back_to_uncalibrated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cal.json");
    fs::write(&path, "{ not json").unwrap();

    let store = CalibrationStore::new(&path);
    assert!(matches!(store.load(), Err(ConfigError::ParseError(_))));
    assert!(!store.load_or_default().calibrated);
}

#[test]
fn test_existing_file_is_calibrated_by_default() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cal.json");
    fs::write(&path, r#"{"coefficient": 0.002, "offset": 12000, "gain": 64}"#).unwrap();

    let record = CalibrationStore::new(&path).load().unwrap().unwrap();
    assert!(record.calibrated);
    assert_eq!(record.coefficient, 0.002);
    assert_eq!(record.offset, 12000.0);
    assert_eq!(record.gain, Gain::A64);
    assert_eq!(record.timestamp, "unknown");
}

#[test]
fn test_save_then_load() {
    let dir = TempDir::new().unwrap();
    let store = CalibrationStore::new(dir.path().join("nested").join("cal.json"));

    let record = CalibrationRecord {
        coefficient: 0.0015,
        offset: -2500.0,
        gain: Gain::B32,
        calibrated: true,
        timestamp: String::new(),
    };
    let saved = store.save(&record).unwrap();
    assert_ne!(saved.timestamp, "");
    assert_eq!(saved.timestamp.len(), "2026-01-01 00:00:00".len());

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded, saved);
}

#[test]
fn test_save_preserves_unrelated_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cal.json");
    fs::write(
        &path,
        r#"{"offset": 1.0, "operator": "bench-2", "known_weight": 500}"#,
    )
    .unwrap();

    let store = CalibrationStore::new(&path);
    store.save(&CalibrationRecord::default()).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["operator"], "bench-2");
    assert_eq!(value["known_weight"], 500);
    assert_eq!(value["offset"], DEFAULT_OFFSET);
    assert_eq!(value["gain"], 128);
    assert_eq!(value["is_calibrated"], false);
}

#[test]
fn test_invalid_coefficient_on_disk_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cal.json");
    fs::write(&path, r#"{"coefficient": 0.0}"#).unwrap();

    let store = CalibrationStore::new(&path);
    assert!(matches!(store.load(), Err(ConfigError::ValidationError(_))));
    assert!(!store.load_or_default().calibrated);
}
