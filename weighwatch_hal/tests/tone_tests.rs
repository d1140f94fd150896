//! Tone driver integration tests.
//!
//! Counts rising edges on a simulated buzzer line to check cycle counts,
//! rests, melody sequencing, cooperative stop and per-toggle error
//! tolerance. Every test also checks the line is left LOW.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use weighwatch_common::gpio::numbering::NumberingMode;
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::types::{Level, PinId};
use weighwatch_common::melody::{Melody, MelodyTiming};
use weighwatch_hal::backend::simulation::SimulatedGpio;
use weighwatch_hal::drivers::tone::{self, Playback, ToneDriver};
use weighwatch_hal::PinRegistry;

const BUZZER: PinId = PinId(12);

/// Helper: BOARD registry and a tone driver on pin 12.
fn setup() -> (Arc<PinRegistry>, Arc<SimulatedGpio>, ToneDriver) {
    let gpio = Arc::new(SimulatedGpio::new());
    let registry = Arc::new(PinRegistry::new(gpio.clone()));
    registry.initialize(NumberingMode::Board).unwrap();
    let driver = ToneDriver::new(&registry, BUZZER).unwrap();
    (registry, gpio, driver)
}

#[test]
fn test_tone_440_for_one_second() {
    let (_reg, gpio, driver) = setup();

    assert_eq!(driver.tone(440, 1000.0), Playback::Completed);
    assert_eq!(gpio.rising_edges(BUZZER), 440);
    assert_eq!(gpio.level(BUZZER), Some(Level::Low));
}

#[test]
fn test_short_tone_cycle_count() {
    let (_reg, gpio, driver) = setup();

    driver.tone(2000, 25.0);
    assert_eq!(gpio.rising_edges(BUZZER), tone::cycle_count(2000, 25.0));
    assert_eq!(gpio.rising_edges(BUZZER), 50);
}

#[test]
fn test_rest_does_not_toggle() {
    let (_reg, gpio, driver) = setup();

    let start = Instant::now();
    assert_eq!(driver.tone(0, 50.0), Playback::Completed);
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert_eq!(gpio.rising_edges(BUZZER), 0);
    assert_eq!(gpio.level(BUZZER), Some(Level::Low));
}

#[test]
fn test_melody_tone_rest_tone() {
    let (_reg, gpio, driver) = setup();
    let melody = Melody::from_tables(&[440, 0, 440], &[100.0, 50.0, 100.0]);
    let timing = MelodyTiming::milliseconds();

    let start = Instant::now();
    assert_eq!(driver.play_melody(&melody, &timing), Playback::Completed);
    let elapsed = start.elapsed();

    // 250 ms of notes plus 62.5 ms of gaps.
    assert!(elapsed >= Duration::from_millis(312), "elapsed {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "elapsed {elapsed:?}");
    assert_eq!(gpio.rising_edges(BUZZER), 88);
    assert_eq!(gpio.level(BUZZER), Some(Level::Low));
}

#[test]
fn test_stop_before_tone() {
    let (_reg, gpio, driver) = setup();
    driver.stop();
    assert_eq!(driver.tone(1000, 50.0), Playback::Stopped);
    assert_eq!(gpio.rising_edges(BUZZER), 0);
}

#[test]
fn test_cooperative_stop_leaves_pin_low() {
    let (_reg, gpio, driver) = setup();
    let melody = Melody::from_tables(&[1000; 20], &[100.0; 20]);
    let full_cycles = 20 * tone::cycle_count(1000, 100.0);

    let task = driver
        .spawn_melody(melody, MelodyTiming::milliseconds())
        .unwrap();
    thread::sleep(Duration::from_millis(150));
    assert!(!task.is_finished());

    let stopped_at = Instant::now();
    task.stop();
    let (driver, outcome) = task.join().unwrap();
    let latency = stopped_at.elapsed();

    assert_eq!(outcome, Playback::Stopped);
    assert!(latency < Duration::from_millis(500), "stop latency {latency:?}");
    assert!(gpio.rising_edges(BUZZER) < full_cycles);
    assert_eq!(gpio.level(BUZZER), Some(Level::Low));

    // The returned driver plays again.
    gpio.reset_counters();
    assert_eq!(driver.tone(1000, 5.0), Playback::Completed);
    assert_eq!(gpio.rising_edges(BUZZER), 5);
}

#[test]
fn test_stop_handle_from_other_thread() {
    let (_reg, gpio, driver) = setup();
    let task = driver
        .spawn_melody(
            Melody::from_tables(&[500; 10], &[200.0; 10]),
            MelodyTiming::milliseconds(),
        )
        .unwrap();

    let handle = task.stop_handle();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        handle.stop();
    })
    .join()
    .unwrap();

    let (_driver, outcome) = task.join().unwrap();
    assert_eq!(outcome, Playback::Stopped);
    assert_eq!(gpio.level(BUZZER), Some(Level::Low));
}

#[test]
fn test_melody_task_completes() {
    let (_reg, gpio, driver) = setup();
    let task = driver
        .spawn_melody(
            Melody::from_tables(&[1000, 0], &[10.0, 10.0]),
            MelodyTiming::milliseconds(),
        )
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(2);
    while !task.is_finished() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    assert!(task.is_finished());

    let (_driver, outcome) = task.join().unwrap();
    assert_eq!(outcome, Playback::Completed);
    assert_eq!(gpio.rising_edges(BUZZER), 10);
}

#[test]
fn test_toggle_errors_do_not_abort_tone() {
    let (_reg, gpio, driver) = setup();
    gpio.inject_write_faults(BUZZER, 3);

    assert_eq!(driver.tone(1000, 20.0), Playback::Completed);
    assert_eq!(driver.toggle_errors(), 3);
    // First cycle and the rising half of the second were lost.
    assert_eq!(gpio.rising_edges(BUZZER), 18);
    assert_eq!(gpio.level(BUZZER), Some(Level::Low));
}

#[test]
fn test_default_timing_note_lengths() {
    let timing = MelodyTiming::default();
    let melody = Melody::from_tables(&[440], &[137.0]);
    assert!((timing.note_ms(137.0) - 12_000.0).abs() < 1e-9);
    assert_eq!(timing.total_duration(&melody), Duration::from_secs(15));
}

#[test]
fn test_cleanup_releases_pin() {
    let (reg, gpio, driver) = setup();
    driver.tone(1000, 2.0);
    driver.cleanup();
    assert_eq!(reg.owner_of(BUZZER), None);
    assert_eq!(gpio.level(BUZZER), Some(Level::Low));
}

#[test]
fn test_one_driver_per_pin() {
    let (reg, gpio, driver) = setup();

    assert!(matches!(
        ToneDriver::new(&reg, BUZZER),
        Err(GpioError::AlreadyClaimed { .. })
    ));

    // The failed second driver must not release the pin of the first.
    assert_eq!(reg.owner_of(BUZZER).as_deref(), Some(tone::OWNER));
    assert_eq!(driver.tone(1000, 10.0), Playback::Completed);
    assert_eq!(driver.toggle_errors(), 0);
    assert_eq!(gpio.rising_edges(BUZZER), 10);
}

#[test]
fn test_unrepresentable_note_length_is_skipped() {
    let (_reg, gpio, driver) = setup();
    let timing = MelodyTiming {
        base_unit_ms: 1.0,
        tempo_bpm: 1e-310,
    };
    let melody = Melody::from_tables(&[440, 0], &[1.0, 1.0]);
    assert!(timing.note_ms(1.0).is_infinite());

    let start = Instant::now();
    let task = driver.spawn_melody(melody, timing).unwrap();
    let (_driver, outcome) = task.join().unwrap();

    assert_eq!(outcome, Playback::Completed);
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(gpio.rising_edges(BUZZER), 0);
    assert_eq!(gpio.level(BUZZER), Some(Level::Low));
}
