//! Pin registry integration tests.
//!
//! Ownership arbitration, numbering mode lock-in, owner-checked pin
//! traffic, free-pin discovery and full teardown, all on the simulation
//! backend.

use std::sync::Arc;
use std::thread;
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::numbering::{NumberingMode, BCM_TO_BOARD};
use weighwatch_common::gpio::types::{Direction, Level, PinId};
use weighwatch_hal::backend::simulation::SimulatedGpio;
use weighwatch_hal::{AllocationOutcome, PinRegistry, ReleaseOutcome};

/// Helper: registry over a fresh simulated backend, initialized in `mode`.
fn registry(mode: NumberingMode) -> (Arc<PinRegistry>, Arc<SimulatedGpio>) {
    let gpio = Arc::new(SimulatedGpio::new());
    let registry = Arc::new(PinRegistry::new(gpio.clone()));
    registry.initialize(mode).expect("initialize");
    (registry, gpio)
}

#[test]
fn test_buzzer_led_scenario() {
    let (reg, _gpio) = registry(NumberingMode::Board);
    let pin = PinId(12);

    assert_eq!(
        reg.allocate(pin, "buzzer", Direction::Output),
        Ok(AllocationOutcome::Allocated)
    );
    assert!(matches!(
        reg.allocate(pin, "led", Direction::Output),
        Err(GpioError::PinConflict { .. })
    ));
    assert_eq!(reg.release(pin, "buzzer"), ReleaseOutcome::Released);
    assert_eq!(
        reg.allocate(pin, "led", Direction::Output),
        Ok(AllocationOutcome::Allocated)
    );
    assert_eq!(reg.owner_of(pin).as_deref(), Some("led"));
}

#[test]
fn test_idempotent_allocation() {
    let (reg, _gpio) = registry(NumberingMode::Board);
    let pin = PinId(16);

    assert!(reg.allocate(pin, "A", Direction::Output).is_ok());
    assert_eq!(
        reg.allocate(pin, "A", Direction::Output),
        Ok(AllocationOutcome::AlreadyOwned)
    );

    let err = reg.allocate(pin, "B", Direction::Output).unwrap_err();
    assert_eq!(
        err,
        GpioError::PinConflict {
            pin,
            owner: "A".to_string(),
            requested_by: "B".to_string(),
        }
    );
    assert_eq!(reg.owner_of(pin).as_deref(), Some("A"));
}

#[test]
fn test_release_then_reallocate() {
    let (reg, _gpio) = registry(NumberingMode::Bcm);
    let pin = PinId(17);

    reg.allocate(pin, "A", Direction::Output).unwrap();
    assert!(reg.release(pin, "A").is_released());
    assert_eq!(reg.release(pin, "A"), ReleaseOutcome::NotHeld);
    assert!(reg.allocate(pin, "B", Direction::Output).is_ok());
}

#[test]
fn test_release_leaves_line_level() {
    let (reg, gpio) = registry(NumberingMode::Board);
    let pin = PinId(18);

    reg.allocate(pin, "A", Direction::Output).unwrap();
    reg.write(pin, "A", Level::High).unwrap();
    reg.release(pin, "A");
    assert_eq!(gpio.level(pin), Some(Level::High));
}

#[test]
fn test_mode_locked_after_initialize() {
    let (reg, gpio) = registry(NumberingMode::Board);

    assert!(reg.initialize(NumberingMode::Board).is_ok());
    assert_eq!(
        reg.initialize(NumberingMode::Bcm),
        Err(GpioError::ModeConflict {
            current: NumberingMode::Board,
            requested: NumberingMode::Bcm,
        })
    );
    assert_eq!(reg.mode(), Some(NumberingMode::Board));
    assert_eq!(gpio.numbering(), Some(NumberingMode::Board));
}

#[test]
fn test_non_owner_cannot_drive_or_sample() {
    let (reg, gpio) = registry(NumberingMode::Board);
    let pin = PinId(12);
    reg.allocate(pin, "buzzer", Direction::Output).unwrap();

    let err = reg.write(pin, "led", Level::High).unwrap_err();
    assert!(matches!(
        err,
        GpioError::NotOwner { ref owner, .. } if owner.as_deref() == Some("buzzer")
    ));
    assert_eq!(gpio.level(pin), Some(Level::Low));
    assert!(reg.read(pin, "led").is_err());

    assert!(matches!(
        reg.write(PinId(22), "led", Level::High),
        Err(GpioError::NotOwner { owner: None, .. })
    ));

    reg.write(pin, "buzzer", Level::High).unwrap();
    assert_eq!(reg.read(pin, "buzzer"), Ok(Level::High));
}

#[test]
fn test_claimed_pin_handle() {
    let (reg, gpio) = registry(NumberingMode::Board);

    let pin = reg.claim(PinId(37), "relay", Direction::Output).unwrap();
    pin.set_high().unwrap();
    assert_eq!(gpio.level(PinId(37)), Some(Level::High));
    assert_eq!(pin.read(), Ok(Level::High));
    assert_eq!(pin.owner(), "relay");

    assert!(reg.claim(PinId(37), "other", Direction::Output).is_err());
    drop(pin);
    assert_eq!(reg.owner_of(PinId(37)), None);
    assert!(reg.claim(PinId(37), "other", Direction::Output).is_ok());
}

#[test]
fn test_explicit_release_of_handle() {
    let (reg, _gpio) = registry(NumberingMode::Board);
    let pin = reg.claim(PinId(40), "relay", Direction::Output).unwrap();
    assert_eq!(pin.release(), ReleaseOutcome::Released);
    assert!(reg.status().allocated.is_empty());
}

#[test]
fn test_second_claim_by_same_owner_fails() {
    let (reg, gpio) = registry(NumberingMode::Board);
    let first = reg.claim(PinId(12), "buzzer", Direction::Output).unwrap();

    assert_eq!(
        reg.claim(PinId(12), "buzzer", Direction::Output).err(),
        Some(GpioError::AlreadyClaimed {
            pin: PinId(12),
            owner: "buzzer".to_string(),
        })
    );

    // The refused claim leaves the first handle fully usable.
    assert_eq!(reg.owner_of(PinId(12)).as_deref(), Some("buzzer"));
    first.set_high().unwrap();
    assert_eq!(gpio.level(PinId(12)), Some(Level::High));
    first.set_low().unwrap();
    assert_eq!(gpio.rising_edges(PinId(12)), 1);

    // allocate stays idempotent.
    assert_eq!(
        reg.allocate(PinId(12), "buzzer", Direction::Output),
        Ok(AllocationOutcome::AlreadyOwned)
    );
    assert_eq!(first.release(), ReleaseOutcome::Released);
}

#[test]
fn test_find_available_skips_owned_and_excluded() {
    let (reg, _gpio) = registry(NumberingMode::Board);
    reg.allocate(PinId(11), "hx711", Direction::Output).unwrap();

    let found = reg.find_available(2, &[PinId(12)]);
    assert_eq!(found, vec![PinId(13), PinId(15)]);
    // Probing does not allocate.
    assert_eq!(reg.owner_of(PinId(13)), None);
}

#[test]
fn test_find_available_skips_pins_failing_round_trip() {
    let (reg, gpio) = registry(NumberingMode::Board);
    gpio.set_stuck(PinId(11), Some(Level::High));
    gpio.set_stuck(PinId(12), Some(Level::Low));

    assert_eq!(reg.find_available(1, &[]), vec![PinId(13)]);
}

#[test]
fn test_find_available_bcm_list() {
    let (reg, _gpio) = registry(NumberingMode::Bcm);
    assert_eq!(reg.find_available(3, &[PinId(18)]), vec![PinId(17), PinId(27), PinId(22)]);
}

#[test]
fn test_find_available_before_initialize() {
    let reg = PinRegistry::new(Arc::new(SimulatedGpio::new()));
    assert!(reg.find_available(4, &[]).is_empty());
}

#[test]
fn test_convert_is_independent_of_ownership() {
    let (reg, _gpio) = registry(NumberingMode::Board);
    reg.allocate(PinId(12), "buzzer", Direction::Output).unwrap();

    assert_eq!(
        reg.convert(PinId(18), NumberingMode::Bcm, NumberingMode::Board),
        Some(PinId(12))
    );
    assert_eq!(
        reg.convert(PinId(35), NumberingMode::Board, NumberingMode::Bcm),
        Some(PinId(19))
    );
    assert_eq!(
        reg.convert(PinId(1), NumberingMode::Board, NumberingMode::Bcm),
        None
    );
    for (bcm, _) in BCM_TO_BOARD {
        let board = reg
            .convert(PinId(bcm), NumberingMode::Bcm, NumberingMode::Board)
            .unwrap();
        assert_eq!(
            reg.convert(board, NumberingMode::Board, NumberingMode::Bcm),
            Some(PinId(bcm))
        );
    }
}

#[test]
fn test_cleanup_all_resets_everything() {
    let (reg, gpio) = registry(NumberingMode::Board);
    reg.allocate(PinId(11), "hx711", Direction::Output).unwrap();
    reg.allocate(PinId(12), "buzzer", Direction::Output).unwrap();

    reg.cleanup_all(false).unwrap();
    assert!(!reg.is_initialized());
    assert!(reg.status().allocated.is_empty());
    assert_eq!(gpio.snapshot(PinId(11)), None);

    // A fresh mode may be chosen after teardown.
    assert!(reg.initialize(NumberingMode::Bcm).is_ok());
}

#[test]
fn test_concurrent_allocation_single_winner() {
    let (reg, _gpio) = registry(NumberingMode::Board);

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let reg = Arc::clone(&reg);
            thread::spawn(move || {
                reg.allocate(PinId(22), &format!("module-{i}"), Direction::Output)
                    .is_ok()
            })
        })
        .collect();

    let winners = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count();
    assert_eq!(winners, 1);
    assert!(reg.owner_of(PinId(22)).is_some());
}
