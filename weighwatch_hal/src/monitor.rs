//! Weighing station orchestrator.
//!
//! `WeightMonitor` owns every driver and is the only writer of their pins.
//! Each loop iteration:
//!
//! 1. drains queued actuation requests
//! 2. reads the stabilized weight
//! 3. updates the stability counter and the maximum
//! 4. evaluates the check window: the expected weight within tolerance
//!    passes the check and silences the buzzer; an elapsed window fails it
//!    and starts the alert melody

use crate::actuation::{ActuationQueue, ActuationRequest, ActuationSender};
use crate::drivers::{MelodyTask, StatusLed, ToneDriver, WeightSensor};
use crate::registry::PinRegistry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};
use weighwatch_common::config::{ConfigError, StationConfig};
use weighwatch_common::consts::STABLE_READINGS_REQUIRED;
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::numbering::{convert_pin, NumberingMode};
use weighwatch_common::gpio::types::PinId;
use weighwatch_common::melody::Melody;

/// Errors that stop the station from starting.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// GPIO setup failed.
    #[error(transparent)]
    Gpio(#[from] GpioError),

    /// Configuration invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Progress of the current weight check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CheckState {
    /// Waiting for the expected weight.
    Checking,
    /// Expected weight seen within the window.
    Passed {
        /// Weight that passed [g].
        weight: f64,
    },
    /// Window elapsed without the expected weight.
    Failed,
}

/// Result of one loop iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorReading {
    /// Stabilized weight [g].
    pub weight: f64,
    /// Largest weight since the last tare [g].
    pub max_weight: f64,
    /// Enough consecutive readings within the stability band.
    pub stable: bool,
    /// Check progress after this iteration.
    pub check: CheckState,
    /// Time left in the check window while checking.
    pub remaining: Option<Duration>,
    /// Whether a melody is playing.
    pub music_playing: bool,
}

/// Orchestrator owning the scale, buzzer and LED.
pub struct WeightMonitor {
    config: StationConfig,
    registry: Arc<PinRegistry>,
    scale: WeightSensor,
    /// Idle buzzer; `None` while a melody task holds it.
    buzzer: Option<ToneDriver>,
    melody_task: Option<MelodyTask>,
    led: Option<StatusLed>,
    queue: ActuationQueue,
    alert: Melody,
    check: CheckState,
    check_started: Instant,
    last_weight: f64,
    stable_count: u32,
    max_weight: f64,
}

impl WeightMonitor {
    /// Initialize the registry and claim every pin.
    ///
    /// The scale is mandatory. A missing buzzer disables music; a missing
    /// LED turns flash requests into log lines.
    pub fn setup(config: StationConfig, registry: Arc<PinRegistry>) -> Result<Self, MonitorError> {
        config.validate()?;
        registry.initialize(config.gpio.mode)?;

        let scale = WeightSensor::open(&registry, &config.scale)?;

        let buzzer = match ToneDriver::new(&registry, config.buzzer.pin) {
            Ok(driver) => Some(driver),
            Err(e) => {
                warn!("Buzzer unavailable, music disabled: {}", e);
                None
            }
        };

        let led = Self::setup_led(&registry, &config);

        info!(
            "Station ready: target {:.1}±{:.1} g within {:.1} s (music {})",
            config.monitor.standard_weight,
            config.monitor.weight_tolerance,
            config.monitor.check_timeout_s,
            if config.monitor.enable_music { "on" } else { "off" }
        );

        Ok(Self {
            config,
            registry,
            scale,
            buzzer,
            melody_task: None,
            led,
            queue: ActuationQueue::new(),
            alert: Melody::alert(),
            check: CheckState::Checking,
            check_started: Instant::now(),
            last_weight: 0.0,
            stable_count: 0,
            max_weight: 0.0,
        })
    }

    /// Claim the configured LED pin, or the first free safe pin.
    fn setup_led(registry: &Arc<PinRegistry>, config: &StationConfig) -> Option<StatusLed> {
        let mode = registry.mode().unwrap_or(config.gpio.mode);
        let half_period = config.led.flash_half_period();

        match convert_pin(config.led.pin_bcm, NumberingMode::Bcm, mode) {
            Some(pin) => match StatusLed::new(registry, pin, half_period) {
                Ok(led) => {
                    info!("Status LED on pin {} (BCM {})", pin, config.led.pin_bcm);
                    return Some(led);
                }
                Err(e) => warn!("LED pin {} unavailable: {}", pin, e),
            },
            None => warn!("LED pin BCM {} has no {} equivalent", config.led.pin_bcm, mode),
        }

        let excluded = [config.scale.sck_pin, config.scale.dt_pin, config.buzzer.pin];
        for pin in registry.find_available(1, &excluded) {
            match StatusLed::new(registry, pin, half_period) {
                Ok(led) => {
                    info!("Status LED moved to free pin {}", pin);
                    return Some(led);
                }
                Err(e) => warn!("Fallback LED pin {} unavailable: {}", pin, e),
            }
        }

        warn!("No free pin for the status LED, flash requests will only be logged");
        None
    }

    /// Producer handle for other threads.
    pub fn sender(&self) -> ActuationSender {
        self.queue.sender()
    }

    /// Registry shared with the drivers.
    pub fn registry(&self) -> &Arc<PinRegistry> {
        &self.registry
    }

    /// Effective configuration.
    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    /// The load-cell driver.
    pub fn scale(&self) -> &WeightSensor {
        &self.scale
    }

    /// The load-cell driver, mutably (calibration, synthetic load).
    pub fn scale_mut(&mut self) -> &mut WeightSensor {
        &mut self.scale
    }

    /// Pin the LED ended up on.
    pub fn led_pin(&self) -> Option<PinId> {
        self.led.as_ref().map(StatusLed::pin)
    }

    /// Current check progress.
    pub fn check_state(&self) -> CheckState {
        self.check
    }

    /// Whether a melody is playing.
    pub fn music_playing(&self) -> bool {
        self.melody_task.as_ref().is_some_and(|t| !t.is_finished())
    }

    // ─── Actuation ──────────────────────────────────────────────────

    fn handle(&mut self, request: ActuationRequest) {
        match request {
            ActuationRequest::FlashLed { count } => {
                let count = count.max(self.config.led.min_flashes);
                match &self.led {
                    Some(led) => led.flash(count),
                    None => info!("LED alert x{} (no LED available)", count),
                }
            }
            ActuationRequest::PlayMelody(melody) => self.start_music(melody),
            ActuationRequest::StopMelody => self.stop_music(),
        }
    }

    fn start_music(&mut self, melody: Melody) {
        if !self.config.monitor.enable_music {
            debug!("Music disabled, ignoring melody request");
            return;
        }
        self.reap_music();
        if self.melody_task.is_some() {
            debug!("Melody already playing");
            return;
        }
        let Some(driver) = self.buzzer.take() else {
            warn!("No buzzer available for melody");
            return;
        };
        match driver.spawn_melody(melody, self.config.buzzer.timing()) {
            Ok(task) => self.melody_task = Some(task),
            Err(e) => {
                warn!("Failed to start melody: {}", e.source);
                self.buzzer = Some(e.driver);
            }
        }
    }

    fn take_back(&mut self, task: MelodyTask) {
        match task.join() {
            Ok((driver, outcome)) => {
                debug!("Melody task ended: {:?}", outcome);
                self.buzzer = Some(driver);
            }
            Err(e) => warn!("Buzzer lost: {}", e),
        }
    }

    /// Stop the melody and wait for the task to hand the buzzer back.
    ///
    /// Returns within one tone cycle or rest slice.
    fn stop_music(&mut self) {
        if let Some(task) = self.melody_task.take() {
            info!("Stopping melody");
            task.stop();
            self.take_back(task);
        }
    }

    fn reap_music(&mut self) {
        if self.melody_task.as_ref().is_some_and(MelodyTask::is_finished) {
            if let Some(task) = self.melody_task.take() {
                self.take_back(task);
            }
        }
    }

    // ─── Loop ───────────────────────────────────────────────────────

    /// Zero the scale and restart the check window.
    pub fn tare(&mut self) -> f64 {
        info!("Taring, remove all items from the scale");
        let offset = self.scale.tare(self.config.scale.tare_samples);
        self.restart_check();
        offset
    }

    /// Start a new check window without taring.
    pub fn restart_check(&mut self) {
        self.check = CheckState::Checking;
        self.check_started = Instant::now();
        self.max_weight = 0.0;
        self.stable_count = 0;
    }

    /// One loop iteration.
    pub fn step(&mut self) -> MonitorReading {
        for request in self.queue.drain() {
            self.handle(request);
        }
        self.reap_music();

        let weight = self.scale.get_stable_weight(self.config.scale.read_samples);

        if (weight - self.last_weight).abs() <= self.config.monitor.stability_band {
            self.stable_count = self.stable_count.saturating_add(1);
        } else {
            self.stable_count = 0;
        }
        self.last_weight = weight;
        self.max_weight = self.max_weight.max(weight);

        let mut remaining = None;
        if self.check == CheckState::Checking {
            let elapsed = self.check_started.elapsed();
            let timeout = self.config.monitor.check_timeout();
            let target = self.config.monitor.standard_weight;

            if elapsed <= timeout {
                if (weight - target).abs() <= self.config.monitor.weight_tolerance {
                    info!("Weight check passed: {:.1} g", weight);
                    self.check = CheckState::Passed { weight };
                    self.stop_music();
                } else {
                    remaining = Some(timeout - elapsed);
                }
            } else {
                warn!(
                    "Weight check failed: {:.1} g not reached within {:.1} s",
                    target, self.config.monitor.check_timeout_s
                );
                self.check = CheckState::Failed;
                if self.config.monitor.enable_music {
                    self.start_music(self.alert.clone());
                }
            }
        }

        MonitorReading {
            weight,
            max_weight: self.max_weight,
            stable: self.stable_count >= STABLE_READINGS_REQUIRED,
            check: self.check,
            remaining,
            music_playing: self.music_playing(),
        }
    }

    /// Loop until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        let interval = self.config.monitor.poll_interval();
        info!("Monitoring started (poll every {:?})", interval);

        while running.load(Ordering::SeqCst) {
            let r = self.step();
            debug!(
                "weight={:.2} g max={:.2} g {} {:?}{}",
                r.weight,
                r.max_weight,
                if r.stable { "stable" } else { "changing" },
                r.check,
                if r.music_playing { " [music]" } else { "" }
            );
            thread::sleep(interval);
        }
        info!("Monitoring stopped");
    }

    /// Stop music, switch the LED off, release every pin and reset the lines.
    pub fn shutdown(mut self) -> Result<(), MonitorError> {
        self.stop_music();

        if let Some(led) = self.led.take() {
            led.cleanup();
        }
        if let Some(buzzer) = self.buzzer.take() {
            buzzer.cleanup();
        }

        let Self {
            scale, registry, ..
        } = self;
        scale.cleanup();
        registry.cleanup_all(true)?;

        info!("Station shut down");
        Ok(())
    }
}
