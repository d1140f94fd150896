//! Square-wave tone driver and melody sequencer.
//!
//! A tone is rendered by toggling one output line in software:
//! `half_period = 1 / (2 * f)`, `cycles = floor(duration_ms * f / 1000)`.
//! Melodies run on a background thread that owns the driver, so at most
//! one melody plays per pin. Stopping is cooperative: the flag is checked
//! before every cycle, every note and every slice of a rest.
//!
//! Every exit path leaves the line LOW.

use crate::pin::DigitalPin;
use crate::registry::PinRegistry;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, trace, warn};
use weighwatch_common::gpio::error::GpioError;
use weighwatch_common::gpio::types::{Direction, Level, PinId};
use weighwatch_common::melody::{Melody, MelodyTiming};

/// Owner name recorded in the pin registry.
pub const OWNER: &str = "buzzer";

/// Longest uninterrupted sleep during rests and gaps.
const STOP_POLL_SLICE: Duration = Duration::from_millis(10);

/// On/off pairs in a tone of `duration_ms` at `frequency_hz`.
///
/// Zero for rests and for durations that are not a finite positive number.
pub fn cycle_count(frequency_hz: u32, duration_ms: f64) -> u64 {
    if frequency_hz == 0 || !duration_ms.is_finite() || duration_ms <= 0.0 {
        return 0;
    }
    (duration_ms * f64::from(frequency_hz) / 1000.0).floor() as u64
}

/// Milliseconds to a sleep length. `None` when not representable.
fn ms_to_duration(ms: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).ok()
}

/// How a tone or melody ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Playback {
    /// Played to the end.
    Completed,
    /// Cut short by a stop request.
    Stopped,
}

/// Cloneable stop flag, usable from any thread.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request a stop. Observed at the next cycle or note boundary.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives the line low when dropped.
struct LowOnDrop<'a>(&'a DigitalPin);

impl Drop for LowOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.set_low() {
            warn!("Failed to leave buzzer pin {} low: {}", self.0.pin(), e);
        }
    }
}

/// Square-wave generator on one output line.
#[derive(Debug)]
pub struct ToneDriver {
    pin: DigitalPin,
    stop: StopHandle,
    toggle_errors: AtomicU64,
}

impl ToneDriver {
    /// Claim `pin` as an output and drive it low.
    pub fn new(registry: &Arc<PinRegistry>, pin: PinId) -> Result<Self, GpioError> {
        let pin = registry.claim(pin, OWNER, Direction::Output)?;
        Ok(Self::from_pin(pin))
    }

    /// Wrap an already claimed output.
    pub fn from_pin(pin: DigitalPin) -> Self {
        if let Err(e) = pin.set_low() {
            warn!("Failed to drive buzzer pin {} low: {}", pin.pin(), e);
        }
        debug!("Tone driver ready on pin {}", pin.pin());
        Self {
            pin,
            stop: StopHandle::default(),
            toggle_errors: AtomicU64::new(0),
        }
    }

    /// Pin in use.
    pub fn pin(&self) -> PinId {
        self.pin.pin()
    }

    /// Handle for stopping playback from another thread.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Request a stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Failed toggles since construction.
    pub fn toggle_errors(&self) -> u64 {
        self.toggle_errors.load(Ordering::Relaxed)
    }

    fn drive(&self, level: Level) {
        if let Err(e) = self.pin.write(level) {
            self.toggle_errors.fetch_add(1, Ordering::Relaxed);
            warn!("Buzzer toggle failed on pin {}: {}", self.pin.pin(), e);
        }
    }

    /// Sleep for `duration` in slices, returning early on a stop request.
    fn rest(&self, duration: Duration) -> Playback {
        let deadline = Instant::now() + duration;
        loop {
            if self.stop.is_stopped() {
                return Playback::Stopped;
            }
            let now = Instant::now();
            if now >= deadline {
                return Playback::Completed;
            }
            thread::sleep((deadline - now).min(STOP_POLL_SLICE));
        }
    }

    /// Play one tone. Frequency 0 is a rest.
    ///
    /// A failed toggle is logged and the cycle loop carries on.
    pub fn tone(&self, frequency_hz: u32, duration_ms: f64) -> Playback {
        let _low = LowOnDrop(&self.pin);
        let Some(duration) = ms_to_duration(duration_ms) else {
            warn!("Skipping note with unusable length {} ms", duration_ms);
            return Playback::Completed;
        };
        if frequency_hz == 0 {
            trace!("Rest {:.1} ms", duration_ms);
            return self.rest(duration);
        }

        let half_period = Duration::from_secs_f64(1.0 / (2.0 * f64::from(frequency_hz)));
        let cycles = cycle_count(frequency_hz, duration_ms);
        trace!("Tone {} Hz for {:.1} ms ({} cycles)", frequency_hz, duration_ms, cycles);

        for _ in 0..cycles {
            if self.stop.is_stopped() {
                return Playback::Stopped;
            }
            self.drive(Level::High);
            thread::sleep(half_period);
            self.drive(Level::Low);
            thread::sleep(half_period);
        }
        Playback::Completed
    }

    /// Play `melody` on this thread.
    ///
    /// Each note is followed by a silent gap of a quarter of its length.
    /// Returns early at the first stop check that sees the flag set.
    pub fn play_melody(&self, melody: &Melody, timing: &MelodyTiming) -> Playback {
        let _low = LowOnDrop(&self.pin);
        for note in &melody.notes {
            if self.stop.is_stopped() {
                return Playback::Stopped;
            }
            let note_ms = timing.note_ms(note.units);
            if self.tone(note.frequency_hz, note_ms) == Playback::Stopped {
                return Playback::Stopped;
            }
            let gap = ms_to_duration(timing.gap_ms(note.units)).unwrap_or(Duration::ZERO);
            if self.rest(gap) == Playback::Stopped {
                return Playback::Stopped;
            }
        }
        Playback::Completed
    }

    /// Play `melody` on a background thread.
    ///
    /// The driver moves into the task and comes back from
    /// [`MelodyTask::join`]. Any earlier stop request is cleared first. If
    /// the thread cannot be started the driver is returned in the error.
    pub fn spawn_melody(
        self,
        melody: Melody,
        timing: MelodyTiming,
    ) -> Result<MelodyTask, SpawnError> {
        let name = format!("melody-{}", self.pin());
        self.spawn_on(thread::Builder::new().name(name), melody, timing)
    }

    fn spawn_on(
        self,
        builder: thread::Builder,
        melody: Melody,
        timing: MelodyTiming,
    ) -> Result<MelodyTask, SpawnError> {
        let pin = self.pin();

        // The thread is started empty and the driver handed over afterwards,
        // so a failed spawn never consumes it.
        let (tx, rx) = mpsc::channel::<ToneDriver>();
        let handle = match builder.spawn(move || {
            let driver = rx.recv().ok()?;
            info!("Melody started on pin {} ({} notes)", pin, melody.len());
            let outcome = driver.play_melody(&melody, &timing);
            info!("Melody on pin {} {:?}", pin, outcome);
            Some((driver, outcome))
        }) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Melody thread for pin {} not started: {}", pin, e);
                return Err(SpawnError {
                    driver: self,
                    source: GpioError::Backend(format!("failed to spawn melody thread: {e}")),
                });
            }
        };

        self.stop.clear();
        let stop = self.stop.clone();
        if let Err(mpsc::SendError(driver)) = tx.send(self) {
            let _ = handle.join();
            return Err(SpawnError {
                driver,
                source: GpioError::Backend("melody thread exited before start".to_string()),
            });
        }
        Ok(MelodyTask { stop, handle })
    }

    /// Release the pin, leaving it low.
    pub fn cleanup(self) {
        if let Err(e) = self.pin.set_low() {
            debug!("Buzzer idle on cleanup failed: {}", e);
        }
        self.pin.release();
    }
}

/// Melody thread could not be started. The driver is handed back.
#[derive(Debug, Error)]
#[error("failed to start melody: {source}")]
pub struct SpawnError {
    /// Driver that would have played the melody.
    pub driver: ToneDriver,
    /// Cause.
    pub source: GpioError,
}

/// Handle to a melody playing on a background thread.
#[derive(Debug)]
pub struct MelodyTask {
    stop: StopHandle,
    handle: JoinHandle<Option<(ToneDriver, Playback)>>,
}

impl MelodyTask {
    /// Request a stop.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Stop flag shared with the task.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task and take the driver back, stop flag cleared.
    pub fn join(self) -> Result<(ToneDriver, Playback), GpioError> {
        let (driver, outcome) = self
            .handle
            .join()
            .map_err(|_| GpioError::Backend("melody thread panicked".to_string()))?
            .ok_or_else(|| GpioError::Backend("melody thread never received its driver".to_string()))?;
        driver.stop.clear();
        Ok((driver, outcome))
    }
}
