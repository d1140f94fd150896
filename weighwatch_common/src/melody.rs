//! Melody data types and note timing.
//!
//! A melody is an ordered list of `(frequency_hz, duration_units)` pairs;
//! a frequency of 0 is a rest. Units are converted to milliseconds by
//! [`MelodyTiming`]:
//!
//! ```text
//! note_ms = base_unit_ms × units / tempo_bpm
//! ```

use crate::consts::{DEFAULT_BASE_UNIT_MS, DEFAULT_TEMPO_BPM};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One note of a melody.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Note {
    /// Square-wave frequency. `0` is a rest.
    pub frequency_hz: u32,
    /// Length in tempo-relative units.
    pub units: f64,
}

impl Note {
    /// Build a note.
    pub const fn new(frequency_hz: u32, units: f64) -> Self {
        Self { frequency_hz, units }
    }

    /// Build a rest.
    pub const fn rest(units: f64) -> Self {
        Self {
            frequency_hz: 0,
            units,
        }
    }

    /// `true` if this note is silent.
    pub const fn is_rest(&self) -> bool {
        self.frequency_hz == 0
    }
}

/// Ordered note sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Melody {
    /// Notes in playback order.
    pub notes: Vec<Note>,
}

impl Melody {
    /// Build a melody from parallel note/duration tables.
    ///
    /// Extra entries in the longer table are ignored.
    pub fn from_tables(frequencies: &[u32], units: &[f64]) -> Self {
        Self {
            notes: frequencies
                .iter()
                .zip(units)
                .map(|(&f, &u)| Note::new(f, u))
                .collect(),
        }
    }

    /// Number of notes.
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    /// `true` when there is nothing to play.
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Short rising alert used when a weight check fails.
    pub fn alert() -> Self {
        const NOTE_DS5: u32 = 622;
        const NOTE_FS5: u32 = 740;
        const NOTE_GS5: u32 = 831;
        const NOTE_AS5: u32 = 932;
        Self::from_tables(
            &[NOTE_DS5, NOTE_FS5, NOTE_GS5, NOTE_AS5, 0, NOTE_AS5, NOTE_GS5, NOTE_AS5],
            &[4.0, 4.0, 4.0, 8.0, 4.0, 4.0, 4.0, 16.0],
        )
    }
}

/// Conversion from note units to wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MelodyTiming {
    /// Milliseconds of one unit at 1 bpm.
    pub base_unit_ms: f64,
    /// Tempo in beats per minute.
    pub tempo_bpm: f64,
}

impl Default for MelodyTiming {
    fn default() -> Self {
        Self {
            base_unit_ms: DEFAULT_BASE_UNIT_MS,
            tempo_bpm: DEFAULT_TEMPO_BPM,
        }
    }
}

impl MelodyTiming {
    /// Timing under which one unit is exactly one millisecond.
    pub const fn milliseconds() -> Self {
        Self {
            base_unit_ms: 1.0,
            tempo_bpm: 1.0,
        }
    }

    /// Note length in milliseconds.
    pub fn note_ms(&self, units: f64) -> f64 {
        if self.tempo_bpm <= 0.0 {
            return 0.0;
        }
        self.base_unit_ms * units / self.tempo_bpm
    }

    /// Silent gap after a note: a quarter of the note length.
    pub fn gap_ms(&self, units: f64) -> f64 {
        self.note_ms(units) / 4.0
    }

    /// Nominal playback time of a whole melody, gaps included.
    pub fn total_duration(&self, melody: &Melody) -> Duration {
        let ms: f64 = melody
            .notes
            .iter()
            .map(|n| self.note_ms(n.units) + self.gap_ms(n.units))
            .sum();
        Duration::try_from_secs_f64(ms.max(0.0) / 1000.0).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timing_matches_base_formula() {
        let t = MelodyTiming::default();
        // 12000 * 4 / 137
        assert!((t.note_ms(4.0) - 350.364_963).abs() < 1e-3);
        assert!((t.gap_ms(4.0) - 87.591_240).abs() < 1e-3);
    }

    #[test]
    fn millisecond_timing_is_identity() {
        let t = MelodyTiming::milliseconds();
        assert_eq!(t.note_ms(100.0), 100.0);
        assert_eq!(t.gap_ms(100.0), 25.0);
    }

    #[test]
    fn total_duration_includes_gaps() {
        let m = Melody::from_tables(&[440, 0, 440], &[100.0, 50.0, 100.0]);
        let d = MelodyTiming::milliseconds().total_duration(&m);
        assert_eq!(d.as_millis(), 312);
    }

    #[test]
    fn zero_tempo_is_silent() {
        let t = MelodyTiming {
            base_unit_ms: 12_000.0,
            tempo_bpm: 0.0,
        };
        assert_eq!(t.note_ms(4.0), 0.0);
    }

    #[test]
    fn from_tables_truncates_to_shorter() {
        let m = Melody::from_tables(&[1, 2, 3], &[1.0, 2.0]);
        assert_eq!(m.len(), 2);
        assert!(Melody::alert().notes.iter().any(Note::is_rest));
    }
}
