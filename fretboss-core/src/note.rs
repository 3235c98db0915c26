//! # Note Model
//!
//! Equal-tempered pitch arithmetic for the fretboard trainer. Everything here
//! is a pure function over small value types, anchored at A4 = 440 Hz.
//!
//! ## Features
//! - Twelve pitch classes with case-insensitive parsing (sharps and flats)
//! - Scientific pitch notation (`A4`, `c#3`, `Bb2`, `E-1`)
//! - Note to frequency conversion with exact octave doubling
//! - Semitone transposition with octave carry
//! - Nearest-note lookup and cent deviation for comparing detected pitches

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

use crate::error::NoteError;

/// Reference pitch: A4 = 440 Hz.
pub const REFERENCE_FREQUENCY: f64 = 440.0;
pub const REFERENCE_OCTAVE: Octave = 4;

/// Octave number in scientific pitch notation (C4 is middle C).
pub type Octave = i32;

/// One of the twelve note names within an octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PitchClass {
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

/// A note is identified by its pitch class alone.
pub type Note = PitchClass;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

const FLAT_SPELLINGS: [(&str, PitchClass); 5] = [
    ("db", PitchClass::CSharp),
    ("eb", PitchClass::DSharp),
    ("gb", PitchClass::FSharp),
    ("ab", PitchClass::GSharp),
    ("bb", PitchClass::ASharp),
];

/// Lowercase spelling to pitch class, covering ASCII and Unicode accidentals.
static NOTE_MAP: Lazy<BTreeMap<String, PitchClass>> = Lazy::new(|| {
    let mut map = BTreeMap::new();
    for class in PitchClass::ALL {
        let name = class.name().to_lowercase();
        map.insert(name.replace('#', "♯"), class);
        map.insert(name, class);
    }
    for (flat, class) in FLAT_SPELLINGS {
        map.insert(format!("{}♭", &flat[..1]), class);
        map.insert(flat.to_string(), class);
    }
    map
});

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Semitones above C within the octave (0-11).
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Pitch class at `index` semitones above C, wrapping modulo 12.
    pub fn from_index(index: i64) -> Self {
        Self::ALL[index.rem_euclid(12) as usize]
    }

    pub fn name(self) -> &'static str {
        NOTE_NAMES[self.index() as usize]
    }

    /// Moves the pitch class by `semitones`, ignoring octaves.
    pub fn transposed(self, semitones: i32) -> Self {
        Self::from_index(self.index() as i64 + semitones as i64)
    }

    /// Upward distance in semitones from `self` to `other` (0-11).
    pub fn semitones_to(self, other: Self) -> u8 {
        (other.index() as i16 - self.index() as i16).rem_euclid(12) as u8
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PitchClass {
    type Err = NoteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NOTE_MAP
            .get(&s.trim().to_lowercase())
            .copied()
            .ok_or_else(|| NoteError::Unparseable(s.to_string()))
    }
}

/// A frequency in Hz. Always finite and strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Frequency(f64);

impl Frequency {
    pub fn new(hz: f64) -> Result<Self, NoteError> {
        if hz.is_finite() && hz > 0.0 {
            Ok(Self(hz))
        } else {
            Err(NoteError::InvalidFrequency(hz))
        }
    }

    pub fn hz(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for Frequency {
    type Error = NoteError;

    fn try_from(hz: f64) -> Result<Self, Self::Error> {
        Self::new(hz)
    }
}

impl From<Frequency> for f64 {
    fn from(frequency: Frequency) -> Self {
        frequency.0
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} Hz", self.0)
    }
}

/// A pitch class in a specific octave.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pitch {
    pub note: PitchClass,
    pub octave: Octave,
}

impl Pitch {
    pub const fn new(note: PitchClass, octave: Octave) -> Self {
        Self { note, octave }
    }

    pub fn frequency(self) -> Result<Frequency, NoteError> {
        frequency_of(self.note, self.octave)
    }

    pub fn transpose(self, semitones: i32) -> Pitch {
        transpose(self.note, self.octave, semitones)
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.note, self.octave)
    }
}

impl FromStr for Pitch {
    type Err = NoteError;

    /// Parses scientific pitch notation such as `A4`, `c#3`, `Bb2` or `E-1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let unparseable = || NoteError::Unparseable(s.to_string());
        let split = trimmed
            .find(|c: char| c.is_ascii_digit() || c == '-')
            .ok_or_else(unparseable)?;
        let (name, octave) = trimmed.split_at(split);
        let note = name.parse::<PitchClass>().map_err(|_| unparseable())?;
        let octave = octave.parse::<Octave>().map_err(|_| unparseable())?;
        Ok(Pitch { note, octave })
    }
}

/// Calculates the equal-tempered frequency of a note.
///
/// The formula is `f = 440 * 2^(n / 12)` where `n` is the number of
/// semitones from A4. The octave part is applied as an exact power of two so
/// raising a note by an octave doubles its frequency bit-for-bit.
///
/// # Arguments
/// * `note` - Pitch class
/// * `octave` - Octave in scientific pitch notation
///
/// # Returns
/// * `Ok(frequency)` - Frequency in Hz
/// * `Err(NoteError::FrequencyOutOfRange)` - The octave is too extreme for a finite, positive `f64`
pub fn frequency_of(note: Note, octave: Octave) -> Result<Frequency, NoteError> {
    let out_of_range = || NoteError::FrequencyOutOfRange { note, octave };
    let octave_shift = octave.checked_sub(REFERENCE_OCTAVE).ok_or_else(out_of_range)?;
    let class_shift = (note.index() as f64 - PitchClass::A.index() as f64) / 12.0;
    let hz = REFERENCE_FREQUENCY * 2f64.powi(octave_shift) * 2f64.powf(class_shift);
    Frequency::new(hz).map_err(|_| out_of_range())
}

/// Moves a note by a number of semitones, carrying into the octave.
///
/// Octaves saturate at the bounds of [`Octave`]. Transposing back by the
/// negated amount returns the starting pitch unless the first step saturated.
pub fn transpose(note: Note, octave: Octave, semitones: i32) -> Pitch {
    let position = note.index() as i64 + semitones as i64;
    let carried = octave as i64 + position.div_euclid(12);
    Pitch {
        note: PitchClass::from_index(position),
        octave: carried.clamp(Octave::MIN as i64, Octave::MAX as i64) as Octave,
    }
}

/// Calculates the deviation from a target frequency in cents.
///
/// 100 cents make a semitone and 1200 an octave. Positive values are sharp,
/// negative values flat.
pub fn cents_between(frequency: Frequency, target: Frequency) -> f64 {
    1200.0 * (frequency.hz() / target.hz()).log2()
}

/// The equal-tempered note closest to a measured frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearestNote {
    pub pitch: Pitch,
    /// Exact frequency of `pitch`
    pub target: Frequency,
    /// Deviation of the measured frequency from `target`
    pub cents: f64,
}

impl NearestNote {
    /// True when the measured frequency is `pitch` within the tolerance.
    pub fn matches(&self, pitch: Pitch, tolerance_cents: f64) -> bool {
        self.pitch == pitch && self.cents.abs() <= tolerance_cents
    }

    /// True when the measured frequency is `note` in any octave.
    pub fn matches_class(&self, note: Note, tolerance_cents: f64) -> bool {
        self.pitch.note == note && self.cents.abs() <= tolerance_cents
    }
}

/// Finds the closest equal-tempered note to a frequency.
pub fn nearest_note(frequency: Frequency) -> NearestNote {
    let semitones = (12.0 * (frequency.hz() / REFERENCE_FREQUENCY).log2()).round();
    let pitch = transpose(PitchClass::A, REFERENCE_OCTAVE, semitones as i32);
    let target = pitch.frequency().unwrap_or(frequency);
    NearestNote {
        pitch,
        target,
        cents: cents_between(frequency, target),
    }
}

/// Frequencies of one pitch class across a range of octaves.
///
/// Octaves without a representable frequency are skipped.
pub fn octave_frequencies(note: Note, octaves: RangeInclusive<Octave>) -> Vec<Frequency> {
    octaves
        .filter_map(|octave| frequency_of(note, octave).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn a4_is_exactly_the_reference() {
        let a4 = frequency_of(PitchClass::A, 4).unwrap();
        assert_eq!(a4.hz(), 440.0);
    }

    #[test]
    fn raising_an_octave_doubles_the_frequency() {
        for note in PitchClass::ALL {
            for octave in -2..=9 {
                let low = frequency_of(note, octave).unwrap().hz();
                let high = frequency_of(note, octave + 1).unwrap().hz();
                assert_relative_eq!(high, 2.0 * low, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn known_frequencies() {
        assert_relative_eq!(frequency_of(PitchClass::C, 4).unwrap().hz(), 261.6256, epsilon = 1e-3);
        assert_relative_eq!(frequency_of(PitchClass::E, 2).unwrap().hz(), 82.4069, epsilon = 1e-3);
        assert_relative_eq!(frequency_of(PitchClass::ASharp, 4).unwrap().hz(), 466.1638, epsilon = 1e-3);
    }

    #[test]
    fn extreme_octaves_are_rejected_not_clamped() {
        assert_eq!(
            frequency_of(PitchClass::C, Octave::MAX),
            Err(NoteError::FrequencyOutOfRange { note: PitchClass::C, octave: Octave::MAX })
        );
        assert!(frequency_of(PitchClass::A, -5000).is_err());
        assert!(frequency_of(PitchClass::A, Octave::MIN).is_err());
    }

    #[test]
    fn transpose_by_zero_is_identity() {
        let pitch = transpose(PitchClass::G, 3, 0);
        assert_eq!(pitch, Pitch::new(PitchClass::G, 3));
        assert_eq!(pitch.frequency(), frequency_of(PitchClass::G, 3));
    }

    #[test]
    fn transpose_carries_octaves() {
        assert_eq!(transpose(PitchClass::B, 3, 1), Pitch::new(PitchClass::C, 4));
        assert_eq!(transpose(PitchClass::C, 4, -1), Pitch::new(PitchClass::B, 3));
        assert_eq!(transpose(PitchClass::E, 2, 24), Pitch::new(PitchClass::E, 4));
        assert_eq!(transpose(PitchClass::A, 4, -58), Pitch::new(PitchClass::B, -1));
    }

    #[test]
    fn transpose_round_trips() {
        for note in PitchClass::ALL {
            for octave in [-3, 0, 4, 8] {
                for k in -50..=50 {
                    let there = transpose(note, octave, k);
                    let back = transpose(there.note, there.octave, -k);
                    assert_eq!(back, Pitch::new(note, octave), "{note}{octave} by {k}");
                }
            }
        }
    }

    #[test]
    fn transpose_saturates_at_the_octave_bounds() {
        let top = transpose(PitchClass::A, Octave::MAX, 2);
        assert_eq!(top, Pitch::new(PitchClass::B, Octave::MAX));
        assert_eq!(transpose(top.note, top.octave, -2), Pitch::new(PitchClass::A, Octave::MAX));

        // Carrying past the last octave pins it; the way back starts from the pinned octave.
        let pinned = transpose(PitchClass::B, Octave::MAX, 1);
        assert_eq!(pinned, Pitch::new(PitchClass::C, Octave::MAX));
        assert_eq!(transpose(pinned.note, pinned.octave, -1), Pitch::new(PitchClass::B, Octave::MAX - 1));

        let bottom = transpose(PitchClass::C, Octave::MIN, -1);
        assert_eq!(bottom, Pitch::new(PitchClass::B, Octave::MIN));
    }

    #[test]
    fn transposing_twelve_semitones_doubles_frequency() {
        let up = transpose(PitchClass::D, 3, 12);
        let base = frequency_of(PitchClass::D, 3).unwrap().hz();
        assert_relative_eq!(up.frequency().unwrap().hz(), 2.0 * base, max_relative = 1e-12);
    }

    #[test]
    fn pitch_class_intervals_wrap() {
        assert_eq!(PitchClass::C.semitones_to(PitchClass::G), 7);
        assert_eq!(PitchClass::G.semitones_to(PitchClass::C), 5);
        assert_eq!(PitchClass::E.semitones_to(PitchClass::E), 0);
        assert_eq!(PitchClass::A.transposed(5), PitchClass::D);
        assert_eq!(PitchClass::C.transposed(-1), PitchClass::B);
    }

    #[test]
    fn parses_case_insensitively_with_accidentals() {
        assert_eq!("a".parse::<PitchClass>(), Ok(PitchClass::A));
        assert_eq!(" C# ".parse::<PitchClass>(), Ok(PitchClass::CSharp));
        assert_eq!("c♯".parse::<PitchClass>(), Ok(PitchClass::CSharp));
        assert_eq!("Bb".parse::<PitchClass>(), Ok(PitchClass::ASharp));
        assert_eq!("E♭".parse::<PitchClass>(), Ok(PitchClass::DSharp));
        assert!("H".parse::<PitchClass>().is_err());
    }

    #[test]
    fn parses_scientific_pitch_notation() {
        assert_eq!("A4".parse::<Pitch>(), Ok(Pitch::new(PitchClass::A, 4)));
        assert_eq!("gb2".parse::<Pitch>(), Ok(Pitch::new(PitchClass::FSharp, 2)));
        assert_eq!("E-1".parse::<Pitch>(), Ok(Pitch::new(PitchClass::E, -1)));
        assert!("A".parse::<Pitch>().is_err());
        assert!("X4".parse::<Pitch>().is_err());
        assert_eq!(Pitch::new(PitchClass::CSharp, 3).to_string(), "C#3");
    }

    #[test]
    fn frequency_rejects_non_positive_values() {
        assert!(Frequency::new(0.0).is_err());
        assert!(Frequency::new(-1.0).is_err());
        assert!(Frequency::new(f64::NAN).is_err());
        assert!(Frequency::new(f64::INFINITY).is_err());
        assert!(serde_json::from_str::<Frequency>("-3.0").is_err());
        assert_eq!(serde_json::from_str::<Frequency>("82.5").unwrap().hz(), 82.5);
    }

    #[test]
    fn nearest_note_reports_cents() {
        let nearest = nearest_note(Frequency::new(445.0).unwrap());
        assert_eq!(nearest.pitch, Pitch::new(PitchClass::A, 4));
        assert_abs_diff_eq!(nearest.cents, 19.56, epsilon = 0.01);
        assert!(nearest.matches(Pitch::new(PitchClass::A, 4), 25.0));
        assert!(!nearest.matches(Pitch::new(PitchClass::A, 4), 10.0));
        assert!(nearest.matches_class(PitchClass::A, 25.0));

        let low_e = nearest_note(Frequency::new(81.0).unwrap());
        assert_eq!(low_e.pitch, Pitch::new(PitchClass::E, 2));
        assert!(low_e.cents < 0.0);
    }

    #[test]
    fn octave_frequencies_covers_the_range() {
        let freqs = octave_frequencies(PitchClass::A, 3..=7);
        let hz: Vec<f64> = freqs.iter().map(|f| f.hz()).collect();
        assert_eq!(hz, vec![220.0, 440.0, 880.0, 1760.0, 3520.0]);
    }
}
