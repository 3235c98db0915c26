//! # Fretboard Module
//!
//! Maps guitar positions to pitches. String index 0 is the lowest-pitched
//! (thickest) string; fret 0 is the open string.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{FretboardError, NoteError};
use crate::note::{Note, Pitch, PitchClass, transpose};

/// Number of strings on the instrument.
pub const NUM_STRINGS: usize = 6;

/// Highest fret on the instrument. Fret indices run from 0 to `NUM_FRETS` inclusive.
pub const NUM_FRETS: usize = 22;

/// A (string, fret) pair on the fretboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GuitarPosition {
    pub string: usize,
    pub fret: usize,
}

impl GuitarPosition {
    /// Builds a position, rejecting anything outside the instrument geometry.
    pub fn new(string: usize, fret: usize) -> Result<Self, FretboardError> {
        let position = Self { string, fret };
        position.validate()?;
        Ok(position)
    }

    fn validate(self) -> Result<(), FretboardError> {
        if self.string < NUM_STRINGS && self.fret <= NUM_FRETS {
            Ok(())
        } else {
            Err(FretboardError::InvalidPosition {
                string: self.string,
                fret: self.fret,
            })
        }
    }
}

/// Open-string pitches, one per string, ordered by string index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuning([Pitch; NUM_STRINGS]);

impl Tuning {
    pub const fn new(open_strings: [Pitch; NUM_STRINGS]) -> Self {
        Self(open_strings)
    }

    /// Standard tuning, E2 A2 D3 G3 B3 E4.
    pub const fn standard() -> Self {
        Self([
            Pitch::new(PitchClass::E, 2),
            Pitch::new(PitchClass::A, 2),
            Pitch::new(PitchClass::D, 3),
            Pitch::new(PitchClass::G, 3),
            Pitch::new(PitchClass::B, 3),
            Pitch::new(PitchClass::E, 4),
        ])
    }

    pub fn open_strings(&self) -> &[Pitch; NUM_STRINGS] {
        &self.0
    }
}

impl Default for Tuning {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Display for Tuning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pitch) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{pitch}")?;
        }
        Ok(())
    }
}

impl FromStr for Tuning {
    type Err = NoteError;

    /// Parses a whitespace-separated list of exactly `NUM_STRINGS` pitches,
    /// lowest string first.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let pitches = s
            .split_whitespace()
            .map(str::parse::<Pitch>)
            .collect::<Result<Vec<_>, _>>()?;
        let open_strings: [Pitch; NUM_STRINGS] = pitches
            .try_into()
            .map_err(|_| NoteError::Unparseable(s.to_string()))?;
        Ok(Self(open_strings))
    }
}

/// Returns the pitch sounded at a fretboard position.
///
/// # Arguments
/// * `position` - String and fret
/// * `tuning` - Open-string pitches
///
/// # Returns
/// * `Ok(pitch)` - The open string transposed up by `fret` semitones
/// * `Err(FretboardError::InvalidPosition)` - String or fret outside the instrument
pub fn note_at(position: GuitarPosition, tuning: &Tuning) -> Result<Pitch, FretboardError> {
    position.validate()?;
    let open = tuning.0[position.string];
    // fret <= NUM_FRETS once validated
    Ok(transpose(open.note, open.octave, position.fret as i32))
}

/// Every position sounding exactly `pitch`, ordered by string then fret.
pub fn positions_of(pitch: Pitch, tuning: &Tuning) -> Vec<GuitarPosition> {
    all_positions()
        .filter(|&position| note_at(position, tuning) == Ok(pitch))
        .collect()
}

/// Every position sounding `note` in any octave, ordered by string then fret.
pub fn positions_of_class(note: Note, tuning: &Tuning) -> Vec<GuitarPosition> {
    all_positions()
        .filter(|&position| {
            note_at(position, tuning)
                .map(|pitch| pitch.note == note)
                .unwrap_or(false)
        })
        .collect()
}

fn all_positions() -> impl Iterator<Item = GuitarPosition> {
    (0..NUM_STRINGS)
        .flat_map(|string| (0..=NUM_FRETS).map(move |fret| GuitarPosition { string, fret }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(string: usize, fret: usize) -> GuitarPosition {
        GuitarPosition::new(string, fret).unwrap()
    }

    #[test]
    fn open_strings_match_the_tuning() {
        let tuning = Tuning::standard();
        for (string, open) in tuning.open_strings().iter().enumerate() {
            assert_eq!(note_at(pos(string, 0), &tuning), Ok(*open));
        }
    }

    #[test]
    fn frets_move_up_by_semitones() {
        let tuning = Tuning::standard();
        assert_eq!(note_at(pos(0, 5), &tuning), Ok(Pitch::new(PitchClass::A, 2)));
        assert_eq!(note_at(pos(1, 3), &tuning), Ok(Pitch::new(PitchClass::C, 3)));
        assert_eq!(note_at(pos(5, 12), &tuning), Ok(Pitch::new(PitchClass::E, 5)));
        assert_eq!(note_at(pos(4, 1), &tuning), Ok(Pitch::new(PitchClass::C, 4)));
        assert_eq!(note_at(pos(0, NUM_FRETS), &tuning), Ok(Pitch::new(PitchClass::D, 4)));
    }

    #[test]
    fn lookups_are_deterministic() {
        let tuning = Tuning::standard();
        let first = note_at(pos(3, 7), &tuning);
        for _ in 0..10 {
            assert_eq!(note_at(pos(3, 7), &tuning), first);
        }
    }

    #[test]
    fn out_of_range_positions_are_rejected() {
        let tuning = Tuning::standard();
        let bad_string = GuitarPosition { string: NUM_STRINGS, fret: 0 };
        let bad_fret = GuitarPosition { string: 0, fret: NUM_FRETS + 1 };
        assert_eq!(
            note_at(bad_string, &tuning),
            Err(FretboardError::InvalidPosition { string: NUM_STRINGS, fret: 0 })
        );
        assert!(note_at(bad_fret, &tuning).is_err());
        assert!(GuitarPosition::new(NUM_STRINGS, 0).is_err());
        assert!(GuitarPosition::new(0, NUM_FRETS + 1).is_err());
    }

    #[test]
    fn finds_every_position_of_a_pitch() {
        let tuning = Tuning::standard();
        let a2 = positions_of(Pitch::new(PitchClass::A, 2), &tuning);
        assert_eq!(a2, vec![pos(0, 5), pos(1, 0)]);

        let e4 = positions_of(Pitch::new(PitchClass::E, 4), &tuning);
        assert_eq!(e4, vec![pos(1, 19), pos(2, 14), pos(3, 9), pos(4, 5), pos(5, 0)]);
    }

    #[test]
    fn finds_every_position_of_a_pitch_class() {
        let tuning = Tuning::standard();
        let all_e = positions_of_class(PitchClass::E, &tuning);
        assert!(all_e.contains(&pos(0, 0)));
        assert!(all_e.contains(&pos(0, 12)));
        assert!(all_e.iter().all(|&p| note_at(p, &tuning).unwrap().note == PitchClass::E));
        assert!(all_e.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn parses_alternate_tunings() {
        let drop_d: Tuning = "D2 A2 D3 G3 B3 E4".parse().unwrap();
        assert_eq!(note_at(pos(0, 0), &drop_d), Ok(Pitch::new(PitchClass::D, 2)));
        assert_eq!(drop_d.to_string(), "D2 A2 D3 G3 B3 E4");
        assert!("E2 A2 D3".parse::<Tuning>().is_err());
    }
}
