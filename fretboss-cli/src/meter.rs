//! # Text Meters
//!
//! Terminal renderings of the tuning needle and the fretboard.

use fretboss_core::{GuitarPosition, NUM_FRETS, NUM_STRINGS, Tuning};

/// The meter shows deviations from -50 to +50 cents.
const METER_RANGE: f64 = 50.0;

/// Character cells across the meter, centre included.
const METER_WIDTH: usize = 41;

/// How close a reading is to the target note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accuracy {
    InTune,
    Close,
    Off,
}

impl Accuracy {
    pub fn from_cents(cents: f64) -> Self {
        if cents.abs() < 5.0 {
            Accuracy::InTune
        } else if cents.abs() < 20.0 {
            Accuracy::Close
        } else {
            Accuracy::Off
        }
    }

    fn needle(self) -> char {
        match self {
            Accuracy::InTune => '|',
            Accuracy::Close => '+',
            Accuracy::Off => '*',
        }
    }
}

/// Renders `[----|----]` with the needle at `cents`, or an empty bar.
pub fn cent_meter(cents: Option<f64>) -> String {
    let centre = METER_WIDTH / 2;
    let mut cells = vec!['-'; METER_WIDTH];
    cells[centre] = ':';
    if let Some(c) = cents {
        let clamped = c.clamp(-METER_RANGE, METER_RANGE);
        let pos = ((clamped + METER_RANGE) / (2.0 * METER_RANGE) * (METER_WIDTH - 1) as f64).round() as usize;
        cells[pos.min(METER_WIDTH - 1)] = Accuracy::from_cents(c).needle();
    }
    format!("[{}]", cells.into_iter().collect::<String>())
}

/// Draws the neck with the open string names on the left, highest string on
/// top, and `o` at every marked position.
pub fn fretboard_diagram(tuning: &Tuning, marked: &[GuitarPosition]) -> String {
    let mut out = String::new();
    for string in (0..NUM_STRINGS).rev() {
        let open = tuning.open_strings()[string];
        out.push_str(&format!("{:>4} ", open.to_string()));
        for fret in 0..=NUM_FRETS {
            let hit = marked.iter().any(|p| p.string == string && p.fret == fret);
            let cell = if hit { 'o' } else { '-' };
            if fret == 0 {
                out.push(cell);
                out.push('|');
            } else {
                out.push('-');
                out.push(cell);
                out.push('-');
                out.push('|');
            }
        }
        out.push('\n');
    }
    out.push_str("      ");
    for fret in 1..=NUM_FRETS {
        out.push_str(&format!("{:^4}", fret));
    }
    out.push('\n');
    out
}
