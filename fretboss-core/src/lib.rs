// fretboss-core/src/lib.rs

//! The core logic for the FretBoss fretboard trainer.
//! This crate is responsible for audio capture, spectrum analysis,
//! fundamental frequency extraction, and the note and fretboard model
//! that consumers compare detected pitches against. It is completely
//! headless and contains no UI code.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod fft;
pub mod fretboard;
pub mod note;
pub mod pitch;
pub mod recorder;
pub mod session;

use serde::{Deserialize, Serialize};

pub use audio::{AudioSource, CpalSource, SineSource, SourceHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use error::{ErrorKind, SessionError};
pub use fft::{Spectrum, SpectrumAnalyzer, TimeFrame};
pub use fretboard::{GuitarPosition, NUM_FRETS, NUM_STRINGS, Tuning, note_at};
pub use note::{Frequency, NearestNote, Note, Octave, Pitch, PitchClass, frequency_of, transpose};
pub use pitch::{FundamentalEstimate, FundamentalExtractor};
pub use recorder::Recorder;
pub use session::{CaptureSession, SessionState};

/// The complete result of one analysis tick, published as a single value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisSnapshot {
    /// Tick counter within the session; 0 means nothing has been analyzed yet.
    pub sequence: u64,
    /// Normalized magnitude spectrum of the frame.
    pub spectrum: Spectrum,
    /// Detected fundamentals, strongest first.
    pub fundamentals: Vec<FundamentalEstimate>,
    /// The note closest to the strongest fundamental.
    pub nearest: Option<NearestNote>,
}

impl AnalysisSnapshot {
    /// The value published before the first tick and after a session closes.
    pub fn empty(bins: usize) -> Self {
        Self {
            sequence: 0,
            spectrum: Spectrum::silent(bins),
            fundamentals: Vec::new(),
            nearest: None,
        }
    }

    /// The strongest fundamental, if any peak cleared the threshold.
    pub fn top(&self) -> Option<&FundamentalEstimate> {
        self.fundamentals.first()
    }
}
