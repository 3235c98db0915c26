//! # Error Types
//!
//! Every failure the core can report to its callers. Silent frames and empty
//! spectra are not errors; they produce zeroed or empty results instead.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::note::{Octave, PitchClass};
use crate::session::SessionState;

/// The audio source could not be bound (permission denied or no device).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("audio device unavailable: {reason}")]
pub struct DeviceUnavailable {
    pub reason: String,
}

impl DeviceUnavailable {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Capture session lifecycle errors
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    DeviceUnavailable(#[from] DeviceUnavailable),

    /// An operation was called in a state that does not allow it.
    #[error("cannot {operation} while the session is {state}")]
    InvalidSessionState {
        operation: &'static str,
        state: SessionState,
    },

    /// The session was closed while the device was still being acquired.
    #[error("device acquisition was cancelled")]
    Cancelled,

    #[error("failed to start the capture worker: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Copyable summary of a [`SessionError`], kept as the session's observable
/// `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    DeviceUnavailable,
    InvalidSessionState,
    Cancelled,
    Spawn,
    Config,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::DeviceUnavailable(_) => ErrorKind::DeviceUnavailable,
            SessionError::InvalidSessionState { .. } => ErrorKind::InvalidSessionState,
            SessionError::Cancelled => ErrorKind::Cancelled,
            SessionError::Spawn(_) => ErrorKind::Spawn,
            SessionError::Config(_) => ErrorKind::Config,
        }
    }
}

/// Fretboard lookups outside the instrument geometry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FretboardError {
    #[error("string {string}, fret {fret} is not on the fretboard")]
    InvalidPosition { string: usize, fret: usize },
}

/// Note arithmetic and parsing errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NoteError {
    /// The octave is so extreme that its frequency is not a finite positive number.
    #[error("{note}{octave} has no representable frequency")]
    FrequencyOutOfRange { note: PitchClass, octave: Octave },

    #[error("invalid frequency: {0} Hz")]
    InvalidFrequency(f64),

    #[error("cannot parse {0:?} as a note")]
    Unparseable(String),
}

/// Configuration rejected at startup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("window size must be a power of two of at least 2, got {0}")]
    WindowSize(usize),

    #[error("poll interval must be non-zero")]
    PollInterval,

    #[error("at least one fundamental must be requested")]
    MaxFundamentals,
}

/// Per-frame analysis errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("frame has {actual} samples, analyzer expects {expected}")]
    FrameSize { expected: usize, actual: usize },
}
