//! Start/stop facade over [`CaptureSession`].
//!
//! A session cannot be reopened once stopped, so the recorder builds a fresh
//! session and a fresh source for every `start_recording()`.

use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

use crate::AnalysisSnapshot;
use crate::audio::AudioSource;
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{ConfigError, ErrorKind, SessionError};
use crate::fft::Spectrum;
use crate::pitch::FundamentalEstimate;
use crate::session::{CaptureSession, Pipeline, SessionState};

type SourceFactory = Box<dyn FnMut() -> Box<dyn AudioSource> + Send>;

pub struct Recorder {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    make_source: Mutex<SourceFactory>,
    session: Mutex<Option<CaptureSession>>,
    last_error: Mutex<Option<ErrorKind>>,
    bins: usize,
}

impl fmt::Debug for Recorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("config", &self.config)
            .field("recording", &self.is_recording())
            .finish()
    }
}

impl Recorder {
    /// Creates a stopped recorder. `make_source` is called once per start.
    pub fn new<F>(config: SessionConfig, clock: Arc<dyn Clock>, make_source: F) -> Result<Self, ConfigError>
    where
        F: FnMut() -> Box<dyn AudioSource> + Send + 'static,
    {
        let bins = Pipeline::new(&config)?.bins();
        Ok(Self {
            config,
            clock,
            make_source: Mutex::new(Box::new(make_source)),
            session: Mutex::new(None),
            last_error: Mutex::new(None),
            bins,
        })
    }

    /// Opens a new capture session. Blocks until the source is bound or refused.
    ///
    /// The session is visible to the other methods while it is acquiring, so
    /// `stop_recording()` from another thread cancels a pending start and this
    /// returns `SessionError::Cancelled`.
    pub fn start_recording(&self) -> Result<(), SessionError> {
        let (session, source) = {
            let mut slot = self.session.lock();
            // Only a Stopped session can be replaced; a failed start clears its own slot.
            if let Some(current) = slot.as_ref() {
                let state = current.state();
                if state != SessionState::Stopped {
                    let err = SessionError::InvalidSessionState {
                        operation: "start recording",
                        state,
                    };
                    *self.last_error.lock() = Some(err.kind());
                    return Err(err);
                }
            }
            if let Some(previous) = slot.take() {
                previous.close();
            }

            let session = CaptureSession::new(self.config.clone(), self.clock.clone())?;
            let source = {
                let mut make_source = self.make_source.lock();
                (&mut **make_source)()
            };
            *slot = Some(session.clone());
            (session, source)
        };

        let result = session.open(source);
        *self.last_error.lock() = result.as_ref().err().map(SessionError::kind);
        if result.is_err() {
            session.close();
            let mut slot = self.session.lock();
            if slot.as_ref().is_some_and(|current| current.same_session(&session)) {
                *slot = None;
            }
        }
        result
    }

    /// Closes the current session, if any. Cancels a start still acquiring its source.
    pub fn stop_recording(&self) {
        let session = self.session.lock().take();
        if let Some(session) = session {
            session.close();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.session.lock().as_ref().is_some_and(CaptureSession::is_recording)
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        *self.last_error.lock()
    }

    pub fn latest(&self) -> Arc<AnalysisSnapshot> {
        match self.session.lock().as_ref() {
            Some(session) => session.latest(),
            None => Arc::new(AnalysisSnapshot::empty(self.bins)),
        }
    }

    pub fn latest_spectrum(&self) -> Spectrum {
        self.latest().spectrum.clone()
    }

    pub fn latest_fundamentals(&self) -> Vec<FundamentalEstimate> {
        self.latest().fundamentals.clone()
    }

    /// The current session, including one still acquiring its source.
    pub fn session(&self) -> Option<CaptureSession> {
        self.session.lock().clone()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop_recording();
    }
}
