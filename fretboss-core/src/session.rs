//! # Capture Session
//!
//! Binds an [`AudioSource`] to a tick schedule and runs every frame through
//! the spectrum analyzer and fundamental extractor.
//!
//! ## Lifecycle
//! `Idle -> Requesting -> Active -> Stopped`
//!
//! - `open()` moves Idle to Requesting and spawns the session worker, which
//!   acquires the source and moves the session to Active. A failed acquisition
//!   puts the session back to Idle so `open()` can be retried.
//! - `close()` moves any state to Stopped. Stopped is terminal.
//!
//! ## Architecture
//! - **Worker thread**: owns the source; acquires it, then processes one frame
//!   per tick until cancelled
//! - **Cancellation**: a channel sender held by the session; `close()` drops it
//!   and every `select!` on the paired receiver wakes
//! - **Publishing**: each tick replaces the shared snapshot `Arc` in one write

use crossbeam_channel::{Receiver, Sender, select};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::AnalysisSnapshot;
use crate::audio::{AudioSource, SourceHandle};
use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::{AnalysisError, ConfigError, DeviceUnavailable, ErrorKind, SessionError};
use crate::fft::{Spectrum, SpectrumAnalyzer, TimeFrame};
use crate::note::nearest_note;
use crate::pitch::{FundamentalEstimate, FundamentalExtractor};

/// Where a capture session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// No device bound
    Idle,
    /// Device acquisition in flight
    Requesting,
    /// Ticks are being processed
    Active,
    /// Closed; a new session is needed to capture again
    Stopped,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Requesting => "requesting",
            SessionState::Active => "active",
            SessionState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Frame analysis: spectrum, then fundamentals, then the nearest note.
#[derive(Debug)]
pub struct Pipeline {
    analyzer: SpectrumAnalyzer,
    extractor: FundamentalExtractor,
}

impl Pipeline {
    pub fn new(config: &SessionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let analyzer = SpectrumAnalyzer::new(config.window_size)?.with_window(config.window);
        let extractor = FundamentalExtractor::new()
            .with_max_peaks(config.max_fundamentals)
            .with_interpolation(config.interpolate);
        Ok(Self {
            analyzer,
            extractor,
        })
    }

    pub fn window_size(&self) -> usize {
        self.analyzer.window_size()
    }

    pub fn bins(&self) -> usize {
        self.analyzer.bins()
    }

    /// Analyzes one frame into a complete snapshot.
    pub fn process(
        &self,
        frame: &TimeFrame,
        sample_rate: u32,
        sequence: u64,
    ) -> Result<AnalysisSnapshot, AnalysisError> {
        let spectrum = self.analyzer.analyze(frame)?;
        let fundamentals = self.extractor.extract(&spectrum, sample_rate);
        let nearest = fundamentals.first().map(|top| nearest_note(top.frequency));
        Ok(AnalysisSnapshot {
            sequence,
            spectrum,
            fundamentals,
            nearest,
        })
    }
}

#[derive(Debug)]
struct Lifecycle {
    state: SessionState,
    last_error: Option<ErrorKind>,
}

/// State shared between the session handle and its worker.
#[derive(Debug)]
struct Shared {
    lifecycle: Mutex<Lifecycle>,
    latest: RwLock<Arc<AnalysisSnapshot>>,
}

#[derive(Debug, Default)]
struct Control {
    /// Dropping this sender cancels the worker.
    cancel_tx: Option<Sender<()>>,
    worker: Option<JoinHandle<()>>,
}

struct Inner {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    pipeline: Arc<Pipeline>,
    shared: Arc<Shared>,
    // Lock order: control, then shared.lifecycle.
    control: Mutex<Control>,
}

/// A single capture session. Clones share the same session.
///
/// Dropping the last clone closes the session.
#[derive(Clone)]
pub struct CaptureSession {
    inner: Arc<Inner>,
}

impl fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl CaptureSession {
    /// Creates an Idle session.
    ///
    /// # Returns
    /// * `Ok(session)` - Ready to `open()`
    /// * `Err(ConfigError)` - The configuration cannot be analyzed (e.g. window size not a power of two)
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let pipeline = Pipeline::new(&config)?;
        let empty = AnalysisSnapshot::empty(pipeline.bins());
        let shared = Shared {
            lifecycle: Mutex::new(Lifecycle {
                state: SessionState::Idle,
                last_error: None,
            }),
            latest: RwLock::new(Arc::new(empty)),
        };
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                clock,
                pipeline: Arc::new(pipeline),
                shared: Arc::new(shared),
                control: Mutex::new(Control::default()),
            }),
        })
    }

    /// Acquires `source` and starts ticking.
    ///
    /// Blocks until the source is bound, acquisition fails, or another
    /// thread closes the session.
    ///
    /// # Returns
    /// * `Ok(())` - The session is Active
    /// * `Err(SessionError::DeviceUnavailable)` - The source refused; the session is Idle again
    /// * `Err(SessionError::Cancelled)` - `close()` was called during acquisition
    /// * `Err(SessionError::InvalidSessionState)` - The session was not Idle
    pub fn open(&self, source: Box<dyn AudioSource>) -> Result<(), SessionError> {
        let inner = &self.inner;
        let (ready_rx, cancel_rx) = {
            let mut control = inner.control.lock();
            {
                let mut lifecycle = inner.shared.lifecycle.lock();
                if lifecycle.state != SessionState::Idle {
                    let err = SessionError::InvalidSessionState {
                        operation: "open",
                        state: lifecycle.state,
                    };
                    lifecycle.last_error = Some(err.kind());
                    return Err(err);
                }
                lifecycle.state = SessionState::Requesting;
                lifecycle.last_error = None;
            }
            log::info!("Capture session requesting audio source");

            let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
            let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
            let worker = Worker {
                shared: inner.shared.clone(),
                pipeline: inner.pipeline.clone(),
                clock: inner.clock.clone(),
                interval: inner.config.poll_interval(),
                cancel_rx: cancel_rx.clone(),
                ready_tx,
            };
            let spawned = thread::Builder::new()
                .name("fretboss-capture".to_string())
                .spawn(move || worker.run(source));

            match spawned {
                Ok(handle) => {
                    control.cancel_tx = Some(cancel_tx);
                    control.worker = Some(handle);
                }
                Err(e) => {
                    let mut lifecycle = inner.shared.lifecycle.lock();
                    lifecycle.state = SessionState::Idle;
                    lifecycle.last_error = Some(ErrorKind::Spawn);
                    return Err(SessionError::Spawn(e));
                }
            }
            (ready_rx, cancel_rx)
        };

        select! {
            recv(ready_rx) -> msg => match msg {
                Ok(Ok(())) => Ok(()),
                Ok(Err(unavailable)) => {
                    inner.acquisition_failed();
                    Err(unavailable.into())
                }
                // The worker ended without reporting, which only happens once
                // the session has been closed.
                Err(_) => Err(SessionError::Cancelled),
            },
            recv(cancel_rx) -> _ => Err(SessionError::Cancelled),
        }
    }

    /// Stops the session and releases the source. No-op once Stopped.
    ///
    /// During Requesting the pending acquisition is abandoned: the worker
    /// releases whatever it acquires and never ticks.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn state(&self) -> SessionState {
        self.inner.shared.lifecycle.lock().state
    }

    pub fn is_recording(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn last_error(&self) -> Option<ErrorKind> {
        self.inner.shared.lifecycle.lock().last_error
    }

    /// The most recently published snapshot.
    pub fn latest(&self) -> Arc<AnalysisSnapshot> {
        self.inner.shared.latest.read().clone()
    }

    pub fn latest_spectrum(&self) -> Spectrum {
        self.latest().spectrum.clone()
    }

    pub fn latest_fundamentals(&self) -> Vec<FundamentalEstimate> {
        self.latest().fundamentals.clone()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Whether both handles refer to the same session.
    pub fn same_session(&self, other: &CaptureSession) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Inner {
    /// Returns a Requesting session to Idle after the source refused.
    fn acquisition_failed(&self) {
        let worker = {
            let mut control = self.control.lock();
            let mut lifecycle = self.shared.lifecycle.lock();
            if lifecycle.state != SessionState::Requesting {
                return;
            }
            lifecycle.state = SessionState::Idle;
            lifecycle.last_error = Some(ErrorKind::DeviceUnavailable);
            control.cancel_tx = None;
            control.worker.take()
        };
        if let Some(worker) = worker {
            let _ = worker.join();
        }
    }

    fn close(&self) {
        let (previous, worker) = {
            let mut control = self.control.lock();
            let mut lifecycle = self.shared.lifecycle.lock();
            let previous = lifecycle.state;
            if previous == SessionState::Stopped {
                return;
            }
            lifecycle.state = SessionState::Stopped;
            control.cancel_tx = None;
            (previous, control.worker.take())
        };

        match (previous, worker) {
            (SessionState::Active, Some(worker)) => {
                if worker.join().is_err() {
                    log::warn!("Capture worker panicked");
                }
            }
            (SessionState::Requesting, Some(_detached)) => {
                log::info!("Abandoning pending audio source acquisition");
            }
            _ => {}
        }

        // After the join so a tick in flight cannot overwrite the reset.
        *self.shared.latest.write() = Arc::new(AnalysisSnapshot::empty(self.pipeline.bins()));
        log::info!("Capture session stopped (was {})", previous);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Everything the worker thread needs, moved onto it at `open()`.
struct Worker {
    shared: Arc<Shared>,
    pipeline: Arc<Pipeline>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    cancel_rx: Receiver<()>,
    ready_tx: Sender<Result<(), DeviceUnavailable>>,
}

impl Worker {
    fn run(self, mut source: Box<dyn AudioSource>) {
        let handle = match source.request_access() {
            Ok(handle) => handle,
            Err(unavailable) => {
                log::warn!("Audio source unavailable: {}", unavailable);
                let _ = self.ready_tx.send(Err(unavailable));
                return;
            }
        };

        if !self.activate() {
            log::info!("Session closed during acquisition, releasing source");
            source.release(handle);
            return;
        }

        // Scheduled before reporting ready so no tick fired after open() returns is lost.
        let ticks = self.clock.every(self.interval);
        let _ = self.ready_tx.send(Ok(()));
        log::info!(
            "Capture session active: {} Hz, {} samples every {:?}",
            handle.sample_rate(),
            self.pipeline.window_size(),
            self.interval
        );

        let mut sequence = 0;
        loop {
            select! {
                recv(self.cancel_rx) -> _ => break,
                recv(ticks) -> tick => {
                    if tick.is_err() {
                        log::warn!("Tick schedule ended, stopping capture");
                        break;
                    }
                    sequence += 1;
                    if let Err(e) = self.tick(source.as_mut(), &handle, sequence) {
                        log::debug!("Capture worker stopping: {}", e);
                        break;
                    }
                }
            }
        }

        drop(ticks);
        source.release(handle);
        log::info!("Capture worker finished after {} ticks", sequence);
    }

    fn activate(&self) -> bool {
        let mut lifecycle = self.shared.lifecycle.lock();
        if lifecycle.state == SessionState::Requesting {
            lifecycle.state = SessionState::Active;
            true
        } else {
            false
        }
    }

    /// Capture, analyze, extract, publish.
    fn tick(
        &self,
        source: &mut dyn AudioSource,
        handle: &SourceHandle,
        sequence: u64,
    ) -> Result<(), SessionError> {
        let state = self.shared.lifecycle.lock().state;
        if state != SessionState::Active {
            return Err(SessionError::InvalidSessionState {
                operation: "tick",
                state,
            });
        }

        let frame = source.read_frame(handle, self.pipeline.window_size());
        match self.pipeline.process(&frame, handle.sample_rate(), sequence) {
            Ok(snapshot) => {
                if let Some(top) = snapshot.top() {
                    log::debug!("Tick {}: {} (magnitude {:.2})", sequence, top.frequency, top.magnitude);
                }
                *self.shared.latest.write() = Arc::new(snapshot);
            }
            Err(e) => log::warn!("Dropping frame on tick {}: {}", sequence, e),
        }
        Ok(())
    }
}
