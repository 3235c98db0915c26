use crossbeam_channel::{Receiver, Sender, unbounded};
use fretboss_core::error::DeviceUnavailable;
use fretboss_core::{
    AudioSource, CaptureSession, ErrorKind, ManualClock, PitchClass, SessionConfig, SessionError,
    SessionState, SineSource, SourceHandle, TimeFrame,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const SAMPLE_RATE: u32 = 44_100;

/// Counts what the session did with a source.
#[derive(Debug, Default)]
struct Probe {
    requests: AtomicUsize,
    reads: AtomicUsize,
    releases: AtomicUsize,
}

impl Probe {
    fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

/// A sine source that can hold `request_access` and `read_frame` until the
/// test hands out permits.
struct ScriptedSource {
    sine: SineSource,
    probe: Arc<Probe>,
    refuse: bool,
    access_gate: Option<Receiver<()>>,
    read_gate: Option<Receiver<()>>,
    entered: Option<Sender<()>>,
}

impl ScriptedSource {
    fn new(probe: Arc<Probe>) -> Self {
        Self {
            sine: SineSource::new(440.0, SAMPLE_RATE),
            probe,
            refuse: false,
            access_gate: None,
            read_gate: None,
            entered: None,
        }
    }

    fn refusing(mut self) -> Self {
        self.refuse = true;
        self
    }

    fn with_access_gate(mut self, gate: Receiver<()>, entered: Sender<()>) -> Self {
        self.access_gate = Some(gate);
        self.entered = Some(entered);
        self
    }

    fn with_read_gate(mut self, gate: Receiver<()>, entered: Sender<()>) -> Self {
        self.read_gate = Some(gate);
        self.entered = Some(entered);
        self
    }

    fn signal_entered(&self) {
        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
    }
}

impl AudioSource for ScriptedSource {
    fn request_access(&mut self) -> Result<SourceHandle, DeviceUnavailable> {
        self.probe.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.access_gate {
            self.signal_entered();
            let _ = gate.recv();
        }
        if self.refuse {
            return Err(DeviceUnavailable::new("permission denied"));
        }
        self.sine.request_access()
    }

    fn read_frame(&mut self, handle: &SourceHandle, window_size: usize) -> TimeFrame {
        if let Some(gate) = &self.read_gate {
            self.signal_entered();
            let _ = gate.recv();
        }
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        self.sine.read_frame(handle, window_size)
    }

    fn release(&mut self, handle: SourceHandle) {
        self.probe.releases.fetch_add(1, Ordering::SeqCst);
        self.sine.release(handle);
    }
}

fn new_session(clock: &Arc<ManualClock>) -> CaptureSession {
    CaptureSession::new(SessionConfig::default(), clock.clone()).unwrap()
}

fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn sine_at_440_is_detected_as_a4() {
    let clock = Arc::new(ManualClock::new());
    let session = new_session(&clock);
    session.open(Box::new(SineSource::new(440.0, SAMPLE_RATE))).unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert!(session.is_recording());

    assert_eq!(clock.fire(), 1);
    assert!(wait_for(|| session.latest().sequence == 1));

    let snapshot = session.latest();
    let top = snapshot.top().expect("a fundamental above threshold");
    let bin_width = SAMPLE_RATE as f64 / 2048.0;
    assert!((top.frequency.hz() - 440.0).abs() <= bin_width, "got {}", top.frequency);
    assert_eq!(session.latest_fundamentals().len(), 1);
    assert_eq!(session.latest_spectrum().len(), 1024);

    let nearest = snapshot.nearest.expect("nearest note");
    assert_eq!(nearest.pitch.note, PitchClass::A);
    assert_eq!(nearest.pitch.octave, 4);
}

#[test]
fn snapshots_advance_one_per_tick() {
    let clock = Arc::new(ManualClock::new());
    let session = new_session(&clock);
    session.open(Box::new(SineSource::new(196.0, SAMPLE_RATE))).unwrap();

    for expected in 1..=3 {
        clock.fire();
        assert!(wait_for(|| session.latest().sequence == expected));
    }
    let nearest = session.latest().nearest.unwrap();
    assert_eq!(nearest.pitch.to_string(), "G3");
}

#[test]
fn close_during_request_cancels_open() {
    let clock = Arc::new(ManualClock::new());
    let session = new_session(&clock);
    let probe = Arc::new(Probe::default());
    let (gate_tx, gate_rx) = unbounded();
    let (entered_tx, entered_rx) = unbounded();
    let source = ScriptedSource::new(probe.clone()).with_access_gate(gate_rx, entered_tx);

    let opener = {
        let session = session.clone();
        thread::spawn(move || session.open(Box::new(source)))
    };
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(session.state(), SessionState::Requesting);

    session.close();
    assert_eq!(session.state(), SessionState::Stopped);
    let result = opener.join().unwrap();
    assert!(matches!(result, Err(SessionError::Cancelled)), "{result:?}");

    // The acquisition completes after the close and is handed straight back.
    gate_tx.send(()).unwrap();
    assert!(wait_for(|| probe.releases() == 1));
    assert_eq!(clock.fire(), 0);
    assert_eq!(probe.reads(), 0);
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.latest().sequence, 0);
}

#[test]
fn invalid_transitions_are_rejected() {
    let clock = Arc::new(ManualClock::new());
    let session = new_session(&clock);
    session.open(Box::new(SineSource::new(440.0, SAMPLE_RATE))).unwrap();

    let err = session.open(Box::new(SineSource::new(440.0, SAMPLE_RATE))).unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidSessionState {
            operation: "open",
            state: SessionState::Active
        }
    ));
    assert_eq!(session.last_error(), Some(ErrorKind::InvalidSessionState));
    assert!(session.is_recording());

    session.close();
    session.close();
    assert_eq!(session.state(), SessionState::Stopped);

    let err = session.open(Box::new(SineSource::new(440.0, SAMPLE_RATE))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidSessionState);
    assert_eq!(session.state(), SessionState::Stopped);
}

#[test]
fn unavailable_device_returns_to_idle_and_can_retry() {
    let clock = Arc::new(ManualClock::new());
    let session = new_session(&clock);
    let probe = Arc::new(Probe::default());

    let err = session
        .open(Box::new(ScriptedSource::new(probe.clone()).refusing()))
        .unwrap_err();
    assert!(matches!(err, SessionError::DeviceUnavailable(_)));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.last_error(), Some(ErrorKind::DeviceUnavailable));
    assert_eq!(probe.releases(), 0);

    session.open(Box::new(ScriptedSource::new(probe.clone()))).unwrap();
    assert_eq!(session.state(), SessionState::Active);
    assert_eq!(session.last_error(), None);
    assert_eq!(probe.requests.load(Ordering::SeqCst), 2);
}

#[test]
fn close_releases_source_and_resets_snapshot() {
    let clock = Arc::new(ManualClock::new());
    let session = new_session(&clock);
    let probe = Arc::new(Probe::default());
    session.open(Box::new(ScriptedSource::new(probe.clone()))).unwrap();

    clock.fire();
    assert!(wait_for(|| session.latest().sequence == 1));
    assert!(!session.latest_spectrum().is_silent());

    session.close();
    assert_eq!(probe.releases(), 1);
    let snapshot = session.latest();
    assert_eq!(snapshot.sequence, 0);
    assert!(snapshot.spectrum.is_silent());
    assert!(snapshot.fundamentals.is_empty());
    assert!(snapshot.nearest.is_none());

    assert_eq!(clock.fire(), 0);
    assert_eq!(probe.reads(), 1);
}

#[test]
fn dropping_the_session_releases_the_source() {
    let clock = Arc::new(ManualClock::new());
    let probe = Arc::new(Probe::default());
    {
        let session = new_session(&clock);
        session.open(Box::new(ScriptedSource::new(probe.clone()))).unwrap();
        let clone = session.clone();
        drop(session);
        assert!(clone.is_recording());
    }
    assert_eq!(probe.releases(), 1);
}

#[test]
fn ticks_are_dropped_while_a_frame_is_in_flight() {
    let clock = Arc::new(ManualClock::new());
    let session = new_session(&clock);
    let probe = Arc::new(Probe::default());
    let (gate_tx, gate_rx) = unbounded();
    let (entered_tx, entered_rx) = unbounded();
    let source = ScriptedSource::new(probe.clone()).with_read_gate(gate_rx, entered_tx);
    session.open(Box::new(source)).unwrap();

    assert_eq!(clock.fire(), 1);
    entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // One tick may wait behind the frame in flight; the rest are skipped.
    assert_eq!(clock.fire(), 1);
    assert_eq!(clock.fire(), 0);
    assert_eq!(clock.fire(), 0);

    gate_tx.send(()).unwrap();
    gate_tx.send(()).unwrap();
    assert!(wait_for(|| session.latest().sequence == 2));
    assert_eq!(probe.reads(), 2);

    session.close();
    assert_eq!(probe.releases(), 1);
}
