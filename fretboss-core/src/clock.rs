//! Tick sources for the capture session.
//!
//! A [`Clock`] hands out a channel that delivers one message per interval.
//! Tick channels hold at most one pending tick: a tick that arrives while the
//! previous one is still being processed is dropped, never queued.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Schedules a recurring tick. Dropping the receiver cancels the schedule.
pub trait Clock: Send + Sync {
    fn every(&self, interval: Duration) -> Receiver<Instant>;
}

/// Wall-clock ticks backed by [`crossbeam_channel::tick`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn every(&self, interval: Duration) -> Receiver<Instant> {
        crossbeam_channel::tick(interval)
    }
}

/// A clock that only ticks when told to. Intended for tests and offline runs.
#[derive(Debug, Default)]
pub struct ManualClock {
    schedules: Mutex<Vec<Sender<Instant>>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers one tick to every live schedule.
    ///
    /// Returns the number of schedules that accepted the tick. A schedule
    /// that still holds an unprocessed tick skips this one.
    pub fn fire(&self) -> usize {
        let now = Instant::now();
        let mut schedules = self.schedules.lock();
        let mut delivered = 0;
        schedules.retain(|tx| match tx.try_send(now) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => false,
        });
        delivered
    }
}

impl Clock for ManualClock {
    fn every(&self, _interval: Duration) -> Receiver<Instant> {
        let (tx, rx) = crossbeam_channel::bounded(1);
        self.schedules.lock().push(tx);
        rx
    }
}
