//! # Audio Capture Module
//!
//! The capture session reads audio through the [`AudioSource`] capability so
//! that the device, a synthetic generator or a test double can be plugged in
//! at `open()` time.
//!
//! ## Sources
//! - [`CpalSource`]: default input device through CPAL (Cross-Platform Audio Library)
//! - [`SineSource`]: phase-continuous sine generator for demos and tests

use anyhow::anyhow;
use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::DeviceUnavailable;
use crate::fft::TimeFrame;

/// Sample rate requested from the input device.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// Seconds of audio kept by the capture ring buffer.
const RING_SECONDS: usize = 2;

/// Proof of a bound audio source, returned by [`AudioSource::request_access`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceHandle {
    id: u64,
    sample_rate: u32,
}

impl SourceHandle {
    pub fn new(id: u64, sample_rate: u32) -> Self {
        Self { id, sample_rate }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Sample rate of the frames read through this handle.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Something the capture session can pull audio frames from.
///
/// Implementations are moved onto the session worker thread and used only
/// there.
pub trait AudioSource: Send {
    /// Binds the device. May block while permission or hardware is acquired.
    fn request_access(&mut self) -> Result<SourceHandle, DeviceUnavailable>;

    /// Returns the most recent `window_size` samples.
    fn read_frame(&mut self, handle: &SourceHandle, window_size: usize) -> TimeFrame;

    /// Releases the binding made by `request_access`.
    fn release(&mut self, handle: SourceHandle);
}

/// Fixed-capacity ring of mono samples.
#[derive(Debug)]
pub(crate) struct SampleRing {
    samples: Vec<f32>,
    write_pos: usize,
    filled: usize,
}

impl SampleRing {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity.max(1)],
            write_pos: 0,
            filled: 0,
        }
    }

    pub(crate) fn push_samples(&mut self, data: &[f32]) {
        let capacity = self.samples.len();
        for &sample in data {
            self.samples[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % capacity;
        }
        self.filled = (self.filled + data.len()).min(capacity);
    }

    /// Down-mixes interleaved frames to mono by averaging the channels.
    pub(crate) fn push_interleaved(&mut self, data: &[f32], channels: usize) {
        if channels <= 1 {
            self.push_samples(data);
            return;
        }
        let mono: Vec<f32> = data
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        self.push_samples(&mono);
    }

    /// The newest `count` samples, oldest first, zero-padded at the front
    /// while fewer than `count` have been captured.
    pub(crate) fn latest(&self, count: usize) -> Vec<f32> {
        let capacity = self.samples.len();
        let available = self.filled.min(count);
        let mut result = vec![0.0; count];
        let start = (self.write_pos + capacity - available) % capacity;
        let tail = count - available;
        for i in 0..available {
            result[tail + i] = self.samples[(start + i) % capacity];
        }
        result
    }
}

/// Captures from the default input device.
///
/// The CPAL stream lives on its own thread for as long as the source is bound,
/// and its callback writes into a ring buffer that [`AudioSource::read_frame`]
/// reads from.
pub struct CpalSource {
    target_sample_rate: u32,
    next_id: u64,
    active: Option<ActiveStream>,
}

struct ActiveStream {
    id: u64,
    ring: Arc<Mutex<SampleRing>>,
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl ActiveStream {
    fn stop(mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

type StreamReady = anyhow::Result<(u32, Arc<Mutex<SampleRing>>)>;

impl CpalSource {
    pub fn new(target_sample_rate: u32) -> Self {
        Self {
            target_sample_rate,
            next_id: 1,
            active: None,
        }
    }
}

impl Default for CpalSource {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl AudioSource for CpalSource {
    fn request_access(&mut self) -> Result<SourceHandle, DeviceUnavailable> {
        if let Some(previous) = self.active.take() {
            previous.stop();
        }

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<StreamReady>(1);
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let target = self.target_sample_rate;
        let thread = thread::Builder::new()
            .name("fretboss-input".to_string())
            .spawn(move || run_stream_thread(target, ready_tx, stop_rx))
            .map_err(|e| DeviceUnavailable::new(e.to_string()))?;

        let (sample_rate, ring) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(DeviceUnavailable::new(format!("{e:#}")));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(DeviceUnavailable::new("input stream thread exited during setup"));
            }
        };

        let id = self.next_id;
        self.next_id += 1;
        self.active = Some(ActiveStream {
            id,
            ring,
            stop_tx,
            thread: Some(thread),
        });
        Ok(SourceHandle::new(id, sample_rate))
    }

    fn read_frame(&mut self, handle: &SourceHandle, window_size: usize) -> TimeFrame {
        match &self.active {
            Some(active) if active.id == handle.id => TimeFrame::new(active.ring.lock().latest(window_size)),
            _ => {
                log::warn!("read from a released input stream, returning silence");
                TimeFrame::new(vec![0.0; window_size])
            }
        }
    }

    fn release(&mut self, handle: SourceHandle) {
        if self.active.as_ref().is_some_and(|active| active.id == handle.id) {
            if let Some(active) = self.active.take() {
                active.stop();
                log::info!("Released audio input device");
            }
        }
    }
}

impl Drop for CpalSource {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            active.stop();
        }
    }
}

/// Owns the CPAL stream until told to stop.
fn run_stream_thread(target_rate: u32, ready_tx: Sender<StreamReady>, stop_rx: Receiver<()>) {
    match start_audio_capture(target_rate) {
        Ok((stream, sample_rate, ring)) => {
            let _ = ready_tx.send(Ok((sample_rate, ring)));
            // Either an explicit stop or the source being dropped ends the stream.
            let _ = stop_rx.recv();
            drop(stream);
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

/// Starts audio capture from the default input device.
///
/// This function:
/// 1. Selects the default audio input device
/// 2. Picks an f32 configuration close to the target sample rate
/// 3. Sets up a callback that down-mixes into a ring buffer
///
/// # Returns
/// * `Ok((stream, sample_rate, ring))` - Running stream, its sample rate and the buffer it fills
/// * `Err(e)` - No device, no usable format, or the stream failed to start
fn start_audio_capture(
    target_rate: u32,
) -> anyhow::Result<(cpal::Stream, u32, Arc<Mutex<SampleRing>>)> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| anyhow!("No input device available"))?;

    log::info!("Using audio input device: {}", device.name()?);

    let configs = device.supported_input_configs()?.collect::<Vec<_>>();
    let supported_config = find_supported_config(configs, target_rate)
        .ok_or_else(|| anyhow!("No suitable f32 input format found"))?;

    let sample_rate = cpal::SampleRate(target_rate.clamp(
        supported_config.min_sample_rate().0,
        supported_config.max_sample_rate().0,
    ));
    let config = supported_config.with_sample_rate(sample_rate);

    let sample_rate_val = config.sample_rate().0;
    let channels = config.channels() as usize;
    let config: cpal::StreamConfig = config.into();

    log::info!("Selected sample rate: {} Hz, {} channel(s)", sample_rate_val, channels);

    let ring = Arc::new(Mutex::new(SampleRing::new(sample_rate_val as usize * RING_SECONDS)));
    let writer = ring.clone();

    let err_fn = |err| log::warn!("An error occurred on the audio stream: {}", err);

    let stream = device.build_input_stream(
        &config,
        move |data: &[f32], _: &cpal::InputCallbackInfo| {
            writer.lock().push_interleaved(data, channels);
        },
        err_fn,
        None,
    )?;

    stream.play()?;

    Ok((stream, sample_rate_val, ring))
}

/// Finds the best supported f32 configuration for the target sample rate.
///
/// Fewer channels win first (mono is ideal), then the range closest to the
/// target rate. A range that contains the target counts as an exact match.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32 && c.channels() > 0)
        .min_by_key(|c| {
            let min = c.min_sample_rate().0;
            let max = c.max_sample_rate().0;
            let distance = if (min..=max).contains(&target_rate) {
                0
            } else {
                min.abs_diff(target_rate).min(max.abs_diff(target_rate))
            };
            (c.channels(), distance)
        })
}

/// A synthetic source producing a pure sine wave.
#[derive(Debug, Clone)]
pub struct SineSource {
    frequency: f64,
    amplitude: f32,
    sample_rate: u32,
    phase: f64,
}

impl SineSource {
    pub fn new(frequency: f64, sample_rate: u32) -> Self {
        Self {
            frequency,
            amplitude: 0.5,
            sample_rate,
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }
}

impl AudioSource for SineSource {
    fn request_access(&mut self) -> Result<SourceHandle, DeviceUnavailable> {
        if self.sample_rate == 0 {
            return Err(DeviceUnavailable::new("sine source needs a non-zero sample rate"));
        }
        Ok(SourceHandle::new(0, self.sample_rate))
    }

    fn read_frame(&mut self, _handle: &SourceHandle, window_size: usize) -> TimeFrame {
        let step = std::f64::consts::TAU * self.frequency / self.sample_rate as f64;
        let samples = (0..window_size)
            .map(|_| {
                let sample = self.amplitude * self.phase.sin() as f32;
                self.phase = (self.phase + step) % std::f64::consts::TAU;
                sample
            })
            .collect();
        TimeFrame::new(samples)
    }

    fn release(&mut self, _handle: SourceHandle) {}
}
