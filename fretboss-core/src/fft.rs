//! # Fast Fourier Transform (FFT) Module
//!
//! Turns a time-domain sample frame into a max-normalized magnitude spectrum.
//!
//! ## Features
//! - Real-input FFT planned once per analyzer (RealFFT on top of RustFFT)
//! - Optional DC offset removal and Hann windowing
//! - Magnitudes for the lower half of the bins only (Nyquist symmetry)
//! - Normalization to a peak of 1.0, with silent frames left at zero

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{AnalysisError, ConfigError};

/// A fixed-length block of real-valued samples captured in one poll tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeFrame(Vec<f32>);

impl TimeFrame {
    pub fn new(samples: Vec<f32>) -> Self {
        Self(samples)
    }

    pub fn samples(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for TimeFrame {
    fn from(samples: Vec<f32>) -> Self {
        Self(samples)
    }
}

/// Normalized magnitude spectrum, one value per bin up to the Nyquist frequency.
///
/// The largest bin is 1.0 unless the frame was silent, in which case every
/// bin is 0.0.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Spectrum(Vec<f32>);

impl Spectrum {
    /// An all-zero spectrum with `bins` bins.
    pub fn silent(bins: usize) -> Self {
        Self(vec![0.0; bins])
    }

    pub fn magnitudes(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.0.iter().all(|&m| m == 0.0)
    }

    /// Centre frequency of `bin`: `bin * sample_rate / (2 * len)`.
    pub fn bin_frequency(&self, bin: usize, sample_rate: u32) -> f64 {
        bin as f64 * self.bin_width(sample_rate)
    }

    /// Width of one bin in Hz.
    pub fn bin_width(&self, sample_rate: u32) -> f64 {
        sample_rate as f64 / (2 * self.0.len().max(1)) as f64
    }

    /// Index of the strongest bin, lowest index on ties. `None` when silent.
    pub fn peak_bin(&self) -> Option<usize> {
        let mut best: Option<(usize, f32)> = None;
        for (bin, &magnitude) in self.0.iter().enumerate() {
            if magnitude > best.map_or(0.0, |(_, m)| m) {
                best = Some((bin, magnitude));
            }
        }
        best.map(|(bin, _)| bin)
    }
}

/// Conditioning applied to a frame before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Window {
    /// The frame is transformed as captured.
    #[default]
    Rectangular,
    /// DC offset removal followed by a Hann taper, to reduce spectral leakage.
    Hann,
}

/// Converts time-domain frames into normalized magnitude spectra.
///
/// The transform is planned once for the configured window size; each call to
/// [`SpectrumAnalyzer::analyze`] works on freshly allocated buffers and keeps
/// no state between frames.
pub struct SpectrumAnalyzer {
    window_size: usize,
    window: Window,
    fft: Arc<dyn RealToComplex<f32>>,
}

impl fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectrumAnalyzer")
            .field("window_size", &self.window_size)
            .field("window", &self.window)
            .finish()
    }
}

impl SpectrumAnalyzer {
    /// Plans a real-input FFT for `window_size` samples.
    ///
    /// # Arguments
    /// * `window_size` - Samples per frame; must be a power of two of at least 2
    ///
    /// # Returns
    /// * `Ok(analyzer)` - Ready to analyze frames of exactly `window_size` samples
    /// * `Err(ConfigError::WindowSize)` - The window size cannot use the fast transform
    pub fn new(window_size: usize) -> Result<Self, ConfigError> {
        if window_size < 2 || !window_size.is_power_of_two() {
            return Err(ConfigError::WindowSize(window_size));
        }
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);
        Ok(Self {
            window_size,
            window: Window::Rectangular,
            fft,
        })
    }

    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Number of bins in every spectrum this analyzer produces.
    pub fn bins(&self) -> usize {
        self.window_size / 2
    }

    /// Performs a forward FFT on a frame and returns its normalized magnitudes.
    ///
    /// This processes the frame through the following steps:
    /// 1. Optional DC offset removal and Hann windowing
    /// 2. Forward real FFT
    /// 3. Magnitudes of the first `window_size / 2` bins
    /// 4. Division by the largest magnitude, unless the frame was silent
    ///
    /// # Returns
    /// * `Ok(spectrum)` - Normalized spectrum, all zeros for a silent frame
    /// * `Err(AnalysisError::FrameSize)` - The frame length differs from the window size
    pub fn analyze(&self, frame: &TimeFrame) -> Result<Spectrum, AnalysisError> {
        let size_mismatch = || AnalysisError::FrameSize {
            expected: self.window_size,
            actual: frame.len(),
        };
        if frame.len() != self.window_size {
            return Err(size_mismatch());
        }

        let mut input = frame.samples().to_vec();
        if self.window == Window::Hann {
            remove_dc_offset(&mut input);
            apply_hann_window(&mut input);
        }

        let mut output = self.fft.make_output_vec();
        self.fft
            .process(&mut input, &mut output)
            .map_err(|_| size_mismatch())?;

        Ok(normalize(spectrum_to_magnitudes(&output, self.bins())))
    }
}

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to the buffer, tapering it to zero at the edges.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// Magnitudes of the lower `bins` bins. Non-finite magnitudes count as silence.
fn spectrum_to_magnitudes(spectrum: &[Complex<f32>], bins: usize) -> Vec<f32> {
    spectrum
        .iter()
        .take(bins)
        .map(|c| {
            let magnitude = c.norm(); // sqrt(re^2 + im^2)
            if magnitude.is_finite() { magnitude } else { 0.0 }
        })
        .collect()
}

fn normalize(mut magnitudes: Vec<f32>) -> Spectrum {
    let max = magnitudes.iter().copied().fold(0.0_f32, f32::max);
    // max == 0 means every bin is already zero
    if max > 0.0 {
        for magnitude in magnitudes.iter_mut() {
            *magnitude /= max;
        }
    }
    Spectrum(magnitudes)
}
