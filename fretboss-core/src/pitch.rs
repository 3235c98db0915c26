//! # Pitch Detection Module
//!
//! Reduces a normalized spectrum to its dominant frequency peaks.
//!
//! This is a plain peak-pick over spectrum bins. It does not look at
//! harmonic structure, so on low strings where an overtone is louder than the
//! fundamental the overtone is what gets reported.
//!
//! ## Features
//! - Local-maximum peak picking above a fixed detection threshold
//! - Deterministic ranking (magnitude, then lowest frequency)
//! - Optional parabolic interpolation for sub-bin accuracy

use serde::{Deserialize, Serialize};

use crate::fft::Spectrum;
use crate::note::Frequency;

/// Normalized magnitude a peak must exceed to count as a fundamental.
pub const DETECTION_THRESHOLD: f32 = 0.5;

/// One detected frequency peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundamentalEstimate {
    pub frequency: Frequency,
    /// Normalized peak magnitude (0.0 to 1.0), used as the confidence score
    pub magnitude: f32,
    /// Spectrum bin the peak was found in
    pub bin: usize,
}

/// Picks the strongest peaks out of a spectrum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FundamentalExtractor {
    max_peaks: usize,
    interpolate: bool,
}

impl Default for FundamentalExtractor {
    fn default() -> Self {
        Self {
            max_peaks: 1,
            interpolate: false,
        }
    }
}

impl FundamentalExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of estimates to return per spectrum.
    pub fn with_max_peaks(mut self, max_peaks: usize) -> Self {
        self.max_peaks = max_peaks;
        self
    }

    /// Refine each peak with parabolic interpolation instead of reporting the bin centre.
    pub fn with_interpolation(mut self, interpolate: bool) -> Self {
        self.interpolate = interpolate;
        self
    }

    pub fn max_peaks(&self) -> usize {
        self.max_peaks
    }

    /// Finds the dominant frequencies in a spectrum.
    ///
    /// A bin qualifies when it is a local maximum (strictly above its left
    /// neighbour, not below its right one) and its magnitude exceeds
    /// [`DETECTION_THRESHOLD`]. Bin 0 is never reported since it is 0 Hz.
    ///
    /// # Arguments
    /// * `spectrum` - Normalized magnitude spectrum
    /// * `sample_rate` - Sample rate of the analyzed frame in Hz
    ///
    /// # Returns
    /// * Up to `max_peaks` estimates, strongest first; empty for a silent spectrum
    pub fn extract(&self, spectrum: &Spectrum, sample_rate: u32) -> Vec<FundamentalEstimate> {
        let bins = spectrum.magnitudes();

        let mut peaks: Vec<(usize, f32)> = (1..bins.len())
            .filter(|&bin| is_local_max(bins, bin) && bins[bin] > DETECTION_THRESHOLD)
            .map(|bin| (bin, bins[bin]))
            .collect();

        // Stable sort keeps ascending bin order among equal magnitudes.
        peaks.sort_by(|a, b| b.1.total_cmp(&a.1));

        peaks
            .into_iter()
            .take(self.max_peaks)
            .filter_map(|(bin, magnitude)| {
                let centre = spectrum.bin_frequency(bin, sample_rate);
                let hz = if self.interpolate {
                    refine_from_spectrum(bins, bin, sample_rate).unwrap_or(centre)
                } else {
                    centre
                };
                let frequency = Frequency::new(hz).ok()?;
                Some(FundamentalEstimate {
                    frequency,
                    magnitude,
                    bin,
                })
            })
            .collect()
    }
}

fn is_local_max(bins: &[f32], bin: usize) -> bool {
    let magnitude = bins[bin];
    let right = bins.get(bin + 1).copied().unwrap_or(0.0);
    magnitude > bins[bin - 1] && magnitude >= right
}

/// Refines a peak position using the neighbouring bins.
///
/// Fits a parabola through the log-magnitudes of the peak and its two
/// neighbours and returns the frequency at the vertex.
///
/// # Returns
/// * `Some(refined_freq)` - Interpolated frequency in Hz
/// * `None` - The peak sits on the spectrum edge or a neighbour is zero
fn refine_from_spectrum(spectrum_magnitudes: &[f32], peak_bin: usize, sample_rate: u32) -> Option<f64> {
    if peak_bin == 0 || peak_bin + 1 >= spectrum_magnitudes.len() {
        return None;
    }

    let y1 = (spectrum_magnitudes[peak_bin - 1] as f64).ln();
    let y2 = (spectrum_magnitudes[peak_bin] as f64).ln();
    let y3 = (spectrum_magnitudes[peak_bin + 1] as f64).ln();

    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return None;
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-9 {
        return None;
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let interpolated_bin = peak_bin as f64 + peak_shift;
    let buffer_size = (spectrum_magnitudes.len() * 2) as f64;
    let final_freq = interpolated_bin * sample_rate as f64 / buffer_size;

    (final_freq.is_finite() && final_freq > 0.0).then_some(final_freq)
}
