//! Capture session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::fft::Window;

/// Default analysis window, ~46ms at 44.1kHz.
pub const DEFAULT_WINDOW_SIZE: usize = 2048;

/// Default poll interval between analysis ticks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Settings fixed when a capture session is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Samples per analyzed frame; must be a power of two
    pub window_size: usize,

    /// Milliseconds between analysis ticks
    pub poll_interval_ms: u64,

    /// Number of fundamental estimates published per tick
    pub max_fundamentals: usize,

    /// Conditioning applied before the transform
    pub window: Window,

    /// Refine estimates with parabolic interpolation
    pub interpolate: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_fundamentals: 1,
            window: Window::Rectangular,
            interpolate: false,
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Checks the settings that cannot be fixed up at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_size < 2 || !self.window_size.is_power_of_two() {
            return Err(ConfigError::WindowSize(self.window_size));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::PollInterval);
        }
        if self.max_fundamentals == 0 {
            return Err(ConfigError::MaxFundamentals);
        }
        Ok(())
    }
}
