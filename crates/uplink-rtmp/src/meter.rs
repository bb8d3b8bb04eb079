//! Outbound bitrate measurement.

use std::time::{Duration, Instant};

/// Measures outbound bitrate over fixed windows.
///
/// Bytes are recorded as they are written. Once a window has elapsed,
/// `sample` converts it into bits per second and starts the next one.
#[derive(Debug)]
pub struct BitrateMeter {
    window: Duration,
    window_start: Instant,
    bytes: u64,
}

impl BitrateMeter {
    /// Creates a meter with the given window width.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            window_start: Instant::now(),
            bytes: 0,
        }
    }

    /// Records bytes written during the current window.
    pub fn record(&mut self, bytes: usize) {
        self.bytes += bytes as u64;
    }

    /// Returns true once the current window is complete.
    pub fn due(&self, now: Instant) -> bool {
        now.duration_since(self.window_start) >= self.window
    }

    /// Closes the current window, returning its bits per second.
    pub fn sample(&mut self, now: Instant) -> u64 {
        let elapsed_ms = now.duration_since(self.window_start).as_millis() as u64;
        let bits = self.bytes * 8;
        let bps = if elapsed_ms == 0 {
            0
        } else {
            bits * 1000 / elapsed_ms
        };

        self.bytes = 0;
        self.window_start = now;
        bps
    }
}
