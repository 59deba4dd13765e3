//! Playback clocks
//!
//! A clock reports the audio subsystem's current time in seconds. It only
//! ever moves forward, and nothing here assumes it starts at zero.

use tokio::time::Instant;

/// Monotonically non-decreasing time source, in seconds
pub trait PlaybackClock: Send + Sync {
    fn now(&self) -> f64;
}

/// Clock backed by the tokio runtime's monotonic instant
///
/// Follows tokio's paused time in tests, so timers and clock reads agree.
#[derive(Debug, Clone)]
pub struct RuntimeClock {
    origin: Instant,
    base: f64,
}

impl RuntimeClock {
    pub fn new() -> Self {
        Self::with_offset(0.0)
    }

    /// Start the clock at `base` seconds instead of zero
    pub fn with_offset(base: f64) -> Self {
        RuntimeClock {
            origin: Instant::now(),
            base,
        }
    }
}

impl Default for RuntimeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock for RuntimeClock {
    fn now(&self) -> f64 {
        self.base + self.origin.elapsed().as_secs_f64()
    }
}
