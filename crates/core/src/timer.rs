//! Frame timing for the render loop.

use std::time::{Duration, Instant};

/// Measures per-frame deltas and keeps a running frame count.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    frames: u64,
    last_delta: Duration,
}

impl FrameTimer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
            last_delta: Duration::ZERO,
        }
    }

    /// Total time since the timer was created or reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Mark the end of a frame and return the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        self.last_delta = now - self.last_tick;
        self.last_tick = now;
        self.frames += 1;
        self.last_delta
    }

    /// Duration of the most recently completed frame.
    #[inline]
    pub fn last_delta(&self) -> Duration {
        self.last_delta
    }

    /// Number of frames ticked so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Average frames per second since the timer started.
    pub fn average_fps(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        self.frames as f64 / secs
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 3);
    }

    #[test]
    fn test_reset_clears_frames() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.reset();
        assert_eq!(timer.frame_count(), 0);
        assert_eq!(timer.last_delta(), Duration::ZERO);
    }
}
