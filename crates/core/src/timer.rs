//! Frame timer feeding the per-pass time constants.

use std::time::{Duration, Instant};

/// Tracks total elapsed time and per-frame delta.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    delta: Duration,
    frames: u64,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            delta: Duration::ZERO,
            frames: 0,
        }
    }

    /// Total time since the timer was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.last_tick - self.start
    }

    /// Total time in seconds, sampled at the last tick.
    pub fn total_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Advance one frame. Returns the time since the previous tick.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        self.delta = now - self.last_tick;
        self.last_tick = now;
        self.frames += 1;
        self.delta
    }

    /// Delta of the last tick in seconds.
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    /// Number of ticks since the timer was created or last reset.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.delta = Duration::ZERO;
        self.frames = 0;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
