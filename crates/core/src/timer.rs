//! Frame clock driving animation.

use std::time::{Duration, Instant};

/// Upper bound on a single frame step. A stall (window drag, debugger
/// break) advances animation by at most this much.
pub const MAX_FRAME_STEP: Duration = Duration::from_millis(250);

/// Accumulates animation time one frame at a time.
#[derive(Debug)]
pub struct FrameClock {
    last_frame: Instant,
    animation_secs: f32,
    frames: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self {
            last_frame: Instant::now(),
            animation_secs: 0.0,
            frames: 0,
        }
    }

    /// Advances the clock to now and returns the clamped step in seconds.
    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let step = self.advance(now.saturating_duration_since(self.last_frame));
        self.last_frame = now;
        step
    }

    /// Animation time accumulated over all ticks.
    #[inline]
    pub fn animation_secs(&self) -> f32 {
        self.animation_secs
    }

    #[inline]
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn advance(&mut self, elapsed: Duration) -> f32 {
        let step = elapsed.min(MAX_FRAME_STEP).as_secs_f32();
        self.animation_secs += step;
        self.frames += 1;
        step
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
