//! Frame timing for animation and throughput reporting.

use std::time::{Duration, Instant};

/// Measures time since startup, per-frame delta and frame rate.
///
/// Frames are counted by [`FrameTimer::tick`]; [`FrameTimer::take_fps`]
/// returns an average once per reporting interval.
#[derive(Debug)]
pub struct FrameTimer {
    start: Instant,
    last_tick: Instant,
    frames: u64,
    window_start: Instant,
    window_frames: u32,
    report_interval: Duration,
}

impl FrameTimer {
    /// Create a timer reporting frame rate every second.
    pub fn new() -> Self {
        Self::with_report_interval(Duration::from_secs(1))
    }

    pub fn with_report_interval(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frames: 0,
            window_start: now,
            window_frames: 0,
            report_interval,
        }
    }

    /// Seconds since the timer was created.
    pub fn elapsed_secs(&self) -> f32 {
        self.start.elapsed().as_secs_f32()
    }

    /// Total number of ticks so far.
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Mark the end of a frame and return the delta since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frames += 1;
        self.window_frames += 1;
        delta
    }

    /// Average frames per second over the last interval, if it has elapsed.
    pub fn take_fps(&mut self) -> Option<f32> {
        let window = self.window_start.elapsed();
        if window < self.report_interval || self.window_frames == 0 {
            return None;
        }
        let fps = self.window_frames as f32 / window.as_secs_f32();
        self.window_start = Instant::now();
        self.window_frames = 0;
        Some(fps)
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
        assert_eq!(timer.frame_count(), 2);
    }

    #[test]
    fn test_take_fps_waits_for_interval() {
        let mut timer = FrameTimer::with_report_interval(Duration::from_secs(3600));
        timer.tick();
        assert!(timer.take_fps().is_none());
    }

    #[test]
    fn test_take_fps_resets_window() {
        let mut timer = FrameTimer::with_report_interval(Duration::ZERO);
        timer.tick();
        assert!(timer.take_fps().is_some());
        // No frames since the last report
        assert!(timer.take_fps().is_none());
    }
}
