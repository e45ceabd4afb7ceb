//! Frame scheduling.
//!
//! Hosts differ in how they obtain a repaint tick (vsync callback, timer,
//! event-loop wakeup). [`RenderDriver`] folds those into one shape: the
//! host calls [`poll`](RenderDriver::poll) whenever it wakes up, and gets
//! back `Some(dt)` only when a frame is actually due. The engine starts
//! and stops the driver; it never schedules frames itself.

/// Frame rate used when none is given.
pub const DEFAULT_TARGET_FPS: f64 = 60.0;

/// Timer jitter absorbed per poll. A host ticking at 16ms must not miss
/// every other frame of a 16.67ms interval.
const POLL_SLACK_MS: f64 = 1.5;

#[derive(Debug)]
pub struct RenderDriver {
    running: bool,
    target_fps: f64,
    last_frame_ms: Option<u64>,
    frames: u64,
}

impl Default for RenderDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderDriver {
    pub fn new() -> Self {
        Self::with_target_fps(DEFAULT_TARGET_FPS)
    }

    pub fn with_target_fps(target_fps: f64) -> Self {
        Self {
            running: false,
            target_fps: target_fps.max(1.0),
            frames: 0,
            last_frame_ms: None,
        }
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    /// Stop scheduling. The next [`start`](Self::start) begins a fresh
    /// cadence rather than trying to catch up on missed frames.
    pub fn stop(&mut self) {
        self.running = false;
        self.last_frame_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Total frames granted since construction.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Milliseconds between frames at the target rate.
    pub fn frame_interval_ms(&self) -> f64 {
        1000.0 / self.target_fps
    }

    /// Ask whether a frame is due at `now_ms`. Returns the elapsed time in
    /// seconds when one is, `None` when the host should go back to sleep.
    pub fn poll(&mut self, now_ms: u64) -> Option<f64> {
        if !self.running {
            return None;
        }
        let Some(last) = self.last_frame_ms else {
            self.last_frame_ms = Some(now_ms);
            self.frames += 1;
            return Some(1.0 / self.target_fps);
        };
        let elapsed = now_ms.saturating_sub(last) as f64;
        if elapsed < self.frame_interval_ms() - POLL_SLACK_MS {
            return None;
        }
        self.last_frame_ms = Some(now_ms);
        self.frames += 1;
        Some(elapsed / 1000.0)
    }
}
