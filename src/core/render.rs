//! Render scheduling
//!
//! Coalesces any number of state changes into a single refresh per frame.

use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RenderScheduler {
    pending: bool,
    frame_interval: Duration,
    last_frame: Option<Instant>,
}

impl RenderScheduler {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            pending: false,
            frame_interval,
            last_frame: None,
        }
    }

    /// Mark the display stale. Repeated requests before a frame collapse into one.
    pub fn request(&mut self) {
        self.pending = true;
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Consume the pending flag on a frame tick
    pub fn take(&mut self) -> bool {
        std::mem::replace(&mut self.pending, false)
    }

    /// Whether a frame tick is due at `now`
    pub fn frame_due(&self, now: Instant) -> bool {
        match self.last_frame {
            Some(last) => now.duration_since(last) >= self.frame_interval,
            None => true,
        }
    }

    /// Take the pending flag if a frame is due, recording the frame time
    pub fn poll(&mut self, now: Instant) -> bool {
        if !self.pending || !self.frame_due(now) {
            return false;
        }
        self.last_frame = Some(now);
        self.take()
    }

    /// Time until the next frame may be drawn
    pub fn time_until_frame(&self, now: Instant) -> Duration {
        match self.last_frame {
            Some(last) => self.frame_interval.saturating_sub(now.duration_since(last)),
            None => Duration::ZERO,
        }
    }
}

impl Default for RenderScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requests_coalesce() {
        let mut scheduler = RenderScheduler::default();
        scheduler.request();
        scheduler.request();
        scheduler.request();

        assert!(scheduler.take());
        assert!(!scheduler.take());
    }

    #[test]
    fn test_poll_respects_frame_interval() {
        let mut scheduler = RenderScheduler::new(Duration::from_millis(16));
        let start = Instant::now();

        scheduler.request();
        assert!(scheduler.poll(start));

        scheduler.request();
        assert!(!scheduler.poll(start + Duration::from_millis(5)));
        assert!(scheduler.is_pending());
        assert_eq!(
            scheduler.time_until_frame(start + Duration::from_millis(5)),
            Duration::from_millis(11)
        );

        assert!(scheduler.poll(start + Duration::from_millis(16)));
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn test_nothing_pending_means_no_frame() {
        let mut scheduler = RenderScheduler::default();
        assert!(!scheduler.poll(Instant::now()));
    }
}
