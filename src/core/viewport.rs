//! Viewport and scroll-follow state
//!
//! Tracks whether the display follows the live tail and an estimate of how
//! far back it is scrolled. Every method returns the line delta the engine
//! should apply, so the controller itself never touches the engine.

/// Delta that moves the engine to its oldest line
pub const JUMP_TO_TOP: i32 = i32::MIN + 1;
/// Delta that moves the engine back to the live tail
pub const JUMP_TO_BOTTOM: i32 = i32::MAX;

/// User scroll requests
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Signed line delta (negative = older content)
    Lines(i32),
    Top,
    Bottom,
}

#[derive(Debug)]
pub struct ViewportController {
    auto_scroll: bool,
    /// Lines above the live tail (estimate when the engine does not report it)
    scroll_offset: usize,
    /// Sub-line wheel remainder in pixels
    wheel_accumulator: f64,
}

impl Default for ViewportController {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewportController {
    pub fn new() -> Self {
        Self {
            auto_scroll: true,
            scroll_offset: 0,
            wheel_accumulator: 0.0,
        }
    }

    pub fn auto_scroll(&self) -> bool {
        self.auto_scroll
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn wheel_remainder(&self) -> f64 {
        self.wheel_accumulator
    }

    /// Apply a scroll command, returning the delta for the engine
    pub fn apply(&mut self, command: ScrollCommand) -> Option<i32> {
        match command {
            ScrollCommand::Lines(lines) => self.scroll_lines(lines),
            ScrollCommand::Top => Some(self.jump_to_top()),
            ScrollCommand::Bottom => Some(self.jump_to_bottom()),
        }
    }

    /// Scroll by a signed number of lines.
    ///
    /// Moving toward older content stops following the tail. Moving back
    /// down until the offset reaches zero resumes it, and the engine is sent
    /// a full jump so it lands exactly on the tail.
    pub fn scroll_lines(&mut self, lines: i32) -> Option<i32> {
        if lines < 0 {
            self.auto_scroll = false;
            self.scroll_offset = self.scroll_offset.saturating_add(lines.unsigned_abs() as usize);
            Some(lines)
        } else if lines > 0 {
            if self.auto_scroll {
                return None;
            }
            self.scroll_offset = self.scroll_offset.saturating_sub(lines as usize);
            if self.scroll_offset == 0 {
                Some(self.jump_to_bottom())
            } else {
                Some(lines)
            }
        } else {
            None
        }
    }

    pub fn jump_to_top(&mut self) -> i32 {
        self.auto_scroll = false;
        self.scroll_offset = usize::MAX;
        JUMP_TO_TOP
    }

    pub fn jump_to_bottom(&mut self) -> i32 {
        self.auto_scroll = true;
        self.scroll_offset = 0;
        JUMP_TO_BOTTOM
    }

    /// Accumulate a wheel delta in pixels (positive = toward newer content).
    ///
    /// Returns the engine delta once at least one whole line has built up.
    pub fn wheel(&mut self, delta_y: f64, glyph_height: f64) -> Option<i32> {
        if !delta_y.is_finite() || glyph_height <= 0.0 {
            return None;
        }
        self.wheel_accumulator += delta_y;
        let lines = (self.wheel_accumulator / glyph_height).trunc();
        if lines == 0.0 {
            return None;
        }
        self.wheel_accumulator -= lines * glyph_height;
        let lines = lines.clamp(-(i32::MAX as f64), i32::MAX as f64) as i32;
        self.scroll_lines(lines)
    }

    /// Correct the offset estimate from the engine's actual offset.
    ///
    /// An engine sitting at the tail (nothing to scroll back into, or
    /// clamped there) means the view is following again.
    pub fn sync_offset(&mut self, actual: usize) {
        if !self.auto_scroll {
            self.scroll_offset = actual;
            if actual == 0 {
                self.auto_scroll = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_following_tail() {
        let viewport = ViewportController::new();
        assert!(viewport.auto_scroll());
        assert_eq!(viewport.scroll_offset(), 0);
    }

    #[test]
    fn test_negative_delta_clears_auto_scroll() {
        let mut viewport = ViewportController::new();
        assert_eq!(viewport.scroll_lines(-3), Some(-3));
        assert!(!viewport.auto_scroll());
        assert_eq!(viewport.scroll_offset(), 3);
    }

    #[test]
    fn test_reaching_tail_restores_auto_scroll() {
        let mut viewport = ViewportController::new();
        viewport.scroll_lines(-5);

        assert_eq!(viewport.scroll_lines(2), Some(2));
        assert!(!viewport.auto_scroll());

        assert_eq!(viewport.scroll_lines(10), Some(JUMP_TO_BOTTOM));
        assert!(viewport.auto_scroll());
        assert_eq!(viewport.scroll_offset(), 0);
    }

    #[test]
    fn test_scroll_down_at_tail_is_noop() {
        let mut viewport = ViewportController::new();
        assert_eq!(viewport.scroll_lines(4), None);
        assert!(viewport.auto_scroll());
    }

    #[test]
    fn test_explicit_jumps() {
        let mut viewport = ViewportController::new();
        assert_eq!(viewport.apply(ScrollCommand::Top), Some(JUMP_TO_TOP));
        assert!(!viewport.auto_scroll());

        viewport.sync_offset(42);
        assert_eq!(viewport.scroll_offset(), 42);

        assert_eq!(viewport.apply(ScrollCommand::Bottom), Some(JUMP_TO_BOTTOM));
        assert!(viewport.auto_scroll());
        assert_eq!(viewport.scroll_offset(), 0);
    }

    #[test]
    fn test_wheel_accumulates_sub_line_deltas() {
        let mut viewport = ViewportController::new();

        assert_eq!(viewport.wheel(-10.0, 16.0), None);
        assert_eq!(viewport.wheel_remainder(), -10.0);

        assert_eq!(viewport.wheel(-30.0, 16.0), Some(-2));
        assert_eq!(viewport.wheel_remainder(), -8.0);
        assert_eq!(viewport.scroll_offset(), 2);
    }

    #[test]
    fn test_sync_ignored_while_following() {
        let mut viewport = ViewportController::new();
        viewport.sync_offset(7);
        assert_eq!(viewport.scroll_offset(), 0);
    }

    #[test]
    fn test_engine_at_tail_resumes_following() {
        let mut viewport = ViewportController::new();
        viewport.scroll_lines(-1);
        assert!(!viewport.auto_scroll());

        viewport.sync_offset(0);
        assert!(viewport.auto_scroll());
        assert_eq!(viewport.scroll_offset(), 0);
        assert_eq!(viewport.scroll_lines(1), None);
    }
}
