//! Display surface contract
//!
//! A surface reports its geometry and draws whatever the session produced.
//! It knows nothing about engines or processes.

use std::io;

use crate::core::engine::CursorSnapshot;
use crate::core::session::{Dimensions, MIN_DIMENSION};

/// Geometry of the drawing area, in the surface's own pixel units
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceMetrics {
    pub width: f64,
    pub height: f64,
    pub glyph_width: f64,
    pub glyph_height: f64,
    /// Vertical space reserved for host chrome (status line, tab bar)
    pub chrome_height: f64,
}

impl SurfaceMetrics {
    /// Grid size that fits the surface, never smaller than 2x2
    pub fn dimensions(&self) -> Dimensions {
        let cells = |extent: f64, glyph: f64| -> i64 {
            if glyph > 0.0 && extent.is_finite() {
                (extent / glyph).floor() as i64
            } else {
                MIN_DIMENSION as i64
            }
        };
        Dimensions::clamped(
            cells(self.width, self.glyph_width),
            cells(self.height - self.chrome_height, self.glyph_height),
        )
    }

    /// Top-left pixel of a 1-indexed cursor cell
    pub fn cursor_origin(&self, cursor: CursorSnapshot) -> Option<CursorPixel> {
        if !cursor.valid || cursor.col == 0 || cursor.row == 0 {
            return None;
        }
        Some(CursorPixel {
            x: (cursor.col - 1) as f64 * self.glyph_width,
            y: (cursor.row - 1) as f64 * self.glyph_height,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CursorPixel {
    pub x: f64,
    pub y: f64,
}

/// One rendered frame
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// Viewport text, rows joined by `\n`
    pub text: String,
    /// Caret position; None hides it
    pub cursor: Option<CursorPixel>,
    pub title: Option<String>,
    /// Lines above the live tail (0 when following output)
    pub scroll_offset: usize,
}

pub trait DisplaySurface {
    fn metrics(&self) -> SurfaceMetrics;

    fn present(&mut self, frame: &Frame) -> io::Result<()>;

    /// Shown instead of a grid when there is no live session
    fn show_placeholder(&mut self, message: &str) -> io::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(width: f64, height: f64) -> SurfaceMetrics {
        SurfaceMetrics {
            width,
            height,
            glyph_width: 8.0,
            glyph_height: 16.0,
            chrome_height: 20.0,
        }
    }

    #[test]
    fn test_dimensions_from_pixels() {
        assert_eq!(
            metrics(645.0, 420.0).dimensions(),
            Dimensions { cols: 80, rows: 25 }
        );
    }

    #[test]
    fn test_dimensions_never_below_minimum() {
        assert_eq!(metrics(0.0, 0.0).dimensions(), Dimensions { cols: 2, rows: 2 });
        assert_eq!(metrics(-50.0, 10.0).dimensions(), Dimensions { cols: 2, rows: 2 });

        let broken = SurfaceMetrics {
            glyph_width: 0.0,
            ..metrics(100.0, 100.0)
        };
        assert_eq!(broken.dimensions().cols, 2);
    }

    #[test]
    fn test_cursor_origin() {
        let m = metrics(640.0, 400.0);
        let cursor = CursorSnapshot { col: 3, row: 2, valid: true };
        assert_eq!(m.cursor_origin(cursor), Some(CursorPixel { x: 16.0, y: 16.0 }));
        assert_eq!(m.cursor_origin(CursorSnapshot::invalid()), None);
    }
}
