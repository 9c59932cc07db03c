//! Terminal renderer using crossterm
//!
//! Draws frames into the hosting console. One console cell is one "pixel",
//! so glyphs are 1x1 and the bottom `chrome_rows` lines hold a status line.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::surface::{DisplaySurface, Frame, SurfaceMetrics};

/// Console-backed display surface
pub struct CrosstermSurface {
    /// Whether the terminal has been initialized
    initialized: bool,
    chrome_rows: u16,
    size: (u16, u16),
}

impl CrosstermSurface {
    pub fn new(chrome_rows: u16) -> io::Result<Self> {
        Ok(Self {
            initialized: false,
            chrome_rows,
            size: terminal::size()?,
        })
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            crossterm::event::EnableMouseCapture,
            crossterm::event::EnableBracketedPaste,
            DisableLineWrap,
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        stdout.flush()?;
        self.initialized = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(
            stdout,
            ResetColor,
            SetAttribute(Attribute::Reset),
            Show,
            EnableLineWrap,
            crossterm::event::DisableBracketedPaste,
            crossterm::event::DisableMouseCapture,
            LeaveAlternateScreen
        );
        let _ = stdout.flush();

        terminal::disable_raw_mode()
    }

    /// Record a new console size (from a resize event)
    pub fn set_size(&mut self, cols: u16, rows: u16) {
        self.size = (cols, rows);
    }

    fn status_line(&self, frame: &Frame) -> String {
        let mut status = frame.title.clone().unwrap_or_else(|| "termsession".to_string());
        if frame.scroll_offset > 0 {
            status.push_str(&format!("  [\u{2191} {} lines]", frame.scroll_offset));
        }
        status
    }

    fn write_row<W: Write>(out: &mut W, row: u16, text: &str, width: u16) -> io::Result<()> {
        queue!(out, MoveTo(0, row))?;
        let mut used = 0usize;
        for ch in text.chars() {
            let w = ch.width().unwrap_or(0);
            if used + w > width as usize {
                break;
            }
            queue!(out, Print(ch))?;
            used += w;
        }
        if used < width as usize {
            queue!(out, Print(" ".repeat(width as usize - used)))?;
        }
        Ok(())
    }
}

impl DisplaySurface for CrosstermSurface {
    fn metrics(&self) -> SurfaceMetrics {
        SurfaceMetrics {
            width: self.size.0 as f64,
            height: self.size.1 as f64,
            glyph_width: 1.0,
            glyph_height: 1.0,
            chrome_height: self.chrome_rows as f64,
        }
    }

    fn present(&mut self, frame: &Frame) -> io::Result<()> {
        let (cols, rows) = self.size;
        let grid_rows = rows.saturating_sub(self.chrome_rows);

        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());

        // Synchronized update (reduces flicker)
        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        let mut lines = frame.text.split('\n');
        for row in 0..grid_rows {
            Self::write_row(&mut out, row, lines.next().unwrap_or(""), cols)?;
        }

        if self.chrome_rows > 0 && rows > grid_rows {
            queue!(out, SetAttribute(Attribute::Reverse))?;
            Self::write_row(&mut out, grid_rows, &self.status_line(frame), cols)?;
            queue!(out, SetAttribute(Attribute::Reset))?;
        }

        if let Some(cursor) = frame.cursor {
            queue!(out, MoveTo(cursor.x as u16, cursor.y as u16), Show)?;
        }

        write!(out, "\x1b[?2026l")?;
        out.flush()
    }

    fn show_placeholder(&mut self, message: &str) -> io::Result<()> {
        let (cols, rows) = self.size;
        let mut stdout = io::stdout();
        let col = (cols as usize).saturating_sub(message.width()) / 2;
        execute!(
            stdout,
            Hide,
            Clear(ClearType::All),
            MoveTo(col as u16, rows / 2),
            Print(message)
        )?;
        stdout.flush()
    }
}

impl Drop for CrosstermSurface {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn surface(cols: u16, rows: u16) -> CrosstermSurface {
        CrosstermSurface {
            initialized: false,
            chrome_rows: 1,
            size: (cols, rows),
        }
    }

    #[test]
    fn test_metrics_reserve_status_line() {
        let dims = surface(80, 25).metrics().dimensions();
        assert_eq!((dims.cols, dims.rows), (80, 24));
    }

    #[test]
    fn test_write_row_truncates_by_display_width() {
        let mut out = Vec::new();
        CrosstermSurface::write_row(&mut out, 0, "\u{65e5}\u{672c}\u{8a9e}", 5).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("\u{65e5}\u{672c}"));
        assert!(!text.contains('\u{8a9e}'));
    }

    #[test]
    fn test_status_line_shows_scroll_offset() {
        let s = surface(80, 25);
        let frame = Frame {
            text: String::new(),
            cursor: None,
            title: Some("vim".into()),
            scroll_offset: 12,
        };
        assert_eq!(s.status_line(&frame), "vim  [\u{2191} 12 lines]");
    }
}
