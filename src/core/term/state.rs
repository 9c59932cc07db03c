//! Terminal state management
//!
//! This module defines the terminal's screen buffers, scrollback, cursor
//! state and attributes, plus the viewport window laid over them.

use std::collections::VecDeque;

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use crate::core::engine::CursorSnapshot;

/// Default number of lines kept in scrollback
pub const DEFAULT_SCROLLBACK_LIMIT: usize = 10_000;

/// Terminal state holding all screen data
pub struct TerminalState {
    pub cols: u16,
    pub rows: u16,
    pub primary_screen: ScreenBuffer,
    pub alternate_screen: ScreenBuffer,
    pub using_alternate: bool,
    pub primary_cursor: CursorState,
    pub alternate_cursor: CursorState,
    pub current_attrs: CellAttrs,
    pub modes: TerminalModes,
    pub title: String,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    pub scroll_region: (u16, u16),
}

impl TerminalState {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK_LIMIT)
    }

    pub fn with_scrollback(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            cols,
            rows,
            primary_screen: ScreenBuffer::new(cols, rows, scrollback_limit),
            alternate_screen: ScreenBuffer::new(cols, rows, 0),
            using_alternate: false,
            primary_cursor: CursorState::default(),
            alternate_cursor: CursorState::default(),
            current_attrs: CellAttrs::default(),
            modes: TerminalModes::default(),
            title: String::new(),
            scroll_region: (0, rows.saturating_sub(1)),
        }
    }

    /// Full reset (RIS), keeping size and scrollback capacity
    pub fn reset(&mut self) {
        let limit = self.primary_screen.scrollback_limit;
        *self = Self::with_scrollback(self.cols, self.rows, limit);
    }

    pub fn active_screen(&self) -> &ScreenBuffer {
        if self.using_alternate {
            &self.alternate_screen
        } else {
            &self.primary_screen
        }
    }

    pub fn active_screen_mut(&mut self) -> &mut ScreenBuffer {
        if self.using_alternate {
            &mut self.alternate_screen
        } else {
            &mut self.primary_screen
        }
    }

    pub fn active_cursor(&self) -> &CursorState {
        if self.using_alternate {
            &self.alternate_cursor
        } else {
            &self.primary_cursor
        }
    }

    pub fn active_cursor_mut(&mut self) -> &mut CursorState {
        if self.using_alternate {
            &mut self.alternate_cursor
        } else {
            &mut self.primary_cursor
        }
    }

    /// Resize the terminal.
    ///
    /// The primary screen is reflowed to the new width: soft-wrapped lines are
    /// rejoined and wrapped again, and rows that no longer fit above the
    /// cursor move into scrollback. The alternate screen is cropped or padded.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        if cols == self.cols && rows == self.rows {
            return;
        }

        let (row, col) = self
            .primary_screen
            .reflow(cols, rows, (self.primary_cursor.row, self.primary_cursor.col));
        self.primary_cursor.row = row;
        self.primary_cursor.col = col;

        self.alternate_screen.crop(cols, rows);

        self.cols = cols;
        self.rows = rows;
        self.scroll_region = (0, rows.saturating_sub(1));

        let max_col = cols.saturating_sub(1);
        let max_row = rows.saturating_sub(1);
        for cursor in [&mut self.primary_cursor, &mut self.alternate_cursor] {
            cursor.col = cursor.col.min(max_col);
            cursor.row = cursor.row.min(max_row);
            if let Some(saved) = cursor.saved.as_mut() {
                saved.col = saved.col.min(max_col);
                saved.row = saved.row.min(max_row);
            }
        }
    }

    /// Put a character at the current cursor position
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0) as u16;

        if width == 0 {
            // Combining character - append to previous cell
            self.append_to_previous_cell(ch);
            return;
        }

        let (cursor_row, cursor_col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col)
        };

        // Pending wrap: the cursor sits past the last column, or a wide
        // character would straddle the right margin.
        if cursor_col >= self.cols || (width == 2 && cursor_col + 1 >= self.cols && self.cols > 1) {
            if self.modes.auto_wrap {
                self.active_screen_mut().rows[cursor_row as usize].wrapped = true;
                self.active_cursor_mut().col = 0;
                self.linefeed();
            } else {
                self.active_cursor_mut().col = self.cols.saturating_sub(width);
            }
        }

        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };

        if col >= self.cols as usize {
            return;
        }

        if self.modes.insert_mode {
            self.insert_chars(width);
        }
        self.handle_wide_char_overwrite(row, col);

        let attrs = self.current_attrs.clone();
        let cols = self.cols as usize;
        let screen = self.active_screen_mut();

        screen.rows[row].cells[col] = Cell {
            grapheme: ch.to_string(),
            width: width as u8,
            attrs: attrs.clone(),
        };

        if width == 2 && col + 1 < cols {
            screen.rows[row].cells[col + 1] = Cell::continuation(&attrs);
        }

        self.active_cursor_mut().col += width;
    }

    fn append_to_previous_cell(&mut self, ch: char) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };

        if col == 0 {
            return;
        }
        let screen = self.active_screen_mut();
        let cells = &mut screen.rows[row].cells;
        let mut target = (col - 1).min(cells.len() - 1);
        if cells[target].is_continuation() && target > 0 {
            target -= 1;
        }
        cells[target].grapheme.push(ch);
    }

    fn handle_wide_char_overwrite(&mut self, row: usize, col: usize) {
        let attrs = self.current_attrs.clone();
        let cols = self.cols as usize;
        let cells = &mut self.active_screen_mut().rows[row].cells;

        // Overwriting the right half of a wide char
        if col > 0 && cells[col].is_continuation() {
            cells[col - 1] = Cell::blank(&attrs);
        }

        // Overwriting the left half of a wide char
        if cells[col].width == 2 && col + 1 < cols {
            cells[col + 1] = Cell::blank(&attrs);
        }
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        self.active_cursor_mut().col = 0;
    }

    /// Line feed - move cursor down, scroll if at the bottom margin
    pub fn linefeed(&mut self) {
        let cursor_row = self.active_cursor().row;
        let scroll_bottom = self.scroll_region.1;

        if cursor_row == scroll_bottom {
            self.scroll_up(1);
        } else if cursor_row < self.rows.saturating_sub(1) {
            self.active_cursor_mut().row += 1;
        }

        if self.modes.linefeed_newline {
            self.carriage_return();
        }
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        if cursor.col >= cols {
            cursor.col = cols.saturating_sub(1);
        }
        cursor.col = cursor.col.saturating_sub(1);
    }

    /// Horizontal tab
    pub fn horizontal_tab(&mut self) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        // Tab stops every 8 columns
        cursor.col = ((cursor.col / 8) + 1) * 8;
        if cursor.col >= cols {
            cursor.col = cols.saturating_sub(1);
        }
    }

    /// Scroll the scroll region up by n lines
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;
        let is_primary = !self.using_alternate;
        let screen = self.active_screen_mut();

        for _ in 0..n.min(bottom - top + 1) {
            let removed = screen.rows.remove(top as usize);
            // Only lines leaving the top of the full screen become history
            if is_primary && top == 0 {
                screen.push_to_scrollback(removed);
            }
            screen.rows.insert(bottom as usize, Row::new(cols));
        }
    }

    /// Scroll the scroll region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let cols = self.cols;
        let screen = self.active_screen_mut();

        for _ in 0..n.min(bottom - top + 1) {
            screen.rows.remove(bottom as usize);
            screen.rows.insert(top as usize, Row::new(cols));
        }
    }

    pub fn cursor_up(&mut self, n: u16) {
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_sub(n);
    }

    pub fn cursor_down(&mut self, n: u16) {
        let rows = self.rows;
        let cursor = self.active_cursor_mut();
        cursor.row = cursor.row.saturating_add(n).min(rows.saturating_sub(1));
    }

    pub fn cursor_forward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.saturating_add(n).min(cols.saturating_sub(1));
    }

    pub fn cursor_backward(&mut self, n: u16) {
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.col = cursor.col.min(cols.saturating_sub(1)).saturating_sub(n);
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        let rows = self.rows;
        let cols = self.cols;
        let cursor = self.active_cursor_mut();
        cursor.row = row.saturating_sub(1).min(rows.saturating_sub(1));
        cursor.col = col.saturating_sub(1).min(cols.saturating_sub(1));
    }

    pub fn set_cursor_col(&mut self, col: u16) {
        let cols = self.cols;
        self.active_cursor_mut().col = col.saturating_sub(1).min(cols.saturating_sub(1));
    }

    pub fn set_cursor_row(&mut self, row: u16) {
        let rows = self.rows;
        self.active_cursor_mut().row = row.saturating_sub(1).min(rows.saturating_sub(1));
    }

    /// Erase in display (ED)
    pub fn erase_in_display(&mut self, mode: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let attrs = self.current_attrs.clone();

        match mode {
            0 => {
                self.erase_in_line(0);
                let screen = self.active_screen_mut();
                for row in screen.rows.iter_mut().skip(cursor_row + 1) {
                    row.clear(&attrs);
                }
            }
            1 => {
                {
                    let screen = self.active_screen_mut();
                    for row in screen.rows.iter_mut().take(cursor_row) {
                        row.clear(&attrs);
                    }
                }
                self.erase_in_line(1);
            }
            2 => {
                for row in self.active_screen_mut().rows.iter_mut() {
                    row.clear(&attrs);
                }
            }
            3 => {
                let screen = self.active_screen_mut();
                screen.scrollback.clear();
                screen.scroll_offset = 0;
            }
            _ => {}
        }
    }

    /// Erase in line (EL)
    pub fn erase_in_line(&mut self, mode: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let attrs = self.current_attrs.clone();
        let cells = &mut self.active_screen_mut().rows[row].cells;
        let last = cells.len().saturating_sub(1);

        let range = match mode {
            0 => col.min(cells.len())..cells.len(),
            1 => 0..col.min(last) + 1,
            2 => 0..cells.len(),
            _ => return,
        };
        for cell in &mut cells[range] {
            cell.clear(&attrs);
        }
        if mode != 1 {
            self.active_screen_mut().rows[row].wrapped = false;
        }
    }

    /// Insert blank characters at the cursor (ICH)
    pub fn insert_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let cells = &mut self.active_screen_mut().rows[row].cells;
        if col >= cells.len() {
            return;
        }
        for _ in 0..(n as usize).min(cells.len() - col) {
            cells.pop();
            cells.insert(col, Cell::default());
        }
    }

    /// Delete characters at the cursor (DCH)
    pub fn delete_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let cells = &mut self.active_screen_mut().rows[row].cells;
        if col >= cells.len() {
            return;
        }
        for _ in 0..(n as usize).min(cells.len() - col) {
            cells.remove(col);
            cells.push(Cell::default());
        }
    }

    /// Erase characters from the cursor (ECH)
    pub fn erase_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row as usize, cursor.col as usize)
        };
        let attrs = self.current_attrs.clone();
        let cells = &mut self.active_screen_mut().rows[row].cells;
        for cell in cells.iter_mut().skip(col).take(n as usize) {
            cell.clear(&attrs);
        }
    }

    /// Insert lines at cursor position (IL), inside the scroll region
    pub fn insert_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row;
        let (top, bottom) = self.scroll_region;
        if cursor_row < top || cursor_row > bottom {
            return;
        }
        let cols = self.cols;
        let screen = self.active_screen_mut();
        for _ in 0..n.min(bottom - cursor_row + 1) {
            screen.rows.remove(bottom as usize);
            screen.rows.insert(cursor_row as usize, Row::new(cols));
        }
    }

    /// Delete lines at cursor position (DL), inside the scroll region
    pub fn delete_lines(&mut self, n: u16) {
        let cursor_row = self.active_cursor().row;
        let (top, bottom) = self.scroll_region;
        if cursor_row < top || cursor_row > bottom {
            return;
        }
        let cols = self.cols;
        let screen = self.active_screen_mut();
        for _ in 0..n.min(bottom - cursor_row + 1) {
            screen.rows.remove(cursor_row as usize);
            screen.rows.insert(bottom as usize, Row::new(cols));
        }
    }

    /// Set scroll region (DECSTBM, 1-indexed)
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let rows = self.rows;
        let top = top.saturating_sub(1).min(rows.saturating_sub(1));
        let bottom = bottom.saturating_sub(1).min(rows.saturating_sub(1));
        if top < bottom {
            self.scroll_region = (top, bottom);
        }
    }

    pub fn save_cursor(&mut self) {
        let (col, row) = {
            let cursor = self.active_cursor();
            (cursor.col, cursor.row)
        };
        let attrs = self.current_attrs.clone();
        self.active_cursor_mut().saved = Some(SavedCursor { col, row, attrs });
    }

    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.active_cursor().saved.clone() {
            let cursor = self.active_cursor_mut();
            cursor.col = saved.col;
            cursor.row = saved.row;
            self.current_attrs = saved.attrs;
        }
    }

    /// Set private mode (DECSET/DECRST)
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            7 => self.modes.auto_wrap = enable,
            25 => self.active_cursor_mut().visible = enable,
            47 | 1047 => self.switch_screen(enable),
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.save_cursor();
                    self.switch_screen(true);
                    self.alternate_cursor = CursorState::default();
                } else {
                    self.switch_screen(false);
                    self.restore_cursor();
                }
            }
            _ => {}
        }
    }

    fn switch_screen(&mut self, alternate: bool) {
        if alternate == self.using_alternate {
            return;
        }
        if alternate {
            self.alternate_screen = ScreenBuffer::new(self.cols, self.rows, 0);
        }
        self.primary_screen.scroll_offset = 0;
        self.using_alternate = alternate;
    }

    /// Reverse index - cursor up, scroll if at top
    pub fn reverse_index(&mut self) {
        if self.active_cursor().row == self.scroll_region.0 {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Index - cursor down, scroll if at bottom
    pub fn index(&mut self) {
        let lnm = self.modes.linefeed_newline;
        self.modes.linefeed_newline = false;
        self.linefeed();
        self.modes.linefeed_newline = lnm;
    }

    /// Move the viewport by a signed number of lines (negative = older content)
    pub fn scroll_viewport(&mut self, delta: i64) {
        let screen = self.active_screen_mut();
        if delta < 0 {
            screen.scroll_view_up(delta.unsigned_abs() as usize);
        } else {
            screen.scroll_view_down(delta as usize);
        }
    }

    /// Text currently shown in the viewport, one fixed-width row per line
    pub fn dump_viewport(&self) -> String {
        let screen = self.active_screen();
        let mut out = String::with_capacity((self.cols as usize + 1) * self.rows as usize);
        for visible_row in 0..self.rows as usize {
            if visible_row > 0 {
                out.push('\n');
            }
            match screen.get_row_at(visible_row) {
                Some(row) => row.write_text(&mut out, self.cols),
                None => out.extend(std::iter::repeat(' ').take(self.cols as usize)),
            }
        }
        out
    }

    /// Cursor position relative to the viewport, 1-indexed
    pub fn cursor_snapshot(&self) -> CursorSnapshot {
        let cursor = self.active_cursor();
        if !cursor.visible {
            return CursorSnapshot::invalid();
        }
        let display_row = cursor.row as usize + self.active_screen().scroll_offset;
        if display_row >= self.rows as usize {
            return CursorSnapshot::invalid();
        }
        CursorSnapshot {
            col: cursor.col.min(self.cols.saturating_sub(1)) + 1,
            row: display_row as u16 + 1,
            valid: true,
        }
    }
}

/// Screen buffer with scrollback
pub struct ScreenBuffer {
    /// Visible rows
    pub rows: Vec<Row>,
    /// Scrollback history, oldest first
    pub scrollback: VecDeque<Row>,
    /// Maximum scrollback lines
    pub scrollback_limit: usize,
    /// Current scroll offset (0 = at bottom, >0 = scrolled up)
    pub scroll_offset: usize,
}

impl ScreenBuffer {
    pub fn new(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
            scrollback: VecDeque::new(),
            scrollback_limit,
            scroll_offset: 0,
        }
    }

    /// Crop or pad to a new size without moving content into scrollback
    pub fn crop(&mut self, new_cols: u16, new_rows: u16) {
        self.rows.resize_with(new_rows as usize, || Row::new(new_cols));
        for row in &mut self.rows {
            row.resize(new_cols);
        }
        self.scroll_offset = self.scroll_offset.min(self.scrollback.len());
    }

    /// Rewrap scrollback and screen to a new width and height.
    ///
    /// Returns the new cursor (row, col) for the given cursor position.
    pub fn reflow(&mut self, new_cols: u16, new_rows: u16, cursor: (u16, u16)) -> (u16, u16) {
        let (cursor_row, cursor_col) = (cursor.0 as usize, cursor.1 as usize);
        let last_used = self
            .rows
            .iter()
            .rposition(|row| !row.is_blank())
            .unwrap_or(0)
            .max(cursor_row.min(self.rows.len().saturating_sub(1)));

        let history = self.scrollback.len();
        let cursor_abs = history + cursor_row;
        let source: Vec<Row> = self
            .scrollback
            .drain(..)
            .chain(self.rows.drain(..=last_used))
            .collect();

        // Join soft-wrapped rows back into logical lines
        let mut lines: Vec<(Vec<Cell>, Option<usize>)> = Vec::new();
        let mut current: Vec<Cell> = Vec::new();
        let mut cursor_in_line = None;
        for (abs, row) in source.into_iter().enumerate() {
            let wrapped = row.wrapped;
            if abs == cursor_abs {
                cursor_in_line = Some(current.len() + cursor_col);
            }
            let mut cells = row.cells;
            if !wrapped {
                let keep = cells
                    .iter()
                    .rposition(|c| !c.is_blank())
                    .map_or(0, |i| i + 1);
                cells.truncate(keep);
            }
            current.extend(cells);
            if !wrapped {
                lines.push((std::mem::take(&mut current), cursor_in_line.take()));
            }
        }
        if !current.is_empty() || cursor_in_line.is_some() {
            lines.push((current, cursor_in_line));
        }

        // Wrap every logical line to the new width
        let width = new_cols as usize;
        let mut rewrapped: Vec<Row> = Vec::new();
        let mut new_cursor = (0usize, 0usize);
        for (mut cells, cursor_at) in lines {
            if let Some(at) = cursor_at {
                while cells.len() < at {
                    cells.push(Cell::default());
                }
            }
            let mut row = Row::empty();
            let mut index = 0;
            for cell in cells {
                if cell.is_continuation() {
                    index += 1;
                    continue;
                }
                let needed = if cell.width == 2 && width > 1 { 2 } else { 1 };
                if row.cells.len() + needed > width {
                    row.pad(new_cols);
                    row.wrapped = true;
                    rewrapped.push(std::mem::replace(&mut row, Row::empty()));
                }
                if cursor_at == Some(index) {
                    new_cursor = (rewrapped.len(), row.cells.len());
                }
                let attrs = cell.attrs.clone();
                row.cells.push(cell);
                if needed == 2 {
                    row.cells.push(Cell::continuation(&attrs));
                }
                index += 1;
            }
            if let Some(at) = cursor_at {
                if at >= index {
                    if row.cells.len() >= width {
                        row.pad(new_cols);
                        row.wrapped = true;
                        rewrapped.push(std::mem::replace(&mut row, Row::empty()));
                    }
                    new_cursor = (rewrapped.len(), row.cells.len());
                }
            }
            row.pad(new_cols);
            rewrapped.push(row);
        }

        let total = rewrapped.len();
        let start = total.saturating_sub(new_rows as usize).min(new_cursor.0);
        let mut screen: Vec<Row> = rewrapped.split_off(start);
        screen.truncate(new_rows as usize);
        screen.resize_with(new_rows as usize, || Row::new(new_cols));

        self.scrollback = rewrapped.into();
        while self.scrollback.len() > self.scrollback_limit {
            self.scrollback.pop_front();
        }
        self.rows = screen;
        self.scroll_offset = self.scroll_offset.min(self.scrollback.len());

        let row = (new_cursor.0 - start).min(new_rows.saturating_sub(1) as usize);
        let col = new_cursor.1.min(new_cols.saturating_sub(1) as usize);
        (row as u16, col as u16)
    }

    /// Add a row to scrollback when it scrolls off the top.
    ///
    /// A scrolled-back view stays on the same content while history grows.
    pub fn push_to_scrollback(&mut self, row: Row) {
        if self.scrollback_limit == 0 {
            return;
        }
        self.scrollback.push_back(row);
        if self.scrollback.len() > self.scrollback_limit {
            self.scrollback.pop_front();
        }
        if self.scroll_offset > 0 {
            self.scroll_offset = (self.scroll_offset + 1).min(self.scrollback.len());
        }
    }

    /// Total number of lines (scrollback + visible)
    pub fn total_lines(&self) -> usize {
        self.scrollback.len() + self.rows.len()
    }

    /// Row shown at a visible position, accounting for scroll offset
    pub fn get_row_at(&self, visible_row: usize) -> Option<&Row> {
        let history = self.scrollback.len();
        let absolute = history.saturating_sub(self.scroll_offset) + visible_row;
        if absolute < history {
            self.scrollback.get(absolute)
        } else {
            self.rows.get(absolute - history)
        }
    }

    /// Scroll view up (toward older lines) by n lines
    pub fn scroll_view_up(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(n).min(self.scrollback.len());
    }

    /// Scroll view down (toward the live screen) by n lines
    pub fn scroll_view_down(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }

    pub fn is_scrolled(&self) -> bool {
        self.scroll_offset > 0
    }
}

/// A single row
#[derive(Clone)]
pub struct Row {
    pub cells: Vec<Cell>,
    /// Set when the line continued onto the next row through auto-wrap
    pub wrapped: bool,
}

impl Row {
    pub fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
            wrapped: false,
        }
    }

    fn empty() -> Self {
        Self {
            cells: Vec::new(),
            wrapped: false,
        }
    }

    pub fn resize(&mut self, new_cols: u16) {
        self.cells.resize(new_cols as usize, Cell::default());
        if let Some(last) = self.cells.last_mut() {
            // A wide character cut in half by the new margin
            if last.width == 2 {
                *last = Cell::default();
            }
        }
    }

    fn pad(&mut self, cols: u16) {
        self.cells.resize(cols as usize, Cell::default());
    }

    pub fn clear(&mut self, attrs: &CellAttrs) {
        for cell in &mut self.cells {
            cell.clear(attrs);
        }
        self.wrapped = false;
    }

    pub fn is_blank(&self) -> bool {
        !self.wrapped && self.cells.iter().all(Cell::is_blank)
    }

    /// Append the row's text, padded to `cols` display columns
    pub fn write_text(&self, out: &mut String, cols: u16) {
        let mut used = 0usize;
        for cell in &self.cells {
            if cell.is_continuation() {
                continue;
            }
            out.push_str(cell.display_char());
            used += cell.width.max(1) as usize;
        }
        for _ in used..cols as usize {
            out.push(' ');
        }
    }

    /// Row text with trailing blanks removed
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out, 0);
        out.trim_end().to_string()
    }
}

/// A single cell
#[derive(Clone, Debug, PartialEq)]
pub struct Cell {
    pub grapheme: String,
    pub width: u8,
    pub attrs: CellAttrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            attrs: CellAttrs::default(),
        }
    }
}

impl Cell {
    fn blank(attrs: &CellAttrs) -> Self {
        Self {
            grapheme: " ".to_string(),
            width: 1,
            attrs: attrs.clone(),
        }
    }

    pub fn clear(&mut self, attrs: &CellAttrs) {
        self.grapheme.clear();
        self.width = 1;
        self.attrs = attrs.clone();
    }

    pub fn continuation(attrs: &CellAttrs) -> Self {
        Self {
            grapheme: String::new(),
            width: 0,
            attrs: attrs.clone(),
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    pub fn is_blank(&self) -> bool {
        (self.grapheme.is_empty() || self.grapheme == " ")
            && self.width == 1
            && self.attrs == CellAttrs::default()
    }

    /// Display text (space if empty)
    pub fn display_char(&self) -> &str {
        if self.grapheme.is_empty() {
            " "
        } else {
            &self.grapheme
        }
    }
}

/// Cell attributes
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
    }
}

#[derive(Clone)]
pub struct CursorState {
    pub col: u16,
    pub row: u16,
    pub visible: bool,
    pub saved: Option<SavedCursor>,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            col: 0,
            row: 0,
            visible: true,
            saved: None,
        }
    }
}

#[derive(Clone)]
pub struct SavedCursor {
    pub col: u16,
    pub row: u16,
    pub attrs: CellAttrs,
}

/// Terminal modes
#[derive(Clone)]
pub struct TerminalModes {
    pub auto_wrap: bool,
    /// IRM: printed characters shift the rest of the line right
    pub insert_mode: bool,
    pub linefeed_newline: bool,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self {
            auto_wrap: true,
            insert_mode: false,
            linefeed_newline: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(state: &mut TerminalState, text: &str) {
        for ch in text.chars() {
            match ch {
                '\r' => state.carriage_return(),
                '\n' => state.linefeed(),
                _ => state.put_char(ch),
            }
        }
    }

    fn line(state: &TerminalState, row: usize) -> String {
        state.active_screen().rows[row].text()
    }

    #[test]
    fn test_auto_wrap_marks_row() {
        let mut state = TerminalState::new(5, 3);
        write(&mut state, "abcdefg");

        assert_eq!(line(&state, 0), "abcde");
        assert_eq!(line(&state, 1), "fg");
        assert!(state.active_screen().rows[0].wrapped);
        assert_eq!(state.active_cursor().col, 2);
    }

    #[test]
    fn test_linefeed_pushes_scrollback() {
        let mut state = TerminalState::new(10, 2);
        write(&mut state, "one\r\ntwo\r\nthree");

        let screen = state.active_screen();
        assert_eq!(screen.scrollback.len(), 1);
        assert_eq!(screen.scrollback[0].text(), "one");
        assert_eq!(line(&state, 0), "two");
        assert_eq!(line(&state, 1), "three");
    }

    #[test]
    fn test_scrollback_limit() {
        let mut state = TerminalState::with_scrollback(10, 2, 3);
        for i in 0..10 {
            write(&mut state, &format!("{}\r\n", i));
        }
        let screen = state.active_screen();
        assert_eq!(screen.scrollback.len(), 3);
        assert_eq!(screen.scrollback[0].text(), "6");
    }

    #[test]
    fn test_frozen_view_keeps_content() {
        let mut state = TerminalState::new(10, 2);
        for i in 0..5 {
            write(&mut state, &format!("l{}\r\n", i));
        }
        state.scroll_viewport(-2);
        let before = state.dump_viewport();

        write(&mut state, "l5\r\nl6\r\n");

        assert_eq!(state.dump_viewport(), before);
        assert_eq!(state.active_screen().scroll_offset, 4);
    }

    #[test]
    fn test_reflow_narrower_rewraps() {
        let mut state = TerminalState::new(10, 3);
        write(&mut state, "abcdefgh\r\nxy");

        state.resize(4, 3);

        let screen = state.active_screen();
        let all: Vec<String> = screen
            .scrollback
            .iter()
            .chain(screen.rows.iter())
            .map(Row::text)
            .collect();
        assert_eq!(all, vec!["abcd", "efgh", "xy"]);
        assert_eq!(state.active_cursor().row, 2);
        assert_eq!(state.active_cursor().col, 2);
    }

    #[test]
    fn test_reflow_wider_joins_wrapped() {
        let mut state = TerminalState::new(4, 4);
        write(&mut state, "abcdefgh\r\nz");
        assert!(state.active_screen().rows[0].wrapped);

        state.resize(10, 4);

        assert_eq!(line(&state, 0), "abcdefgh");
        assert_eq!(line(&state, 1), "z");
        assert_eq!(state.active_cursor().row, 1);
        assert_eq!(state.active_cursor().col, 1);
    }

    #[test]
    fn test_shrink_rows_moves_lines_to_scrollback() {
        let mut state = TerminalState::new(10, 5);
        write(&mut state, "a\r\nb\r\nc\r\nd");

        state.resize(10, 2);

        let screen = state.active_screen();
        assert_eq!(screen.scrollback.len(), 2);
        assert_eq!(line(&state, 0), "c");
        assert_eq!(line(&state, 1), "d");
        assert_eq!(state.active_cursor().row, 1);
    }

    #[test]
    fn test_wide_char_occupies_two_cells() {
        let mut state = TerminalState::new(6, 2);
        write(&mut state, "日本");

        assert_eq!(state.active_cursor().col, 4);
        assert!(state.active_screen().rows[0].cells[1].is_continuation());
        assert_eq!(state.dump_viewport().lines().next(), Some("日本  "));
    }

    #[test]
    fn test_cursor_snapshot_hidden_when_scrolled_away() {
        let mut state = TerminalState::new(10, 2);
        write(&mut state, "1\r\n2\r\n3\r\n4");
        state.cursor_position(1, 1);
        assert!(state.cursor_snapshot().valid);

        state.scroll_viewport(-1);
        let snapshot = state.cursor_snapshot();
        assert!(snapshot.valid);
        assert_eq!(snapshot.row, 2);

        state.scroll_viewport(-1);
        assert!(!state.cursor_snapshot().valid);
    }

    #[test]
    fn test_alternate_screen_has_no_scrollback() {
        let mut state = TerminalState::new(10, 2);
        state.set_private_mode(1049, true);
        write(&mut state, "a\r\nb\r\nc\r\n");
        assert!(state.alternate_screen.scrollback.is_empty());

        state.set_private_mode(1049, false);
        assert!(!state.using_alternate);
    }

    #[test]
    fn test_insert_mode_shifts_line() {
        let mut state = TerminalState::new(6, 2);
        write(&mut state, "abc\r");
        state.modes.insert_mode = true;
        write(&mut state, "X");
        assert_eq!(line(&state, 0), "Xabc");
        assert_eq!(state.active_cursor().col, 1);

        write(&mut state, "YZ");
        assert_eq!(line(&state, 0), "XYZabc");

        // Text pushed past the margin is lost
        write(&mut state, "\r");
        write(&mut state, "Q");
        assert_eq!(line(&state, 0), "QXYZab");

        state.modes.insert_mode = false;
        write(&mut state, "R");
        assert_eq!(line(&state, 0), "QRYZab");
    }
}
