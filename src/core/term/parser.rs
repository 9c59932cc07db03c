//! VT sequence parser
//!
//! Parses ANSI/VT escape sequences and updates terminal state. The parser
//! is a byte-at-a-time state machine: escape sequences and UTF-8 characters
//! split across `feed` calls resume where they left off.

use super::state::{AttrFlags, Color, TerminalState};

/// OSC payload bytes kept; the rest of an overlong string is dropped
const MAX_OSC_LEN: usize = 4096;

/// CSI parameters kept; extra parameters are ignored
const MAX_PARAMS: usize = 32;

/// Reply the terminal owes the application (written back to the PTY)
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    /// Cursor position report: ESC [ row ; col R
    CursorPosition(u16, u16),
    /// Operating status report: ESC [ 0 n
    StatusOk,
    DeviceAttributes,
    SecondaryDeviceAttributes,
}

impl Response {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Response::CursorPosition(row, col) => format!("\x1b[{};{}R", row, col).into_bytes(),
            Response::StatusOk => b"\x1b[0n".to_vec(),
            // VT220
            Response::DeviceAttributes => b"\x1b[?62;c".to_vec(),
            Response::SecondaryDeviceAttributes => b"\x1b[>1;10;0c".to_vec(),
        }
    }
}

/// Parser state machine
pub struct VtParser {
    state: ParserState,
    params: Vec<u16>,
    intermediates: Vec<u8>,
    current_param: Option<u16>,
    osc_bytes: Vec<u8>,
    utf8: Utf8Decoder,
}

#[derive(Clone, Copy, Default, PartialEq, Debug)]
enum ParserState {
    #[default]
    Ground,
    Escape,
    EscapeIntermediate,
    CsiEntry,
    CsiParam,
    CsiIntermediate,
    CsiIgnore,
    OscString,
    /// ESC received within OSC, waiting for backslash
    EscapeInOsc,
    /// DCS, SOS, PM and APC strings are consumed and discarded
    IgnoredString,
    EscapeInIgnoredString,
}

/// Incremental UTF-8 decoder that survives chunk boundaries
#[derive(Default)]
struct Utf8Decoder {
    buf: [u8; 4],
    len: usize,
    need: usize,
}

impl Utf8Decoder {
    /// Push a byte >= 0x80. Returns a decoded char once complete, or the
    /// replacement character for malformed input.
    fn push(&mut self, byte: u8) -> Option<char> {
        if self.need == 0 {
            let need = match byte {
                0xC2..=0xDF => 2,
                0xE0..=0xEF => 3,
                0xF0..=0xF4 => 4,
                _ => return Some(char::REPLACEMENT_CHARACTER),
            };
            self.buf[0] = byte;
            self.len = 1;
            self.need = need;
            return None;
        }

        if byte & 0xC0 != 0x80 {
            // Broken sequence: emit a replacement and restart with this byte
            self.reset();
            return match self.push(byte) {
                None => Some(char::REPLACEMENT_CHARACTER),
                Some(_) => Some(char::REPLACEMENT_CHARACTER),
            };
        }

        self.buf[self.len] = byte;
        self.len += 1;
        if self.len < self.need {
            return None;
        }
        let decoded = std::str::from_utf8(&self.buf[..self.len])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        self.reset();
        Some(decoded)
    }

    fn in_progress(&self) -> bool {
        self.need != 0
    }

    fn reset(&mut self) {
        self.len = 0;
        self.need = 0;
    }
}

impl Default for VtParser {
    fn default() -> Self {
        Self::new()
    }
}

impl VtParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Ground,
            params: Vec::with_capacity(16),
            intermediates: Vec::with_capacity(4),
            current_param: None,
            osc_bytes: Vec::new(),
            utf8: Utf8Decoder::default(),
        }
    }

    /// Feed a byte slice, collecting any replies
    pub fn advance(&mut self, bytes: &[u8], state: &mut TerminalState, replies: &mut Vec<Response>) {
        for &byte in bytes {
            if let Some(response) = self.feed(byte, state) {
                replies.push(response);
            }
        }
    }

    /// Feed a single byte to the parser
    pub fn feed(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        let in_string = matches!(
            self.state,
            ParserState::OscString
                | ParserState::EscapeInOsc
                | ParserState::IgnoredString
                | ParserState::EscapeInIgnoredString
        );

        if self.utf8.in_progress() && byte < 0x80 {
            self.utf8.reset();
            state.put_char(char::REPLACEMENT_CHARACTER);
        }

        // C0 controls execute anywhere except inside string sequences
        if (byte < 0x20 || byte == 0x7F) && !in_string {
            match byte {
                0x1B => self.enter_escape(),
                0x08 => state.backspace(),
                0x09 => state.horizontal_tab(),
                0x0A..=0x0C => state.linefeed(),
                0x0D => state.carriage_return(),
                // CAN / SUB abort the current sequence
                0x18 | 0x1A => self.state = ParserState::Ground,
                _ => {}
            }
            return None;
        }

        match self.state {
            ParserState::Ground => self.ground(byte, state),
            ParserState::Escape => self.escape(byte, state),
            ParserState::EscapeIntermediate => self.escape_intermediate(byte),
            ParserState::CsiEntry => self.csi_entry(byte, state),
            ParserState::CsiParam => self.csi_param(byte, state),
            ParserState::CsiIntermediate => self.csi_intermediate(byte, state),
            ParserState::CsiIgnore => {
                if (0x40..=0x7E).contains(&byte) {
                    self.state = ParserState::Ground;
                }
                None
            }
            ParserState::OscString => self.osc_string_state(byte, state),
            ParserState::EscapeInOsc => self.escape_in_osc(byte, state),
            ParserState::IgnoredString => {
                match byte {
                    0x1B => self.state = ParserState::EscapeInIgnoredString,
                    0x07 => self.state = ParserState::Ground,
                    _ => {}
                }
                None
            }
            ParserState::EscapeInIgnoredString => {
                self.state = if byte == b'\\' {
                    ParserState::Ground
                } else {
                    ParserState::IgnoredString
                };
                None
            }
        }
    }

    fn escape_in_osc(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        self.execute_osc(state);
        if byte == b'\\' {
            // ST (ESC \)
            self.state = ParserState::Ground;
            None
        } else {
            self.enter_escape();
            self.escape(byte, state)
        }
    }

    fn enter_escape(&mut self) {
        self.state = ParserState::Escape;
        self.params.clear();
        self.intermediates.clear();
        self.current_param = None;
    }

    fn ground(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        if byte < 0x80 {
            state.put_char(byte as char);
        } else if let Some(ch) = self.utf8.push(byte) {
            state.put_char(ch);
        }
        None
    }

    fn escape(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        self.state = ParserState::Ground;
        match byte {
            b'[' => {
                self.state = ParserState::CsiEntry;
                self.params.clear();
                self.intermediates.clear();
                self.current_param = None;
            }
            b']' => {
                self.state = ParserState::OscString;
                self.osc_bytes.clear();
            }
            b'P' | b'X' | b'^' | b'_' => self.state = ParserState::IgnoredString,
            // DECSC / DECRC
            b'7' => state.save_cursor(),
            b'8' => state.restore_cursor(),
            // IND
            b'D' => state.index(),
            // NEL
            b'E' => {
                state.carriage_return();
                state.index();
            }
            // RI
            b'M' => state.reverse_index(),
            // RIS
            b'c' => state.reset(),
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::EscapeIntermediate;
            }
            _ => {}
        }
        None
    }

    fn escape_intermediate(&mut self, byte: u8) -> Option<Response> {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            // Charset designations and similar finals are accepted and ignored
            _ => self.state = ParserState::Ground,
        }
        None
    }

    fn csi_entry(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                self.current_param = Some((byte - b'0') as u16);
                self.state = ParserState::CsiParam;
            }
            b';' => {
                self.push_param(0);
                self.state = ParserState::CsiParam;
            }
            b'?' | b'>' | b'!' | b'=' | b'<' => self.intermediates.push(byte),
            0x20..=0x2F => {
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => return self.execute_csi(byte, state),
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn csi_param(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            b'0'..=b'9' => {
                let digit = (byte - b'0') as u16;
                self.current_param = Some(
                    self.current_param
                        .unwrap_or(0)
                        .saturating_mul(10)
                        .saturating_add(digit),
                );
            }
            // Subparameters (':') are flattened into regular parameters
            b';' | b':' => {
                let param = self.current_param.take().unwrap_or(0);
                self.push_param(param);
            }
            0x20..=0x2F => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                self.intermediates.push(byte);
                self.state = ParserState::CsiIntermediate;
            }
            0x40..=0x7E => {
                if let Some(p) = self.current_param.take() {
                    self.push_param(p);
                }
                return self.execute_csi(byte, state);
            }
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn push_param(&mut self, param: u16) {
        if self.params.len() < MAX_PARAMS {
            self.params.push(param);
        }
    }

    fn csi_intermediate(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            0x20..=0x2F => self.intermediates.push(byte),
            0x40..=0x7E => return self.execute_csi(byte, state),
            _ => self.state = ParserState::CsiIgnore,
        }
        None
    }

    fn osc_string_state(&mut self, byte: u8, state: &mut TerminalState) -> Option<Response> {
        match byte {
            // 0x9C is not a terminator here: it is a UTF-8 continuation byte
            0x07 => {
                self.execute_osc(state);
                self.state = ParserState::Ground;
            }
            0x1B => self.state = ParserState::EscapeInOsc,
            _ if self.osc_bytes.len() < MAX_OSC_LEN => self.osc_bytes.push(byte),
            _ => {}
        }
        None
    }

    fn execute_csi(&mut self, final_byte: u8, state: &mut TerminalState) -> Option<Response> {
        self.state = ParserState::Ground;
        let is_private = self.intermediates.contains(&b'?');
        let is_gt = self.intermediates.contains(&b'>');
        let has_other = self
            .intermediates
            .iter()
            .any(|b| !matches!(b, b'?' | b'>'));
        let params = &self.params;
        let first = |default: u16| params.first().copied().filter(|&p| p != 0).unwrap_or(default);

        if has_other {
            tracing::trace!(
                "Ignored CSI: intermediates={:?}, params={:?}, final={:?}",
                self.intermediates,
                params,
                final_byte as char
            );
            return None;
        }

        match (is_private, is_gt, final_byte) {
            (false, false, b'A') => state.cursor_up(first(1)),
            (false, false, b'B') | (false, false, b'e') => state.cursor_down(first(1)),
            (false, false, b'C') | (false, false, b'a') => state.cursor_forward(first(1)),
            (false, false, b'D') => state.cursor_backward(first(1)),
            // CNL / CPL
            (false, false, b'E') => {
                state.cursor_down(first(1));
                state.carriage_return();
            }
            (false, false, b'F') => {
                state.cursor_up(first(1));
                state.carriage_return();
            }
            // CHA / HPA
            (false, false, b'G') | (false, false, b'`') => state.set_cursor_col(first(1)),
            // CUP / HVP
            (false, false, b'H') | (false, false, b'f') => {
                let row = params.first().copied().unwrap_or(1);
                let col = params.get(1).copied().unwrap_or(1);
                state.cursor_position(row, col);
            }
            // VPA
            (false, false, b'd') => state.set_cursor_row(first(1)),
            (false, false, b'J') => state.erase_in_display(params.first().copied().unwrap_or(0)),
            (false, false, b'K') => state.erase_in_line(params.first().copied().unwrap_or(0)),
            (false, false, b'L') => state.insert_lines(first(1)),
            (false, false, b'M') => state.delete_lines(first(1)),
            (false, false, b'@') => state.insert_chars(first(1)),
            (false, false, b'P') => state.delete_chars(first(1)),
            (false, false, b'X') => state.erase_chars(first(1)),
            (false, false, b'S') => state.scroll_up(first(1)),
            (false, false, b'T') => state.scroll_down(first(1)),
            // DECSTBM
            (false, false, b'r') => {
                let top = params.first().copied().unwrap_or(1).max(1);
                let bottom = params.get(1).copied().filter(|&b| b != 0).unwrap_or(state.rows);
                state.set_scroll_region(top, bottom);
                state.cursor_position(1, 1);
            }
            (false, false, b'm') => Self::execute_sgr(params, state),
            (false, false, b's') => state.save_cursor(),
            (false, false, b'u') => state.restore_cursor(),
            // DSR
            (false, false, b'n') => {
                return match params.first() {
                    Some(5) => Some(Response::StatusOk),
                    Some(6) => {
                        let cursor = state.active_cursor();
                        let col = cursor.col.min(state.cols.saturating_sub(1));
                        Some(Response::CursorPosition(cursor.row + 1, col + 1))
                    }
                    _ => None,
                };
            }
            (false, false, b'c') => return Some(Response::DeviceAttributes),
            (false, true, b'c') => return Some(Response::SecondaryDeviceAttributes),
            (true, false, b'h') | (true, false, b'l') => {
                let enable = final_byte == b'h';
                for &p in params {
                    state.set_private_mode(p, enable);
                }
            }
            (false, false, b'h') | (false, false, b'l') => {
                let enable = final_byte == b'h';
                for &p in params {
                    match p {
                        4 => state.modes.insert_mode = enable,
                        20 => state.modes.linefeed_newline = enable,
                        _ => {}
                    }
                }
            }
            _ => {
                tracing::trace!(
                    "Unknown CSI: intermediates={:?}, params={:?}, final={:?}",
                    self.intermediates,
                    params,
                    final_byte as char
                );
            }
        }
        None
    }

    fn execute_sgr(params: &[u16], state: &mut TerminalState) {
        if params.is_empty() {
            state.current_attrs.reset();
            return;
        }

        let attrs = &mut state.current_attrs;
        let mut iter = params.iter().copied();

        while let Some(param) = iter.next() {
            match param {
                0 => attrs.reset(),
                1 => attrs.flags |= AttrFlags::BOLD,
                2 => attrs.flags |= AttrFlags::DIM,
                3 => attrs.flags |= AttrFlags::ITALIC,
                4 => attrs.flags |= AttrFlags::UNDERLINE,
                5 => attrs.flags |= AttrFlags::BLINK,
                7 => attrs.flags |= AttrFlags::INVERSE,
                8 => attrs.flags |= AttrFlags::HIDDEN,
                9 => attrs.flags |= AttrFlags::STRIKETHROUGH,
                22 => attrs.flags &= !(AttrFlags::BOLD | AttrFlags::DIM),
                23 => attrs.flags &= !AttrFlags::ITALIC,
                24 => attrs.flags &= !AttrFlags::UNDERLINE,
                25 => attrs.flags &= !AttrFlags::BLINK,
                27 => attrs.flags &= !AttrFlags::INVERSE,
                28 => attrs.flags &= !AttrFlags::HIDDEN,
                29 => attrs.flags &= !AttrFlags::STRIKETHROUGH,
                30..=37 => attrs.fg = Color::Indexed((param - 30) as u8),
                38 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        attrs.fg = color;
                    }
                }
                39 => attrs.fg = Color::Default,
                40..=47 => attrs.bg = Color::Indexed((param - 40) as u8),
                48 => {
                    if let Some(color) = Self::extended_color(&mut iter) {
                        attrs.bg = color;
                    }
                }
                49 => attrs.bg = Color::Default,
                90..=97 => attrs.fg = Color::Indexed((param - 90 + 8) as u8),
                100..=107 => attrs.bg = Color::Indexed((param - 100 + 8) as u8),
                _ => {}
            }
        }
    }

    /// `38;5;n` / `38;2;r;g;b` (and the 48 background forms)
    fn extended_color(iter: &mut impl Iterator<Item = u16>) -> Option<Color> {
        match iter.next()? {
            5 => iter.next().map(|n| Color::Indexed(n as u8)),
            2 => {
                let r = iter.next().unwrap_or(0) as u8;
                let g = iter.next().unwrap_or(0) as u8;
                let b = iter.next().unwrap_or(0) as u8;
                Some(Color::Rgb(r, g, b))
            }
            _ => None,
        }
    }

    fn execute_osc(&mut self, state: &mut TerminalState) {
        let text = String::from_utf8_lossy(&self.osc_bytes);
        if let Some((code, value)) = text.split_once(';') {
            if matches!(code, "0" | "1" | "2") {
                state.title = value.to_string();
            }
        }
        self.osc_bytes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(parser: &mut VtParser, state: &mut TerminalState, bytes: &[u8]) -> Vec<Response> {
        let mut replies = Vec::new();
        parser.advance(bytes, state, &mut replies);
        replies
    }

    #[test]
    fn test_cursor_movement() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, b"\x1b[5;10H");

        assert_eq!(state.active_cursor().row, 4);
        assert_eq!(state.active_cursor().col, 9);
    }

    #[test]
    fn test_sgr_colors() {
        let mut state = TerminalState::new(80, 24);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, b"\x1b[31m");
        assert_eq!(state.current_attrs.fg, Color::Indexed(1));

        run(&mut parser, &mut state, b"\x1b[48;2;1;2;3m");
        assert_eq!(state.current_attrs.bg, Color::Rgb(1, 2, 3));
    }

    #[test]
    fn test_split_utf8_across_calls() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();
        let bytes = "é日".as_bytes();

        for byte in bytes {
            run(&mut parser, &mut state, std::slice::from_ref(byte));
        }

        assert_eq!(state.active_screen().rows[0].text(), "é日");
    }

    #[test]
    fn test_split_escape_across_calls() {
        let mut state = TerminalState::new(10, 4);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, b"\x1b[");
        run(&mut parser, &mut state, b"3;");
        run(&mut parser, &mut state, b"4Hx");

        assert_eq!(state.active_screen().rows[2].text(), "   x");
    }

    #[test]
    fn test_osc_title() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, b"\x1b]0;my shell\x07");
        assert_eq!(state.title, "my shell");

        run(&mut parser, &mut state, b"\x1b]2;other\x1b\\");
        assert_eq!(state.title, "other");
    }

    #[test]
    fn test_cursor_position_report() {
        let mut state = TerminalState::new(10, 4);
        let mut parser = VtParser::new();

        let replies = run(&mut parser, &mut state, b"ab\x1b[6n");

        assert_eq!(replies, vec![Response::CursorPosition(1, 3)]);
        assert_eq!(replies[0].to_bytes(), b"\x1b[1;3R".to_vec());
    }

    #[test]
    fn test_dcs_is_skipped() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, b"\x1bPq#0;2;0;0;0\x1b\\ok");

        assert_eq!(state.active_screen().rows[0].text(), "ok");
    }

    #[test]
    fn test_erase_display_and_line() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, b"hello\r\nworld\x1b[1;3H\x1b[K");
        assert_eq!(state.active_screen().rows[0].text(), "he");

        run(&mut parser, &mut state, b"\x1b[2J");
        assert_eq!(state.dump_viewport(), format!("{}\n{}", " ".repeat(10), " ".repeat(10)));
    }

    #[test]
    fn test_non_ascii_osc_title() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();

        // "本" is E6 9C AC; the middle byte must not end the string
        run(&mut parser, &mut state, "\x1b]2;日本\x07ok".as_bytes());

        assert_eq!(state.title, "日本");
        assert_eq!(state.active_screen().rows[0].text(), "ok");
    }

    #[test]
    fn test_unterminated_osc_is_bounded() {
        let mut state = TerminalState::new(10, 2);
        let mut parser = VtParser::new();

        run(&mut parser, &mut state, b"\x1b]0;");
        let chunk = vec![b'x'; 64 * 1024];
        for _ in 0..16 {
            run(&mut parser, &mut state, &chunk);
        }
        assert!(parser.osc_bytes.len() <= MAX_OSC_LEN);

        run(&mut parser, &mut state, b"\x07ok");
        assert_eq!(state.title.len(), MAX_OSC_LEN - 2);
        assert_eq!(state.active_screen().rows[0].text(), "ok");
    }

    #[test]
    fn test_csi_params_are_capped() {
        let mut state = TerminalState::new(10, 4);
        let mut parser = VtParser::new();

        let mut seq = b"\x1b[2;3".to_vec();
        for _ in 0..10_000 {
            seq.extend_from_slice(b";1");
        }
        seq.extend_from_slice(b"Hx");
        run(&mut parser, &mut state, &seq);

        assert!(parser.params.len() <= MAX_PARAMS);
        assert_eq!(state.active_screen().rows[1].text(), "  x");
    }
}
