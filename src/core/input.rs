//! Input encoding
//!
//! Converts key, paste and IME composition events into either bytes for the
//! process or a viewport scroll. Each event yields at most one action.

use bitflags::bitflags;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tracing::debug;

use super::viewport::ScrollCommand;

bitflags! {
    /// Modifier keys
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        const SHIFT = 0b0001;
        const CTRL  = 0b0010;
        const ALT   = 0b0100;
        const SUPER = 0b1000;
    }
}

impl From<KeyModifiers> for Modifiers {
    fn from(mods: KeyModifiers) -> Self {
        let mut result = Modifiers::empty();
        if mods.contains(KeyModifiers::SHIFT) {
            result |= Modifiers::SHIFT;
        }
        if mods.contains(KeyModifiers::CONTROL) {
            result |= Modifiers::CTRL;
        }
        if mods.contains(KeyModifiers::ALT) {
            result |= Modifiers::ALT;
        }
        if mods.intersects(KeyModifiers::SUPER | KeyModifiers::META) {
            result |= Modifiers::SUPER;
        }
        result
    }
}

/// Logical keys the encoder understands
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Backspace,
    Tab,
    Escape,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    Insert,
    Delete,
    F(u8),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyInput {
    pub key: Key,
    pub mods: Modifiers,
}

impl KeyInput {
    pub fn new(key: Key, mods: Modifiers) -> Self {
        Self { key, mods }
    }

    pub fn plain(key: Key) -> Self {
        Self::new(key, Modifiers::empty())
    }
}

impl TryFrom<&KeyEvent> for KeyInput {
    type Error = ();

    fn try_from(event: &KeyEvent) -> Result<Self, Self::Error> {
        let mut mods = Modifiers::from(event.modifiers);
        let key = match event.code {
            KeyCode::Char(ch) => Key::Char(ch),
            KeyCode::Enter => Key::Enter,
            KeyCode::Backspace => Key::Backspace,
            KeyCode::Tab => Key::Tab,
            KeyCode::BackTab => {
                mods |= Modifiers::SHIFT;
                Key::Tab
            }
            KeyCode::Esc => Key::Escape,
            KeyCode::Up => Key::Up,
            KeyCode::Down => Key::Down,
            KeyCode::Left => Key::Left,
            KeyCode::Right => Key::Right,
            KeyCode::Home => Key::Home,
            KeyCode::End => Key::End,
            KeyCode::PageUp => Key::PageUp,
            KeyCode::PageDown => Key::PageDown,
            KeyCode::Insert => Key::Insert,
            KeyCode::Delete => Key::Delete,
            KeyCode::F(n) => Key::F(n),
            _ => return Err(()),
        };
        Ok(Self { key, mods })
    }
}

/// Events delivered by the host
#[derive(Clone, Debug, PartialEq)]
pub enum InputEvent {
    Key(KeyInput),
    Paste(String),
    CompositionStart,
    CompositionUpdate(String),
    CompositionEnd(String),
}

/// Outcome of encoding one event
#[derive(Clone, Debug, PartialEq)]
pub enum InputAction {
    /// Bytes for the process
    Write(Vec<u8>),
    /// Viewport-only adjustment
    Scroll(ScrollCommand),
    /// Matched no rule or consumed without output
    Ignore,
}

/// IME composition state
#[derive(Debug, Default)]
pub struct Composer {
    active: bool,
    buffer: String,
}

impl Composer {
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn text(&self) -> &str {
        &self.buffer
    }

    fn start(&mut self) {
        self.active = true;
        self.buffer.clear();
    }

    fn update(&mut self, text: &str) {
        self.active = true;
        self.buffer.clear();
        self.buffer.push_str(text);
    }

    /// Finish composing, returning the committed text
    fn finish(&mut self, text: &str) -> String {
        let committed = if text.is_empty() {
            std::mem::take(&mut self.buffer)
        } else {
            text.to_string()
        };
        self.active = false;
        self.buffer.clear();
        committed
    }
}

/// Stateful encoder (the state is the IME composer)
#[derive(Debug, Default)]
pub struct InputEncoder {
    composer: Composer,
}

impl InputEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn composer(&self) -> &Composer {
        &self.composer
    }

    /// Encode one event. `visible_rows` sizes page scrolls.
    pub fn encode(&mut self, event: &InputEvent, visible_rows: u16) -> InputAction {
        match event {
            InputEvent::CompositionStart => {
                self.composer.start();
                InputAction::Ignore
            }
            InputEvent::CompositionUpdate(text) => {
                self.composer.update(text);
                InputAction::Ignore
            }
            InputEvent::CompositionEnd(text) => {
                let committed = self.composer.finish(text);
                if committed.is_empty() {
                    InputAction::Ignore
                } else {
                    InputAction::Write(committed.into_bytes())
                }
            }
            InputEvent::Paste(text) => {
                if text.is_empty() {
                    return InputAction::Ignore;
                }
                if self.composer.is_active() {
                    debug!("Paste during composition, writing {} bytes", text.len());
                }
                InputAction::Write(text.as_bytes().to_vec())
            }
            // Keystrokes belong to the composition while it is open
            InputEvent::Key(_) if self.composer.is_active() => InputAction::Ignore,
            InputEvent::Key(input) => Self::encode_key(input, visible_rows),
        }
    }

    /// Encode a key outside of composition
    pub fn encode_key(input: &KeyInput, visible_rows: u16) -> InputAction {
        if let Some(command) = Self::scroll_command(input, visible_rows) {
            return InputAction::Scroll(command);
        }
        match Self::key_bytes(input) {
            Some(bytes) if !bytes.is_empty() => InputAction::Write(bytes),
            _ => InputAction::Ignore,
        }
    }

    fn scroll_command(input: &KeyInput, visible_rows: u16) -> Option<ScrollCommand> {
        let page = visible_rows.saturating_sub(1).max(1) as i32;
        let shift_only = input.mods == Modifiers::SHIFT;
        let page_mods = input.mods.is_empty() || shift_only;

        match input.key {
            Key::PageUp if page_mods => Some(ScrollCommand::Lines(-page)),
            Key::PageDown if page_mods => Some(ScrollCommand::Lines(page)),
            Key::Up if shift_only => Some(ScrollCommand::Lines(-1)),
            Key::Down if shift_only => Some(ScrollCommand::Lines(1)),
            Key::Home if shift_only => Some(ScrollCommand::Top),
            Key::End if shift_only => Some(ScrollCommand::Bottom),
            _ => None,
        }
    }

    fn key_bytes(input: &KeyInput) -> Option<Vec<u8>> {
        let mods = input.mods;

        if mods.contains(Modifiers::SUPER) {
            return Self::super_key(input.key);
        }

        let word_mod = mods.intersects(Modifiers::ALT | Modifiers::CTRL) && !mods.contains(Modifiers::SHIFT);

        match input.key {
            Key::Char(ch) => Some(Self::map_char(ch, mods)),
            Key::Enter => Some(vec![0x0D]),
            // Delete word
            Key::Backspace if word_mod => Some(vec![0x17]),
            Key::Backspace => Some(vec![0x7F]),
            Key::Tab => {
                if mods.contains(Modifiers::SHIFT) {
                    Some(b"\x1b[Z".to_vec())
                } else {
                    Some(vec![0x09])
                }
            }
            Key::Escape => Some(vec![0x1B]),
            // Word navigation
            Key::Left if word_mod => Some(b"\x1bb".to_vec()),
            Key::Right if word_mod => Some(b"\x1bf".to_vec()),
            Key::Up => Some(Self::csi_key(b'A', mods)),
            Key::Down => Some(Self::csi_key(b'B', mods)),
            Key::Right => Some(Self::csi_key(b'C', mods)),
            Key::Left => Some(Self::csi_key(b'D', mods)),
            Key::Home => Some(Self::csi_key(b'H', mods)),
            Key::End => Some(Self::csi_key(b'F', mods)),
            Key::PageUp => Some(Self::tilde_key(5, mods)),
            Key::PageDown => Some(Self::tilde_key(6, mods)),
            Key::Insert => Some(Self::tilde_key(2, mods)),
            // Delete word forward
            Key::Delete if mods == Modifiers::ALT => Some(b"\x1bd".to_vec()),
            Key::Delete => Some(Self::tilde_key(3, mods)),
            Key::F(n) => Self::function_key(n, mods),
        }
    }

    /// Line-editing shortcuts on the platform "command" modifier
    fn super_key(key: Key) -> Option<Vec<u8>> {
        match key {
            // Beginning / end of line
            Key::Left => Some(vec![0x01]),
            Key::Right => Some(vec![0x05]),
            // Kill to start / end of line
            Key::Backspace => Some(vec![0x15]),
            Key::Delete => Some(vec![0x0B]),
            // Clear screen
            Key::Char('k') | Key::Char('K') => Some(vec![0x0C]),
            _ => None,
        }
    }

    /// Map a character with modifiers
    fn map_char(ch: char, mods: Modifiers) -> Vec<u8> {
        let ctrl = mods.contains(Modifiers::CTRL);
        let alt = mods.contains(Modifiers::ALT);

        if ctrl {
            if let Some(code) = Self::control_code(ch) {
                return if alt { vec![0x1B, code] } else { vec![code] };
            }
        }

        let mut bytes = Vec::with_capacity(ch.len_utf8() + 1);
        // Alt + key = ESC + key
        if alt {
            bytes.push(0x1B);
        }
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
        bytes
    }

    /// C0 code for Ctrl+`ch`
    fn control_code(ch: char) -> Option<u8> {
        if ch.is_ascii_alphabetic() {
            return Some(ch.to_ascii_uppercase() as u8 - b'A' + 1);
        }
        match ch {
            '@' | '`' | ' ' | '2' => Some(0x00),
            '[' | '3' => Some(0x1B),
            '\\' | '4' => Some(0x1C),
            ']' | '5' => Some(0x1D),
            '^' | '~' | '6' => Some(0x1E),
            '_' | '?' | '7' => Some(0x1F),
            _ => None,
        }
    }

    /// ESC [ <key>, or ESC [ 1 ; <mod> <key> when modified
    fn csi_key(key: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            vec![0x1B, b'[', key]
        } else {
            format!("\x1b[1;{}{}", Self::modifier_code(mods), key as char).into_bytes()
        }
    }

    /// Tilde key sequence (PageUp, PageDown, Insert, Delete)
    fn tilde_key(code: u8, mods: Modifiers) -> Vec<u8> {
        if mods.is_empty() {
            format!("\x1b[{}~", code).into_bytes()
        } else {
            format!("\x1b[{};{}~", code, Self::modifier_code(mods)).into_bytes()
        }
    }

    fn function_key(n: u8, mods: Modifiers) -> Option<Vec<u8>> {
        let code = match n {
            1..=4 => {
                let key = b"PQRS"[(n - 1) as usize];
                return Some(if mods.is_empty() {
                    vec![0x1B, b'O', key]
                } else {
                    format!("\x1b[1;{}{}", Self::modifier_code(mods), key as char).into_bytes()
                });
            }
            5 => 15,
            6 => 17,
            7 => 18,
            8 => 19,
            9 => 20,
            10 => 21,
            11 => 23,
            12 => 24,
            _ => return None,
        };
        Some(Self::tilde_key(code, mods))
    }

    /// xterm modifier parameter
    fn modifier_code(mods: Modifiers) -> u8 {
        1 + if mods.contains(Modifiers::SHIFT) { 1 } else { 0 }
            + if mods.contains(Modifiers::ALT) { 2 } else { 0 }
            + if mods.contains(Modifiers::CTRL) { 4 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(key: Key, mods: Modifiers) -> InputEvent {
        InputEvent::Key(KeyInput::new(key, mods))
    }

    fn encode(event: InputEvent) -> InputAction {
        InputEncoder::new().encode(&event, 24)
    }

    #[test]
    fn test_char_keys() {
        assert_eq!(encode(key(Key::Char('a'), Modifiers::empty())), InputAction::Write(b"a".to_vec()));
        assert_eq!(encode(key(Key::Char('c'), Modifiers::CTRL)), InputAction::Write(vec![0x03]));
        assert_eq!(encode(key(Key::Char('C'), Modifiers::CTRL)), InputAction::Write(vec![0x03]));
        assert_eq!(encode(key(Key::Char('x'), Modifiers::ALT)), InputAction::Write(vec![0x1B, b'x']));
        assert_eq!(encode(key(Key::Char('['), Modifiers::CTRL)), InputAction::Write(vec![0x1B]));
        assert_eq!(
            encode(key(Key::Char('\u{e9}'), Modifiers::empty())),
            InputAction::Write("\u{e9}".as_bytes().to_vec())
        );
    }

    #[test]
    fn test_control_keys() {
        assert_eq!(encode(key(Key::Enter, Modifiers::empty())), InputAction::Write(vec![0x0D]));
        assert_eq!(encode(key(Key::Backspace, Modifiers::empty())), InputAction::Write(vec![0x7F]));
        assert_eq!(encode(key(Key::Tab, Modifiers::SHIFT)), InputAction::Write(b"\x1b[Z".to_vec()));
        assert_eq!(encode(key(Key::Delete, Modifiers::empty())), InputAction::Write(b"\x1b[3~".to_vec()));
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(encode(key(Key::Up, Modifiers::empty())), InputAction::Write(b"\x1b[A".to_vec()));
        assert_eq!(encode(key(Key::Left, Modifiers::empty())), InputAction::Write(b"\x1b[D".to_vec()));
        assert_eq!(
            encode(key(Key::Up, Modifiers::CTRL)),
            InputAction::Write(b"\x1b[1;5A".to_vec())
        );
    }

    #[test]
    fn test_function_keys() {
        assert_eq!(encode(key(Key::F(1), Modifiers::empty())), InputAction::Write(b"\x1bOP".to_vec()));
        assert_eq!(encode(key(Key::F(5), Modifiers::empty())), InputAction::Write(b"\x1b[15~".to_vec()));
        assert_eq!(encode(key(Key::F(5), Modifiers::SHIFT)), InputAction::Write(b"\x1b[15;2~".to_vec()));
        assert_eq!(encode(key(Key::F(13), Modifiers::empty())), InputAction::Ignore);
    }

    #[test]
    fn test_word_and_line_editing() {
        assert_eq!(encode(key(Key::Left, Modifiers::ALT)), InputAction::Write(b"\x1bb".to_vec()));
        assert_eq!(encode(key(Key::Right, Modifiers::CTRL)), InputAction::Write(b"\x1bf".to_vec()));
        assert_eq!(encode(key(Key::Backspace, Modifiers::ALT)), InputAction::Write(vec![0x17]));
        assert_eq!(encode(key(Key::Delete, Modifiers::ALT)), InputAction::Write(b"\x1bd".to_vec()));
        assert_eq!(encode(key(Key::Left, Modifiers::SUPER)), InputAction::Write(vec![0x01]));
        assert_eq!(encode(key(Key::Right, Modifiers::SUPER)), InputAction::Write(vec![0x05]));
        assert_eq!(encode(key(Key::Backspace, Modifiers::SUPER)), InputAction::Write(vec![0x15]));
        assert_eq!(encode(key(Key::Delete, Modifiers::SUPER)), InputAction::Write(vec![0x0B]));
        assert_eq!(encode(key(Key::Char('k'), Modifiers::SUPER)), InputAction::Write(vec![0x0C]));
        assert_eq!(encode(key(Key::Char('c'), Modifiers::SUPER)), InputAction::Ignore);
    }

    #[test]
    fn test_scroll_keys() {
        assert_eq!(
            encode(key(Key::PageUp, Modifiers::empty())),
            InputAction::Scroll(ScrollCommand::Lines(-23))
        );
        assert_eq!(
            encode(key(Key::PageDown, Modifiers::SHIFT)),
            InputAction::Scroll(ScrollCommand::Lines(23))
        );
        assert_eq!(
            encode(key(Key::Up, Modifiers::SHIFT)),
            InputAction::Scroll(ScrollCommand::Lines(-1))
        );
        assert_eq!(
            encode(key(Key::Home, Modifiers::SHIFT)),
            InputAction::Scroll(ScrollCommand::Top)
        );
        assert_eq!(
            encode(key(Key::End, Modifiers::SHIFT)),
            InputAction::Scroll(ScrollCommand::Bottom)
        );
        // Tiny viewports still page by one line
        assert_eq!(
            InputEncoder::new().encode(&key(Key::PageUp, Modifiers::empty()), 1),
            InputAction::Scroll(ScrollCommand::Lines(-1))
        );
    }

    #[test]
    fn test_paste_is_verbatim() {
        let text = "echo \x1b[31m\r\nhi";
        assert_eq!(
            encode(InputEvent::Paste(text.to_string())),
            InputAction::Write(text.as_bytes().to_vec())
        );
    }

    #[test]
    fn test_composition_writes_once() {
        let mut encoder = InputEncoder::new();

        assert_eq!(encoder.encode(&InputEvent::CompositionStart, 24), InputAction::Ignore);
        assert_eq!(
            encoder.encode(&InputEvent::CompositionUpdate("k".into()), 24),
            InputAction::Ignore
        );
        assert_eq!(
            encoder.encode(&key(Key::Char('a'), Modifiers::empty()), 24),
            InputAction::Ignore
        );
        assert_eq!(
            encoder.encode(&InputEvent::CompositionUpdate("\u{304b}".into()), 24),
            InputAction::Ignore
        );
        assert!(encoder.composer().is_active());
        assert_eq!(encoder.composer().text(), "\u{304b}");

        assert_eq!(
            encoder.encode(&InputEvent::CompositionEnd("\u{304b}".into()), 24),
            InputAction::Write("\u{304b}".as_bytes().to_vec())
        );
        assert!(!encoder.composer().is_active());

        assert_eq!(
            encoder.encode(&key(Key::Char('a'), Modifiers::empty()), 24),
            InputAction::Write(b"a".to_vec())
        );
    }

    #[test]
    fn test_paste_during_composition_is_written() {
        let mut encoder = InputEncoder::new();
        encoder.encode(&InputEvent::CompositionStart, 24);
        encoder.encode(&InputEvent::CompositionUpdate("ka".into()), 24);

        assert_eq!(
            encoder.encode(&InputEvent::Paste("echo hi".into()), 24),
            InputAction::Write(b"echo hi".to_vec())
        );
        // The open composition is untouched
        assert!(encoder.composer().is_active());
        assert_eq!(encoder.composer().text(), "ka");
    }

    #[test]
    fn test_composition_end_uses_buffer_when_empty() {
        let mut encoder = InputEncoder::new();
        encoder.encode(&InputEvent::CompositionStart, 24);
        encoder.encode(&InputEvent::CompositionUpdate("ni".into()), 24);

        assert_eq!(
            encoder.encode(&InputEvent::CompositionEnd(String::new()), 24),
            InputAction::Write(b"ni".to_vec())
        );
    }

    #[test]
    fn test_from_crossterm_event() {
        let event = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let input = KeyInput::try_from(&event).unwrap();
        assert_eq!(input, KeyInput::new(Key::Char('c'), Modifiers::CTRL));

        let event = KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT);
        let input = KeyInput::try_from(&event).unwrap();
        assert_eq!(input, KeyInput::new(Key::Tab, Modifiers::SHIFT));
    }
}
