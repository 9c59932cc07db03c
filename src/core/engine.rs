//! VT engine contract
//!
//! The session talks to terminal emulation only through [`VtEngine`]. An
//! engine is obtained from an [`EngineProvider`] and held by an
//! [`EngineHandle`], which releases it exactly once.

use thiserror::Error;
use tracing::debug;

use super::term::{TerminalState, VtParser, DEFAULT_SCROLLBACK_LIMIT};

/// Version string reported by the built-in engine
pub const ENGINE_VERSION: &str = concat!("termsession-vt/v", env!("CARGO_PKG_VERSION"));

/// Engine errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("engine handle has been released")]
    HandleInvalid,
    #[error("invalid terminal size {cols}x{rows}")]
    InvalidSize { cols: u16, rows: u16 },
    #[error("engine operation failed: {0}")]
    Failed(String),
}

/// Cursor position relative to the displayed viewport
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CursorSnapshot {
    /// 1-indexed column (0 when invalid)
    pub col: u16,
    /// 1-indexed row (0 when invalid)
    pub row: u16,
    pub valid: bool,
}

impl CursorSnapshot {
    pub fn invalid() -> Self {
        Self { col: 0, row: 0, valid: false }
    }
}

/// Terminal emulation capability
pub trait VtEngine: Send {
    /// Consume process output. Incomplete sequences are buffered until the next call.
    fn feed(&mut self, bytes: &[u8]) -> Result<(), EngineError>;

    /// Reflow to a new grid size
    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), EngineError>;

    /// Move the display window; negative deltas move toward older lines
    fn scroll_viewport(&mut self, delta: i32) -> Result<(), EngineError>;

    /// Text of the display window as fixed-width rows joined by `\n`
    fn dump_viewport(&self) -> String;

    fn cursor_position(&self) -> CursorSnapshot;

    /// Bytes the engine wants written back to the process (status reports)
    fn take_replies(&mut self) -> Vec<u8> {
        Vec::new()
    }

    /// Window title set by the application, if any
    fn title(&self) -> Option<&str> {
        None
    }

    /// Lines between the display window and the live tail, if the engine tracks it
    fn scroll_offset(&self) -> Option<usize> {
        None
    }
}

/// Factory for engines
pub trait EngineProvider {
    fn create(&self, cols: u16, rows: u16) -> Result<Box<dyn VtEngine>, EngineError>;

    fn version(&self) -> &str;
}

/// Owning handle over an engine instance.
///
/// `free` releases the engine; later operations fail with
/// [`EngineError::HandleInvalid`]. Dropping the handle frees it.
pub struct EngineHandle {
    engine: Option<Box<dyn VtEngine>>,
}

impl EngineHandle {
    pub fn create(provider: &dyn EngineProvider, cols: u16, rows: u16) -> Result<Self, EngineError> {
        if cols == 0 || rows == 0 {
            return Err(EngineError::InvalidSize { cols, rows });
        }
        let engine = provider.create(cols, rows)?;
        debug!("Engine created: {}x{} ({})", cols, rows, provider.version());
        Ok(Self { engine: Some(engine) })
    }

    pub fn from_engine(engine: Box<dyn VtEngine>) -> Self {
        Self { engine: Some(engine) }
    }

    pub fn is_live(&self) -> bool {
        self.engine.is_some()
    }

    fn live(&self) -> Result<&dyn VtEngine, EngineError> {
        self.engine.as_deref().ok_or(EngineError::HandleInvalid)
    }

    fn live_mut(&mut self) -> Result<&mut Box<dyn VtEngine>, EngineError> {
        self.engine.as_mut().ok_or(EngineError::HandleInvalid)
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.live_mut()?.feed(bytes)
    }

    pub fn resize(&mut self, cols: u16, rows: u16) -> Result<(), EngineError> {
        let engine = self.live_mut()?;
        if cols == 0 || rows == 0 {
            return Err(EngineError::InvalidSize { cols, rows });
        }
        engine.resize(cols, rows)
    }

    pub fn scroll_viewport(&mut self, delta: i32) -> Result<(), EngineError> {
        self.live_mut()?.scroll_viewport(delta)
    }

    pub fn dump_viewport(&self) -> Result<String, EngineError> {
        Ok(self.live()?.dump_viewport())
    }

    pub fn cursor_position(&self) -> CursorSnapshot {
        match self.live() {
            Ok(engine) => engine.cursor_position(),
            Err(_) => CursorSnapshot::invalid(),
        }
    }

    pub fn take_replies(&mut self) -> Vec<u8> {
        match self.live_mut() {
            Ok(engine) => engine.take_replies(),
            Err(_) => Vec::new(),
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.engine.as_deref().and_then(|e| e.title())
    }

    pub fn scroll_offset(&self) -> Option<usize> {
        self.engine.as_deref().and_then(|e| e.scroll_offset())
    }

    /// Release the engine. Safe to call more than once.
    pub fn free(&mut self) {
        if self.engine.take().is_some() {
            debug!("Engine released");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.free();
    }
}

/// Built-in engine backed by [`TerminalState`]
pub struct BuiltinEngine {
    state: TerminalState,
    parser: VtParser,
    replies: Vec<u8>,
}

impl BuiltinEngine {
    pub fn new(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        Self {
            state: TerminalState::with_scrollback(cols, rows, scrollback_limit),
            parser: VtParser::new(),
            replies: Vec::new(),
        }
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }
}

impl VtEngine for BuiltinEngine {
    fn feed(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        let mut responses = Vec::new();
        self.parser.advance(bytes, &mut self.state, &mut responses);
        for response in responses {
            self.replies.extend_from_slice(&response.to_bytes());
        }
        Ok(())
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<(), EngineError> {
        self.state.resize(cols, rows);
        Ok(())
    }

    fn scroll_viewport(&mut self, delta: i32) -> Result<(), EngineError> {
        self.state.scroll_viewport(delta as i64);
        Ok(())
    }

    fn dump_viewport(&self) -> String {
        self.state.dump_viewport()
    }

    fn cursor_position(&self) -> CursorSnapshot {
        self.state.cursor_snapshot()
    }

    fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.replies)
    }

    fn title(&self) -> Option<&str> {
        if self.state.title.is_empty() {
            None
        } else {
            Some(&self.state.title)
        }
    }

    fn scroll_offset(&self) -> Option<usize> {
        Some(self.state.active_screen().scroll_offset)
    }
}

/// Provider for [`BuiltinEngine`]
#[derive(Clone, Debug)]
pub struct BuiltinEngineProvider {
    pub scrollback_limit: usize,
}

impl Default for BuiltinEngineProvider {
    fn default() -> Self {
        Self {
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
        }
    }
}

impl EngineProvider for BuiltinEngineProvider {
    fn create(&self, cols: u16, rows: u16) -> Result<Box<dyn VtEngine>, EngineError> {
        if cols == 0 || rows == 0 {
            return Err(EngineError::InvalidSize { cols, rows });
        }
        Ok(Box::new(BuiltinEngine::new(cols, rows, self.scrollback_limit)))
    }

    fn version(&self) -> &str {
        ENGINE_VERSION
    }
}

/// Feed a short banner into an 80x24 engine and return what it displays
pub fn render_demo() -> String {
    const DEMO: &str = "termsession VT core wired \u{2705}\r\n\
                        $ printf 'hello from termsession\\n'\r\n\
                        hello from termsession\r\n";

    let mut engine = BuiltinEngine::new(80, 24, DEFAULT_SCROLLBACK_LIMIT);
    match engine.feed(DEMO.as_bytes()) {
        Ok(()) => engine.dump_viewport(),
        Err(e) => format!("Failed to render demo: {}", e),
    }
}
