//! Built-in VT emulation: parser plus screen state

pub mod parser;
pub mod state;

pub use parser::{Response, VtParser};
pub use state::{TerminalState, DEFAULT_SCROLLBACK_LIMIT};
