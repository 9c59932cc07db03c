//! termsession - an embeddable terminal session engine
//!
//! Connects a shell process to a VT state machine and to a display surface:
//! process output is fed to the engine, user input is encoded into bytes or
//! viewport scrolls, and redraws are coalesced to one per frame.

pub mod config;
pub mod core;
pub mod ui;

pub use crate::core::engine::{EngineHandle, EngineProvider, VtEngine, ENGINE_VERSION};
pub use crate::core::session::{Dimensions, Session, SessionError, SessionOptions};
