//! Core terminal session components.
//!
//! - **term**: built-in VT parser and screen state
//! - **engine**: engine contract, owning handle and the built-in engine
//! - **viewport**: scroll-follow state and wheel accumulation
//! - **input**: key/paste/IME encoding
//! - **render**: frame coalescing
//! - **pty**: process provider contract and the portable-pty backend
//! - **session**: orchestrator tying the above together
//!
//! # Architecture
//!
//! ```text
//! Session
//! ├── ProcessHandle (PTY I/O with shell process)
//! │   └── reader thread ──ProcessEvent──▶ bounded mailbox
//! ├── EngineHandle
//! │   └── BuiltinEngine (TerminalState + VtParser)
//! ├── ViewportController
//! ├── InputEncoder
//! └── RenderScheduler
//! ```

pub mod engine;
pub mod input;
pub mod pty;
pub mod render;
pub mod session;
pub mod term;
pub mod viewport;
