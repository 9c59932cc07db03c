//! Display side of a session.
//!
//! - **surface**: the `DisplaySurface` contract and pixel geometry
//! - **view**: `TerminalView`, forwarding host events to a session
//! - **renderer**: console surface built on crossterm

pub mod renderer;
pub mod surface;
pub mod view;

pub use renderer::CrosstermSurface;
pub use surface::{CursorPixel, DisplaySurface, Frame, SurfaceMetrics};
pub use view::TerminalView;
