//! Terminal view
//!
//! Thin adapter between a host surface and a [`Session`]: it forwards host
//! events and presents frames, and shows a placeholder when the session
//! could not start or has ended.

use std::io;
use std::time::Instant;

use tracing::{error, info};

use crate::core::engine::EngineProvider;
use crate::core::input::InputEvent;
use crate::core::pty::ProcessProvider;
use crate::core::session::{RenderOutput, Session, SessionError, SessionOptions};
use crate::core::viewport::ScrollCommand;

use super::surface::{DisplaySurface, Frame};

pub const ENGINE_UNAVAILABLE_MESSAGE: &str = "Terminal engine unavailable";

pub struct TerminalView<S: DisplaySurface> {
    surface: S,
    session: Option<Session>,
    /// Message to draw on the next tick
    placeholder: Option<String>,
}

impl<S: DisplaySurface> TerminalView<S> {
    /// Size a session to the surface and start it
    pub fn open(
        surface: S,
        options: &SessionOptions,
        engines: Option<&dyn EngineProvider>,
        processes: &dyn ProcessProvider,
    ) -> Self {
        let dimensions = surface.metrics().dimensions();
        let (session, placeholder) = match Session::start(options, dimensions, engines, processes) {
            Ok(session) => (Some(session), None),
            Err(SessionError::EngineUnavailable) => {
                info!("No terminal engine, showing placeholder");
                (None, Some(ENGINE_UNAVAILABLE_MESSAGE.to_string()))
            }
            Err(e) => {
                error!("Failed to start session: {}", e);
                (None, Some(e.to_string()))
            }
        };
        Self {
            surface,
            session,
            placeholder,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether a live session is attached
    pub fn is_alive(&self) -> bool {
        self.session.as_ref().is_some_and(Session::is_running)
    }

    pub fn title(&self) -> Option<&str> {
        self.session.as_ref().and_then(Session::title)
    }

    pub fn handle_input(&mut self, event: &InputEvent) {
        if let Some(session) = self.session.as_mut() {
            session.on_input(event);
        }
    }

    pub fn handle_scroll(&mut self, command: ScrollCommand) {
        if let Some(session) = self.session.as_mut() {
            session.on_scroll(command);
        }
    }

    /// Wheel delta in surface pixels (positive = toward newer output)
    pub fn handle_wheel(&mut self, delta_y: f64) {
        let glyph_height = self.surface.metrics().glyph_height;
        if let Some(session) = self.session.as_mut() {
            session.on_wheel(delta_y, glyph_height);
        }
    }

    /// Surface geometry changed
    pub fn handle_resize(&mut self) {
        let dimensions = self.surface.metrics().dimensions();
        if let Some(session) = self.session.as_mut() {
            session.on_resize(dimensions);
        }
    }

    /// Drain process output. Returns true if anything arrived.
    pub fn pump(&mut self) -> bool {
        self.session.as_mut().is_some_and(Session::pump)
    }

    /// Present a frame if one is due
    pub fn tick(&mut self, now: Instant) -> io::Result<bool> {
        if let Some(message) = self.placeholder.take() {
            self.surface.show_placeholder(&message)?;
            return Ok(true);
        }
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };

        match session.on_frame_tick(now) {
            Some(RenderOutput::Screen(snapshot)) => {
                let metrics = self.surface.metrics();
                let frame = Frame {
                    cursor: snapshot.cursor.and_then(|c| metrics.cursor_origin(c)),
                    text: snapshot.text,
                    title: session.title().map(str::to_string),
                    scroll_offset: if session.auto_scroll() {
                        0
                    } else {
                        session.viewport().scroll_offset()
                    },
                };
                self.surface.present(&frame)?;
                Ok(true)
            }
            Some(RenderOutput::Ended(message)) => {
                self.surface.show_placeholder(&message)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Host view closed
    pub fn close(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::engine::BuiltinEngineProvider;
    use crate::core::input::{Key, KeyInput, Modifiers};
    use crate::core::pty::ProcessEvent;
    use crate::core::session::tests::FakeProvider;
    use crate::ui::surface::SurfaceMetrics;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingSurface {
        width: f64,
        frames: Vec<Frame>,
        placeholders: Vec<String>,
    }

    impl DisplaySurface for RecordingSurface {
        fn metrics(&self) -> SurfaceMetrics {
            SurfaceMetrics {
                width: self.width,
                height: 100.0,
                glyph_width: 10.0,
                glyph_height: 20.0,
                chrome_height: 0.0,
            }
        }

        fn present(&mut self, frame: &Frame) -> io::Result<()> {
            self.frames.push(frame.clone());
            Ok(())
        }

        fn show_placeholder(&mut self, message: &str) -> io::Result<()> {
            self.placeholders.push(message.to_string());
            Ok(())
        }
    }

    fn options() -> SessionOptions {
        SessionOptions {
            frame_interval: Duration::ZERO,
            ..Default::default()
        }
    }

    fn open(provider: &FakeProvider) -> TerminalView<RecordingSurface> {
        let surface = RecordingSurface {
            width: 200.0,
            ..Default::default()
        };
        TerminalView::open(surface, &options(), Some(&BuiltinEngineProvider::default()), provider)
    }

    #[test]
    fn test_placeholder_without_engine() {
        let provider = FakeProvider::default();
        let mut view = TerminalView::open(RecordingSurface::default(), &options(), None, &provider);

        assert!(!view.is_alive());
        assert!(view.tick(Instant::now()).unwrap());
        assert_eq!(view.surface().placeholders, vec![ENGINE_UNAVAILABLE_MESSAGE.to_string()]);

        // Events are harmless without a session
        view.handle_input(&InputEvent::Paste("x".into()));
        view.handle_wheel(-100.0);
        assert!(!view.tick(Instant::now()).unwrap());
    }

    #[test]
    fn test_spawn_failure_shows_message() {
        let provider = FakeProvider {
            fail: true,
            ..Default::default()
        };
        let mut view = open(&provider);

        view.tick(Instant::now()).unwrap();
        assert!(view.surface().placeholders[0].contains("no such shell"));
    }

    #[test]
    fn test_frame_cursor_in_pixels() {
        let provider = FakeProvider::default();
        let mut view = open(&provider);

        provider.emit(ProcessEvent::Data(b"hello\r\nab".to_vec()));
        view.pump();
        view.tick(Instant::now()).unwrap();

        let frame = view.surface().frames.last().unwrap();
        assert!(frame.text.starts_with("hello"));
        assert_eq!(frame.cursor.map(|c| (c.x, c.y)), Some((20.0, 20.0)));
        assert_eq!(frame.scroll_offset, 0);
    }

    #[test]
    fn test_cursor_hidden_when_scrolled_back() {
        let provider = FakeProvider::default();
        let mut view = open(&provider);
        for i in 0..20 {
            provider.emit(ProcessEvent::Data(format!("{}\r\n", i).into_bytes()));
        }
        view.pump();

        view.handle_wheel(-40.0);
        view.tick(Instant::now()).unwrap();

        let frame = view.surface().frames.last().unwrap();
        assert_eq!(frame.cursor, None);
        assert_eq!(frame.scroll_offset, 2);
    }

    #[test]
    fn test_input_reaches_process() {
        let provider = FakeProvider::default();
        let mut view = open(&provider);

        view.handle_input(&InputEvent::Key(KeyInput::new(Key::Char('d'), Modifiers::CTRL)));
        assert_eq!(provider.written(), vec![0x04]);
    }

    #[test]
    fn test_resize_follows_surface() {
        let provider = FakeProvider::default();
        let mut view = open(&provider);
        assert_eq!(view.session().unwrap().dimensions().cols, 20);

        view.surface.width = 405.0;
        view.handle_resize();
        assert_eq!(view.session().unwrap().dimensions().cols, 40);
        assert_eq!(provider.log.lock().unwrap().resized, vec![(40, 5)]);
    }

    #[test]
    fn test_close_stops_session() {
        let provider = FakeProvider::default();
        let mut view = open(&provider);
        view.close();
        view.close();

        assert!(!view.is_alive());
        assert_eq!(provider.log.lock().unwrap().kills, 1);
    }

    #[test]
    fn test_process_exit_shows_message() {
        let provider = FakeProvider::default();
        let mut view = open(&provider);
        view.tick(Instant::now()).unwrap();

        provider.emit(ProcessEvent::Exited);
        view.pump();
        view.tick(Instant::now()).unwrap();

        assert_eq!(view.surface().placeholders, vec!["Process exited".to_string()]);
    }
}
