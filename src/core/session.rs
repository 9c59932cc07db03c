//! Session management
//!
//! A [`Session`] ties one VT engine to one child process and serializes every
//! operation on them: process output, user input, resizes and frame ticks all
//! enter through `&mut self` on the host's event loop thread.

use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use super::engine::{CursorSnapshot, EngineError, EngineHandle, EngineProvider};
use super::input::{InputAction, InputEncoder, InputEvent};
use super::pty::{ProcessEvent, ProcessHandle, ProcessProvider, PtyError, SpawnOptions};
use super::render::RenderScheduler;
use super::viewport::{ScrollCommand, ViewportController};

/// Smallest grid a session will ever use
pub const MIN_DIMENSION: u16 = 2;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("terminal engine unavailable")]
    EngineUnavailable,

    #[error("failed to start process: {0}")]
    ProcessSpawnFailed(#[source] PtyError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Grid size in character cells
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dimensions {
    pub cols: u16,
    pub rows: u16,
}

impl Dimensions {
    /// Build from possibly out-of-range values, clamping each side to at least 2
    pub fn clamped(cols: i64, rows: i64) -> Self {
        let clamp = |v: i64| v.clamp(MIN_DIMENSION as i64, u16::MAX as i64) as u16;
        Self {
            cols: clamp(cols),
            rows: clamp(rows),
        }
    }
}

/// Per-session settings
#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub shell: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Return to the live tail when input is sent to the process
    pub scroll_on_input: bool,
    pub mailbox_capacity: usize,
    pub frame_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            scroll_on_input: true,
            mailbox_capacity: 256,
            frame_interval: Duration::from_millis(16),
        }
    }
}

/// What the display should show after a frame tick
#[derive(Clone, Debug, PartialEq)]
pub enum RenderOutput {
    Screen(Snapshot),
    /// The session ended; show this message instead of a grid
    Ended(String),
}

/// Viewport contents at one frame
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub text: String,
    /// None when the cursor is off-screen or the view is scrolled back
    pub cursor: Option<CursorSnapshot>,
    pub dimensions: Dimensions,
}

#[derive(Clone, Debug, PartialEq)]
enum Lifecycle {
    Running,
    Ended(String),
    Stopped,
}

/// One terminal session
pub struct Session {
    engine: EngineHandle,
    process: Option<Box<dyn ProcessHandle>>,
    output_rx: Option<Receiver<ProcessEvent>>,
    dimensions: Dimensions,
    viewport: ViewportController,
    encoder: InputEncoder,
    scheduler: RenderScheduler,
    scroll_on_input: bool,
    lifecycle: Lifecycle,
}

impl Session {
    /// Create the engine, spawn the process and subscribe to its output
    pub fn start(
        options: &SessionOptions,
        dimensions: Dimensions,
        engines: Option<&dyn EngineProvider>,
        processes: &dyn ProcessProvider,
    ) -> Result<Self, SessionError> {
        let dimensions = Dimensions::clamped(dimensions.cols as i64, dimensions.rows as i64);
        let provider = engines.ok_or(SessionError::EngineUnavailable)?;
        let engine = EngineHandle::create(provider, dimensions.cols, dimensions.rows)?;

        let (tx, rx) = mpsc::sync_channel(options.mailbox_capacity.max(1));
        let spawn = SpawnOptions {
            shell: options.shell.clone(),
            args: options.args.clone(),
            cols: dimensions.cols,
            rows: dimensions.rows,
            cwd: options.cwd.clone(),
            env: options.env.clone(),
        };
        let process = processes
            .spawn(&spawn, tx)
            .map_err(SessionError::ProcessSpawnFailed)?;

        info!(
            "Session started: {} at {}x{}",
            options.shell, dimensions.cols, dimensions.rows
        );

        let mut scheduler = RenderScheduler::new(options.frame_interval);
        scheduler.request();

        Ok(Self {
            engine,
            process: Some(process),
            output_rx: Some(rx),
            dimensions,
            viewport: ViewportController::new(),
            encoder: InputEncoder::new(),
            scheduler,
            scroll_on_input: options.scroll_on_input,
            lifecycle: Lifecycle::Running,
        })
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == Lifecycle::Running
    }

    pub fn dimensions(&self) -> Dimensions {
        self.dimensions
    }

    pub fn auto_scroll(&self) -> bool {
        self.viewport.auto_scroll()
    }

    pub fn viewport(&self) -> &ViewportController {
        &self.viewport
    }

    pub fn title(&self) -> Option<&str> {
        self.engine.title()
    }

    /// Message shown once the process has gone away
    pub fn exit_message(&self) -> Option<&str> {
        match &self.lifecycle {
            Lifecycle::Ended(message) => Some(message.as_str()),
            _ => None,
        }
    }

    pub fn render_pending(&self) -> bool {
        self.scheduler.is_pending()
    }

    /// Drain the output mailbox (non-blocking). Returns true if anything arrived.
    pub fn pump(&mut self) -> bool {
        let mut events = Vec::new();
        let mut disconnected = false;

        if let Some(rx) = &self.output_rx {
            loop {
                match rx.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }

        let received = !events.is_empty();
        for event in events {
            match event {
                ProcessEvent::Data(bytes) => self.on_process_data(&bytes),
                ProcessEvent::Exited => {
                    self.on_process_exit("Process exited");
                    return true;
                }
            }
        }
        if disconnected && self.is_running() {
            self.on_process_exit("Process output closed");
            return true;
        }
        received
    }

    /// Feed process output to the engine
    pub fn on_process_data(&mut self, bytes: &[u8]) {
        if !self.is_running() {
            return;
        }
        if let Err(e) = self.engine.feed(bytes) {
            warn!("Engine feed failed: {}", e);
            return;
        }

        let replies = self.engine.take_replies();
        if !replies.is_empty() {
            self.write_to_process(&replies);
        }

        if !self.viewport.auto_scroll() {
            if let Some(offset) = self.engine.scroll_offset() {
                self.viewport.sync_offset(offset);
            }
        }
        self.scheduler.request();
    }

    pub fn on_resize(&mut self, dimensions: Dimensions) {
        if !self.is_running() {
            return;
        }
        let dimensions = Dimensions::clamped(dimensions.cols as i64, dimensions.rows as i64);
        if dimensions == self.dimensions {
            return;
        }
        debug!(
            "Resize {}x{} -> {}x{}",
            self.dimensions.cols, self.dimensions.rows, dimensions.cols, dimensions.rows
        );

        if let Err(e) = self.engine.resize(dimensions.cols, dimensions.rows) {
            warn!("Engine resize failed: {}", e);
        }
        if let Some(process) = self.process.as_mut() {
            if let Err(e) = process.resize(dimensions.cols, dimensions.rows) {
                warn!("Process resize failed: {}", e);
            }
        }
        self.dimensions = dimensions;
        self.sync_viewport();
        self.scheduler.request();
    }

    /// Route one input event to the process or the viewport
    pub fn on_input(&mut self, event: &InputEvent) {
        if !self.is_running() {
            return;
        }
        match self.encoder.encode(event, self.dimensions.rows) {
            InputAction::Write(bytes) => {
                if self.scroll_on_input && !self.viewport.auto_scroll() {
                    self.on_scroll(ScrollCommand::Bottom);
                }
                self.write_to_process(&bytes);
            }
            InputAction::Scroll(command) => self.on_scroll(command),
            InputAction::Ignore => trace!("Input ignored: {:?}", event),
        }
    }

    pub fn on_scroll(&mut self, command: ScrollCommand) {
        if !self.is_running() {
            return;
        }
        if let Some(delta) = self.viewport.apply(command) {
            self.scroll_engine(delta);
        }
    }

    /// Wheel movement in pixels (positive = toward newer output)
    pub fn on_wheel(&mut self, delta_y: f64, glyph_height: f64) {
        if !self.is_running() {
            return;
        }
        if let Some(delta) = self.viewport.wheel(delta_y, glyph_height) {
            self.scroll_engine(delta);
        }
    }

    fn scroll_engine(&mut self, delta: i32) {
        if let Err(e) = self.engine.scroll_viewport(delta) {
            warn!("Engine scroll failed: {}", e);
            return;
        }
        self.sync_viewport();
        self.scheduler.request();
    }

    fn sync_viewport(&mut self) {
        if let Some(offset) = self.engine.scroll_offset() {
            self.viewport.sync_offset(offset);
        }
    }

    /// Produce at most one frame if a render is pending and a frame is due
    pub fn on_frame_tick(&mut self, now: Instant) -> Option<RenderOutput> {
        if !self.scheduler.poll(now) {
            return None;
        }
        match &self.lifecycle {
            Lifecycle::Running => {}
            Lifecycle::Ended(message) => return Some(RenderOutput::Ended(message.clone())),
            Lifecycle::Stopped => return None,
        }

        let text = match self.engine.dump_viewport() {
            Ok(text) => text,
            Err(e) => {
                debug!("Skipping frame: {}", e);
                return None;
            }
        };
        let cursor = self.engine.cursor_position();
        let cursor = (cursor.valid && self.viewport.auto_scroll()).then_some(cursor);

        Some(RenderOutput::Screen(Snapshot {
            text,
            cursor,
            dimensions: self.dimensions,
        }))
    }

    /// Time the host may sleep before the next useful frame tick
    pub fn time_until_frame(&self, now: Instant) -> Duration {
        self.scheduler.time_until_frame(now)
    }

    fn write_to_process(&mut self, bytes: &[u8]) {
        let Some(process) = self.process.as_mut() else {
            return;
        };
        if let Err(e) = process.write(bytes) {
            warn!("Write to process failed: {}", e);
        }
    }

    fn on_process_exit(&mut self, message: &str) {
        info!("{}", message);
        self.release();
        self.lifecycle = Lifecycle::Ended(message.to_string());
        self.scheduler.request();
    }

    /// Release the engine, the output subscription and the process
    fn release(&mut self) {
        self.output_rx = None;
        self.engine.free();
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.kill() {
                warn!("Failed to kill process: {}", e);
            }
        }
    }

    /// End the session. Calling it again is a no-op.
    pub fn stop(&mut self) {
        if self.lifecycle == Lifecycle::Stopped {
            return;
        }
        debug!("Session stopped");
        self.release();
        self.lifecycle = Lifecycle::Stopped;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
