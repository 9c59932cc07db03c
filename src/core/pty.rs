//! Process / PTY provider
//!
//! The session only sees [`ProcessProvider`] and [`ProcessHandle`]. Output is
//! delivered as [`ProcessEvent`]s on a bounded channel fed by a reader thread,
//! so events arrive in the order the process produced them.

use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::SyncSender;
use std::thread::{self, JoinHandle};

use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to open pseudo terminal: {0}")]
    Open(String),

    #[error("Failed to spawn process: {0}")]
    Spawn(String),

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to resize PTY: {0}")]
    Resize(String),

    #[error("Failed to kill process: {0}")]
    Kill(#[source] io::Error),

    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// What to run and how large its terminal is
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnOptions {
    pub shell: String,
    pub args: Vec<String>,
    pub cols: u16,
    pub rows: u16,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
}

/// Events posted by the reader thread
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessEvent {
    Data(Vec<u8>),
    /// Output stream closed (process exited or PTY went away)
    Exited,
}

/// A running process
pub trait ProcessHandle: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<()>;

    fn resize(&mut self, cols: u16, rows: u16) -> Result<()>;

    fn kill(&mut self) -> Result<()>;
}

/// Spawns processes, delivering their output to `events`
pub trait ProcessProvider {
    fn spawn(
        &self,
        options: &SpawnOptions,
        events: SyncSender<ProcessEvent>,
    ) -> Result<Box<dyn ProcessHandle>>;
}

/// Provider backed by the platform PTY (`portable-pty`)
#[derive(Clone, Copy, Debug, Default)]
pub struct PortablePtyProvider;

impl ProcessProvider for PortablePtyProvider {
    fn spawn(
        &self,
        options: &SpawnOptions,
        events: SyncSender<ProcessEvent>,
    ) -> Result<Box<dyn ProcessHandle>> {
        Ok(Box::new(PortablePty::open(options, events)?))
    }
}

impl PortablePty {
    fn open(options: &SpawnOptions, events: SyncSender<ProcessEvent>) -> Result<Self> {
        let pty_system = native_pty_system();
        let pair = pty_system
            .openpty(pty_size(options.cols, options.rows))
            .map_err(|e| PtyError::Open(e.to_string()))?;

        let mut cmd = CommandBuilder::new(&options.shell);
        if !options.args.is_empty() {
            cmd.args(options.args.iter().map(|arg| arg.as_str()));
        }
        if let Some(cwd) = &options.cwd {
            cmd.cwd(cwd);
        }
        cmd.env("TERM", "xterm-256color");
        for (key, value) in &options.env {
            cmd.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::Spawn(e.to_string()))?;
        // The slave end belongs to the child now
        drop(pair.slave);

        let reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::Open(e.to_string()))?;
        let writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::Open(e.to_string()))?;

        info!(
            "Spawned '{}' (pid {:?}) at {}x{}",
            options.shell,
            child.process_id(),
            options.cols,
            options.rows
        );

        let reader_thread = thread::Builder::new()
            .name("pty-reader".into())
            .spawn(move || read_loop(reader, events))?;

        Ok(Self {
            master: pair.master,
            writer,
            child,
            reader_thread: Some(reader_thread),
        })
    }
}

fn pty_size(cols: u16, rows: u16) -> PtySize {
    PtySize {
        rows: rows.max(1),
        cols: cols.max(1),
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Reader thread body: forward output until EOF or until the receiver is gone
fn read_loop(mut reader: Box<dyn Read + Send>, events: SyncSender<ProcessEvent>) {
    let mut buffer = [0u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                if events.send(ProcessEvent::Data(buffer[..n].to_vec())).is_err() {
                    debug!("Output receiver dropped, reader exiting");
                    return;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("PTY read ended: {}", e);
                break;
            }
        }
    }
    let _ = events.send(ProcessEvent::Exited);
}

struct PortablePty {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    reader_thread: Option<JoinHandle<()>>,
}

impl ProcessHandle for PortablePty {
    fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).map_err(PtyError::Write)?;
        self.writer.flush().map_err(PtyError::Write)
    }

    fn resize(&mut self, cols: u16, rows: u16) -> Result<()> {
        self.master
            .resize(pty_size(cols, rows))
            .map_err(|e| PtyError::Resize(e.to_string()))
    }

    fn kill(&mut self) -> Result<()> {
        if let Ok(Some(status)) = self.child.try_wait() {
            debug!("Process already exited: {:?}", status);
            return Ok(());
        }
        self.child.kill().map_err(PtyError::Kill)?;
        // Reap it so no zombie is left behind
        match self.child.wait() {
            Ok(status) => debug!("Process killed: {:?}", status),
            Err(e) => warn!("Failed to reap process: {}", e),
        }
        Ok(())
    }
}

impl Drop for PortablePty {
    fn drop(&mut self) {
        if let Err(e) = self.kill() {
            warn!("Failed to kill process on drop: {}", e);
        }
        // The reader only finishes once the PTY closes; don't block on it
        if let Some(handle) = self.reader_thread.take() {
            if handle.is_finished() {
                let _ = handle.join();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_read_loop_forwards_then_exits() {
        let (tx, rx) = mpsc::sync_channel(4);
        let reader: Box<dyn Read + Send> = Box::new(io::Cursor::new(b"hello".to_vec()));

        read_loop(reader, tx);

        assert_eq!(rx.recv().unwrap(), ProcessEvent::Data(b"hello".to_vec()));
        assert_eq!(rx.recv().unwrap(), ProcessEvent::Exited);
    }

    #[test]
    fn test_read_loop_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::sync_channel(1);
        drop(rx);
        let reader: Box<dyn Read + Send> = Box::new(io::Cursor::new(b"ignored".to_vec()));

        // Must return instead of blocking on a full channel
        read_loop(reader, tx);
    }

    #[test]
    fn test_pty_size_never_zero() {
        let size = pty_size(0, 0);
        assert_eq!((size.cols, size.rows), (1, 1));
    }

    #[cfg(unix)]
    #[test]
    fn test_kill_reaps_child() {
        let (tx, _rx) = mpsc::sync_channel(64);
        let options = SpawnOptions {
            shell: "/bin/sh".into(),
            args: vec!["-c".into(), "sleep 30".into()],
            cols: 80,
            rows: 24,
            cwd: None,
            env: Vec::new(),
        };
        let mut pty = PortablePty::open(&options, tx).unwrap();

        pty.kill().unwrap();
        assert!(matches!(pty.child.try_wait(), Ok(Some(_))));

        // Second kill sees the exited child
        pty.kill().unwrap();
    }
}
