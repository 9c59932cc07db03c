//! termsession - run a shell inside the terminal session engine
//!
//! Hosts one [`TerminalView`] in the current console: the shell runs on a
//! PTY, its output goes through the VT engine, and frames are drawn with
//! crossterm.
//!
//! # Keys
//!
//! | Key | Action |
//! |-----|--------|
//! | PageUp / PageDown | Scroll one page |
//! | Shift+Up / Shift+Down | Scroll one line |
//! | Shift+Home / Shift+End | Jump to oldest line / live tail |
//! | Ctrl+Shift+V | Paste from clipboard |

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEventKind};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use termsession::config::Config;
use termsession::core::engine::{render_demo, EngineProvider, ENGINE_VERSION};
use termsession::core::input::{InputEvent, KeyInput};
use termsession::core::pty::PortablePtyProvider;
use termsession::ui::{CrosstermSurface, TerminalView};

/// Command line options
#[derive(Debug, Default)]
struct CliArgs {
    /// Shell command (overrides config.toml)
    shell: Option<String>,
    /// Print the engine demo and exit
    demo: bool,
    /// Start without a VT engine
    no_engine: bool,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wheel notch in surface units (one console row per line)
const WHEEL_NOTCH: f64 = 3.0;

fn print_version() {
    eprintln!("termsession {} ({})", VERSION, ENGINE_VERSION);
}

fn print_help() {
    eprintln!("termsession {} - terminal session engine", VERSION);
    eprintln!();
    eprintln!("Usage: termsession [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -s, --shell <CMD>     Shell to run (default: config.toml, $SHELL, /bin/sh)");
    eprintln!("      --demo            Render the engine demo banner and exit");
    eprintln!("      --no-engine       Start without a VT engine (placeholder view)");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  PageUp / PageDown     Scroll one page");
    eprintln!("  Shift+Up / Shift+Down Scroll one line");
    eprintln!("  Shift+Home / End      Jump to oldest line / live tail");
    eprintln!("  Ctrl+Shift+V          Paste from clipboard");
    eprintln!();
    eprintln!("Config file: ~/.termsession/config.toml");
}

fn parse_args() -> Result<CliArgs, String> {
    let args: Vec<String> = env::args().collect();
    let mut cli = CliArgs::default();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-s" | "--shell" => {
                i += 1;
                if i >= args.len() {
                    return Err("Missing shell argument".to_string());
                }
                cli.shell = Some(args[i].clone());
            }
            "--demo" => cli.demo = true,
            "--no-engine" => cli.no_engine = true,
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(cli)
}

/// Log to `~/.termsession/termsession.log`; RUST_LOG overrides the level
fn init_logging() {
    let log_path = Config::data_dir()
        .map(|dir| dir.join("termsession.log"))
        .unwrap_or_else(|| PathBuf::from("termsession.log"));

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let cli = match parse_args() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    if cli.demo {
        println!("{}", ENGINE_VERSION);
        println!("{}", render_demo());
        return Ok(());
    }

    init_logging();
    info!("termsession {} starting...", VERSION);

    // Command line overrides the config file
    let mut config = Config::load();
    if let Some(shell) = cli.shell {
        config.shell = Some(shell);
    }
    if cli.no_engine {
        config.engine.enabled = false;
    }

    run_terminal(&config)
}

fn run_terminal(config: &Config) -> anyhow::Result<()> {
    let options = config.session_options();
    let engines = config.engine_provider();
    info!("Shell: {}", options.shell);

    let mut surface = CrosstermSurface::new(config.viewport.chrome_height)?;
    surface.init()?;

    let mut view = TerminalView::open(
        surface,
        &options,
        engines.as_ref().map(|p| p as &dyn EngineProvider),
        &PortablePtyProvider,
    );

    let result = run_main_loop(&mut view);
    if let Err(e) = &result {
        error!("Main loop failed: {}", e);
    }

    view.close();
    if let Err(e) = view.surface_mut().cleanup() {
        warn!("Terminal cleanup failed: {}", e);
    }
    info!("termsession exiting");
    result
}

fn run_main_loop(view: &mut TerminalView<CrosstermSurface>) -> anyhow::Result<()> {
    let max_poll = Duration::from_millis(10);

    loop {
        view.pump();
        view.tick(Instant::now())?;

        let timeout = view
            .session()
            .filter(|s| s.render_pending())
            .map(|s| s.time_until_frame(Instant::now()).min(max_poll))
            .unwrap_or(max_poll);

        if !event::poll(timeout)? {
            continue;
        }

        match event::read()? {
            Event::Key(key_event) => {
                // Only process key press events
                if key_event.kind == KeyEventKind::Release {
                    continue;
                }
                // Once the session is gone any key closes the window
                if !view.is_alive() {
                    info!("Closing after session end");
                    return Ok(());
                }
                if is_paste_shortcut(&key_event) {
                    if let Some(text) = read_clipboard() {
                        view.handle_input(&InputEvent::Paste(text));
                    }
                    continue;
                }
                if let Ok(input) = KeyInput::try_from(&key_event) {
                    view.handle_input(&InputEvent::Key(input));
                }
            }
            Event::Paste(text) => view.handle_input(&InputEvent::Paste(text)),
            Event::Mouse(mouse_event) => match mouse_event.kind {
                MouseEventKind::ScrollUp => view.handle_wheel(-WHEEL_NOTCH),
                MouseEventKind::ScrollDown => view.handle_wheel(WHEEL_NOTCH),
                _ => {}
            },
            Event::Resize(cols, rows) => {
                info!("Resize: {}x{}", cols, rows);
                view.surface_mut().set_size(cols, rows);
                view.handle_resize();
            }
            _ => {}
        }
    }
}

fn is_paste_shortcut(key: &KeyEvent) -> bool {
    key.modifiers.contains(KeyModifiers::CONTROL | KeyModifiers::SHIFT)
        && matches!(key.code, KeyCode::Char('v') | KeyCode::Char('V'))
}

fn read_clipboard() -> Option<String> {
    match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.get_text()) {
        Ok(text) if !text.is_empty() => Some(text),
        Ok(_) => None,
        Err(e) => {
            warn!("Clipboard unavailable: {}", e);
            None
        }
    }
}
