//! Configuration for termsession.
//!
//! Loaded from `~/.termsession/config.toml`. Every field is optional:
//!
//! ```toml
//! # Shell to run (defaults to $SHELL, then /bin/sh; cmd.exe on Windows)
//! shell = "/bin/zsh"
//! args = ["-l"]
//! cwd = "/home/me/src"
//!
//! [env]
//! LANG = "en_US.UTF-8"
//!
//! [engine]
//! enabled = true
//! scrollback_limit = 10000
//!
//! [viewport]
//! chrome_height = 1
//! scroll_on_input = true
//!
//! [session]
//! mailbox_capacity = 256
//! frame_interval_ms = 16
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core::engine::BuiltinEngineProvider;
use crate::core::session::SessionOptions;
use crate::core::term::DEFAULT_SCROLLBACK_LIMIT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell command
    pub shell: Option<String>,
    /// Shell arguments
    pub args: Vec<String>,
    /// Working directory for the shell
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    pub env: BTreeMap<String, String>,
    pub engine: EngineConfig,
    pub viewport: ViewportConfig,
    pub session: SessionConfig,
}

/// VT engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// When false the session starts without an engine and shows a placeholder
    pub enabled: bool,
    pub scrollback_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scrollback_limit: DEFAULT_SCROLLBACK_LIMIT,
        }
    }
}

/// Viewport settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    /// Space reserved by the host below the grid, in surface units
    pub chrome_height: u16,
    /// Jump back to the live tail when input is sent
    pub scroll_on_input: bool,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            chrome_height: 1,
            scroll_on_input: true,
        }
    }
}

/// Event loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Process output chunks buffered before the reader blocks
    pub mailbox_capacity: usize,
    pub frame_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 256,
            frame_interval_ms: 16,
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring config: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Directory holding the config file and the log
    pub fn data_dir() -> Option<PathBuf> {
        home_dir().map(|home| home.join(".termsession"))
    }

    fn config_path() -> Option<PathBuf> {
        Self::data_dir().map(|dir| dir.join("config.toml"))
    }

    /// Shell to run: config, then `$SHELL`, then the platform default
    pub fn resolved_shell(&self) -> String {
        if let Some(shell) = self.shell.as_ref().filter(|s| !s.trim().is_empty()) {
            return shell.clone();
        }
        if cfg!(windows) {
            return std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string());
        }
        std::env::var("SHELL")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "/bin/sh".to_string())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            shell: self.resolved_shell(),
            args: self.args.clone(),
            cwd: self.cwd.clone(),
            env: self.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            scroll_on_input: self.viewport.scroll_on_input,
            mailbox_capacity: self.session.mailbox_capacity.max(1),
            frame_interval: Duration::from_millis(self.session.frame_interval_ms),
        }
    }

    /// Engine provider, or None when the engine is disabled
    pub fn engine_provider(&self) -> Option<BuiltinEngineProvider> {
        self.engine.enabled.then(|| BuiltinEngineProvider {
            scrollback_limit: self.engine.scrollback_limit,
        })
    }
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config, Config::default());
        assert!(config.engine.enabled);
        assert_eq!(config.engine.scrollback_limit, 10_000);
        assert_eq!(config.session.mailbox_capacity, 256);
    }

    #[test]
    fn test_partial_config() {
        let config = Config::from_toml(
            r#"
            shell = "/bin/zsh"
            args = ["-l"]

            [env]
            FOO = "bar"

            [engine]
            scrollback_limit = 500

            [session]
            frame_interval_ms = 33
            "#,
        )
        .unwrap();

        assert_eq!(config.resolved_shell(), "/bin/zsh");
        assert!(config.engine.enabled);
        assert_eq!(config.engine_provider().unwrap().scrollback_limit, 500);

        let options = config.session_options();
        assert_eq!(options.args, vec!["-l".to_string()]);
        assert_eq!(options.env, vec![("FOO".to_string(), "bar".to_string())]);
        assert_eq!(options.frame_interval, Duration::from_millis(33));
        assert!(options.scroll_on_input);
    }

    #[test]
    fn test_disabled_engine() {
        let config = Config::from_toml("[engine]\nenabled = false\n").unwrap();
        assert!(config.engine_provider().is_none());
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        assert!(matches!(
            Config::from_toml("shell = 3"),
            Err(ConfigError::Parse(_))
        ));
    }
}
