//! Daemon configuration loaded from TOML.
//!
//! ```toml
//! [server]
//! listen = "127.0.0.1:7321"
//! magic = 0xC0FFEE01
//!
//! [[plugin]]
//! name = "demo"
//! conf = 'greeting = "hello"'
//!
//! [[command]]
//! code = 7
//! symbol = "ping@demo"
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, ShellError};

/// Protocol magic used when the config does not override it.
pub const DEFAULT_MAGIC: u32 = 0xC0FFEE01;

/// Smallest valid message: a bare header with no parameters.
pub const MIN_MESSAGE_LEN: u32 = 24;

/// Upper bound on a single message unless configured otherwise (16 MiB).
pub const DEFAULT_MAX_MESSAGE_LEN: u32 = 16 * 1024 * 1024;

/// Listener and protocol settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// TCP address to listen on.
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_magic")]
    pub magic: u32,
    #[serde(default = "default_major")]
    pub version_major: u8,
    #[serde(default)]
    pub version_minor: u8,
    /// Largest total message length accepted by the decoder.
    #[serde(default = "default_max_message_len")]
    pub max_message_len: u32,
    /// Read timeout in milliseconds (0 = block forever).
    #[serde(default)]
    pub read_timeout_ms: u64,
    /// Write timeout in milliseconds (0 = block forever).
    #[serde(default)]
    pub write_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            magic: default_magic(),
            version_major: default_major(),
            version_minor: 0,
            max_message_len: default_max_message_len(),
            read_timeout_ms: 0,
            write_timeout_ms: 0,
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:7321".to_string()
}

fn default_magic() -> u32 {
    DEFAULT_MAGIC
}

fn default_major() -> u8 {
    1
}

fn default_max_message_len() -> u32 {
    DEFAULT_MAX_MESSAGE_LEN
}

/// A plugin to load at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    /// Registry key, also the `symbol@name` qualifier.
    pub name: String,
    /// Shared object path. Derived from `name` when omitted.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Opaque text handed to the plugin's init entry point.
    #[serde(default)]
    pub conf: Option<String>,
}

impl PluginEntry {
    /// The file to open: the configured path or the platform default.
    pub fn resolved_file(&self) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_plugin_file(&self.name)))
    }
}

/// Platform library file name for a plugin called `name`.
pub fn default_plugin_file(name: &str) -> String {
    let stem = format!("kshell_plugin_{name}");
    if cfg!(target_os = "windows") {
        format!("{stem}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{stem}.dylib")
    } else {
        format!("lib{stem}.so")
    }
}

/// Maps a wire command code onto a symbol reference.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandEntry {
    pub code: u16,
    /// Symbol name, optionally qualified as `symbol@plugin`.
    pub symbol: String,
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShellConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "plugin")]
    pub plugins: Vec<PluginEntry>,
    #[serde(default, rename = "command")]
    pub commands: Vec<CommandEntry>,
}

impl ShellConfig {
    /// Parse and validate a configuration document.
    pub fn parse(toml_str: &str) -> Result<Self> {
        let config: ShellConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ShellError::Config(format!("{}: {e}", path.display()))
        })?;
        log::debug!("loaded config from {}", path.display());
        Self::parse(&text)
    }

    fn validate(&self) -> Result<()> {
        let mut names = HashSet::new();
        for plugin in &self.plugins {
            if plugin.name.is_empty() || plugin.name.contains('@') {
                return Err(ShellError::Config(format!(
                    "invalid plugin name '{}'",
                    plugin.name
                )));
            }
            if !names.insert(plugin.name.as_str()) {
                return Err(ShellError::Config(format!(
                    "duplicate plugin '{}'",
                    plugin.name
                )));
            }
        }

        let mut codes = HashSet::new();
        for cmd in &self.commands {
            if cmd.symbol.is_empty() {
                return Err(ShellError::Config(format!(
                    "command {} has an empty symbol",
                    cmd.code
                )));
            }
            if !codes.insert(cmd.code) {
                return Err(ShellError::Config(format!(
                    "duplicate command code {}",
                    cmd.code
                )));
            }
        }

        if self.server.max_message_len < MIN_MESSAGE_LEN {
            return Err(ShellError::Config(format!(
                "max_message_len {} is smaller than a message header",
                self.server.max_message_len
            )));
        }
        Ok(())
    }
}
