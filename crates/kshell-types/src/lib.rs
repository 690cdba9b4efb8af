//! Foundation types for kshell.
//!
//! This crate holds the pieces shared by every other kshell crate: the
//! error enum with its `Result` alias, and the TOML configuration model the
//! daemon is started from.

pub mod config;
pub mod error;

pub use config::{CommandEntry, PluginEntry, ServerConfig, ShellConfig};
pub use error::{FramingError, Result, ShellError};
