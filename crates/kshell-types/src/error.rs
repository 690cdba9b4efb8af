//! Error types for kshell.

use std::io;

/// Reasons a received message is rejected by the decoder.
///
/// Any of these leaves the stream at an unknown offset, so the connection
/// should not be trusted for further messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FramingError {
    #[error("bad magic 0x{found:08X} (expected 0x{expected:08X})")]
    BadMagic { expected: u32, found: u32 },

    #[error("unsupported protocol version {major}.{minor}")]
    UnsupportedVersion { major: u8, minor: u8 },

    #[error("declared length {len} outside [{min}, {max}]")]
    LengthOutOfRange { len: u32, min: u32, max: u32 },

    #[error("parameter {index} overruns message length {len}")]
    ParamOverrun { index: u32, len: u32 },

    #[error("declared length {declared} does not match content length {actual}")]
    LengthMismatch { declared: u32, actual: u64 },

    #[error("stream ended inside the {0}")]
    Truncated(&'static str),
}

/// Errors produced by the kshell runtime.
#[derive(Debug, thiserror::Error)]
pub enum ShellError {
    #[error("can't load plugin {path}: {reason}")]
    PluginOpen { path: String, reason: String },

    #[error("plugin {plugin} init failed: {reason}")]
    PluginInit { plugin: String, reason: String },

    #[error("can't resolve symbol {0}")]
    UnresolvedSymbol(String),

    #[error("framing error: {0}")]
    Framing(#[from] FramingError),

    #[error("overflow: {0}")]
    Overflow(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl ShellError {
    /// Whether this error must abort daemon startup.
    pub fn is_fatal_at_startup(&self) -> bool {
        !matches!(self, ShellError::PluginInit { .. })
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ShellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugin_open_names_the_file() {
        let e = ShellError::PluginOpen {
            path: "/usr/lib/libkshell_plugin_x.so".into(),
            reason: "not found".into(),
        };
        assert_eq!(
            format!("{e}"),
            "can't load plugin /usr/lib/libkshell_plugin_x.so: not found"
        );
    }

    #[test]
    fn unresolved_symbol_names_the_symbol() {
        let e = ShellError::UnresolvedSymbol("show_run@cfg".into());
        assert_eq!(format!("{e}"), "can't resolve symbol show_run@cfg");
    }

    #[test]
    fn framing_error_display() {
        let e: ShellError = FramingError::BadMagic {
            expected: 0xC0FFEE01,
            found: 0xDEADBEEF,
        }
        .into();
        assert_eq!(
            format!("{e}"),
            "framing error: bad magic 0xDEADBEEF (expected 0xC0FFEE01)"
        );
    }

    #[test]
    fn truncated_display() {
        let e = FramingError::Truncated("parameter headers");
        assert_eq!(format!("{e}"), "stream ended inside the parameter headers");
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "deadline");
        let e: ShellError = io_err.into();
        let msg = format!("{e}");
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("deadline"));
    }

    #[test]
    fn toml_error_from_conversion() {
        let toml_err = toml::from_str::<toml::Value>("this is [[[not valid toml").unwrap_err();
        let e: ShellError = toml_err.into();
        assert!(format!("{e}").contains("TOML parse error"));
    }

    #[test]
    fn only_init_failure_is_tolerated() {
        let init = ShellError::PluginInit {
            plugin: "p".into(),
            reason: "r".into(),
        };
        assert!(!init.is_fatal_at_startup());
        assert!(ShellError::UnresolvedSymbol("x".into()).is_fatal_at_startup());
        assert!(
            ShellError::PluginOpen {
                path: "p".into(),
                reason: "r".into()
            }
            .is_fatal_at_startup()
        );
    }
}
