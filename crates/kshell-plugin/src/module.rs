//! Opening plugin modules.
//!
//! A [`ModuleLoader`] turns a plugin file path into a [`Module`], which
//! answers one question: where is the init entry point? Shared objects go
//! through [`DylibLoader`]; plugins compiled into the host go through
//! [`StaticLoader`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use libloading::Library;

use kshell_types::error::{Result, ShellError};

use crate::plugin::Registrar;

/// Init entry point exported by every plugin.
///
/// Registers the plugin's symbols through the registrar. An `Err` means
/// the plugin loaded but exports nothing.
pub type PluginInit = fn(&mut Registrar<'_>) -> std::result::Result<(), String>;

/// Name of the init entry point.
pub const INIT_SYMBOL: &str = "kshell_plugin_init";

/// Name of the optional `extern "C" fn() -> u32` reporting the plugin's ABI.
pub const ABI_SYMBOL: &str = "kshell_plugin_abi_version";

/// Bumped whenever [`PluginInit`], [`Registrar`] or the handler signature
/// changes shape.
pub const ABI_VERSION: u32 = 1;

/// A loaded plugin module.
pub trait Module {
    /// Look up an entry point by name.
    fn lookup(&self, name: &str) -> Option<PluginInit>;

    /// ABI version reported by the module, if it reports one.
    fn abi_version(&self) -> Option<u32> {
        None
    }
}

/// Opens plugin modules by path.
pub trait ModuleLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>>;
}

// -----------------------------------------------------------------------
// Shared objects
// -----------------------------------------------------------------------

/// Loads plugins from shared libraries with `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DylibLoader;

/// Keeps the [`Library`] mapped. Dropping it unloads the plugin, so the
/// owning [`Plugin`](crate::Plugin) must outlive every symbol taken from it.
struct DylibModule {
    library: Library,
}

impl ModuleLoader for DylibLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>> {
        // SAFETY: loading runs the library's initializers. Plugins are
        // trusted configuration, and the ABI symbol is checked before any
        // Rust type crosses the boundary.
        let library = unsafe { Library::new(path) }.map_err(|e| ShellError::PluginOpen {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(DylibModule { library }))
    }
}

impl Module for DylibModule {
    fn lookup(&self, name: &str) -> Option<PluginInit> {
        // SAFETY: the only names looked up are entry points produced by
        // `declare_plugin!`, which have exactly the `PluginInit` signature.
        let symbol = unsafe { self.library.get::<PluginInit>(name.as_bytes()) }.ok()?;
        Some(*symbol)
    }

    fn abi_version(&self) -> Option<u32> {
        // SAFETY: `declare_plugin!` exports this as `extern "C" fn() -> u32`,
        // a signature that is stable regardless of toolchain.
        let symbol = unsafe {
            self.library
                .get::<extern "C" fn() -> u32>(ABI_SYMBOL.as_bytes())
        }
        .ok()?;
        Some(symbol())
    }
}

// -----------------------------------------------------------------------
// Built-in modules
// -----------------------------------------------------------------------

/// Serves plugins that are linked into the host binary, keyed by path.
///
/// Paths with no built-in module are passed to the fallback loader, if one
/// is set.
#[derive(Default)]
pub struct StaticLoader {
    modules: HashMap<PathBuf, PluginInit>,
    fallback: Option<Box<dyn ModuleLoader>>,
}

struct StaticModule {
    init: PluginInit,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delegate unknown paths to `loader`.
    pub fn with_fallback(loader: impl ModuleLoader + 'static) -> Self {
        Self {
            modules: HashMap::new(),
            fallback: Some(Box::new(loader)),
        }
    }

    /// Serve `init` for `path`. Replaces any earlier module at that path.
    pub fn insert(&mut self, path: impl Into<PathBuf>, init: PluginInit) {
        self.modules.insert(path.into(), init);
    }
}

impl ModuleLoader for StaticLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn Module>> {
        if let Some(&init) = self.modules.get(path) {
            return Ok(Box::new(StaticModule { init }));
        }
        match &self.fallback {
            Some(loader) => loader.open(path),
            None => Err(ShellError::PluginOpen {
                path: path.display().to_string(),
                reason: "no built-in module at this path".to_string(),
            }),
        }
    }
}

impl Module for StaticModule {
    fn lookup(&self, name: &str) -> Option<PluginInit> {
        (name == INIT_SYMBOL).then_some(self.init)
    }

    fn abi_version(&self) -> Option<u32> {
        Some(ABI_VERSION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init(_reg: &mut Registrar<'_>) -> std::result::Result<(), String> {
        Ok(())
    }

    #[test]
    fn static_loader_serves_inserted_module() {
        let mut loader = StaticLoader::new();
        loader.insert("builtin", init);
        let module = loader.open(Path::new("builtin")).unwrap();
        assert!(module.lookup(INIT_SYMBOL).is_some());
        assert!(module.lookup("something_else").is_none());
        assert_eq!(module.abi_version(), Some(ABI_VERSION));
    }

    #[test]
    fn static_loader_without_fallback_fails() {
        let loader = StaticLoader::new();
        let err = loader.open(Path::new("missing.so")).err().unwrap();
        assert!(matches!(err, ShellError::PluginOpen { ref path, .. } if path == "missing.so"));
    }

    #[test]
    fn static_loader_falls_back() {
        let mut inner = StaticLoader::new();
        inner.insert("inner", init);
        let outer = StaticLoader::with_fallback(inner);
        assert!(outer.open(Path::new("inner")).is_ok());
        assert!(outer.open(Path::new("elsewhere")).is_err());
    }

    #[test]
    fn dylib_loader_reports_missing_file() {
        let err = DylibLoader
            .open(Path::new("/nonexistent/libkshell_plugin_none.so"))
            .err()
            .unwrap();
        match err {
            ShellError::PluginOpen { path, .. } => {
                assert_eq!(path, "/nonexistent/libkshell_plugin_none.so");
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
