//! Plugin descriptors, their export sets, and the registry holding them.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use kshell_types::config::PluginEntry;
use kshell_types::error::{Result, ShellError};

use crate::module::{ABI_VERSION, INIT_SYMBOL, Module, ModuleLoader};
use crate::symbol::{Symbol, SymbolFn};

/// Symbols a plugin exports, unique by name within the plugin.
#[derive(Debug, Default)]
pub struct ExportSet {
    symbols: BTreeMap<String, Symbol>,
}

impl ExportSet {
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Returns false and keeps the first export if `name` is taken.
    fn insert(&mut self, name: &str, func: SymbolFn, permanent: bool) -> bool {
        if self.symbols.contains_key(name) {
            return false;
        }
        self.symbols
            .insert(name.to_string(), Symbol::resolved(name, func, permanent));
        true
    }
}

/// Handle given to a plugin's init entry point for registering exports.
pub struct Registrar<'a> {
    plugin: &'a str,
    conf: Option<&'a str>,
    exports: &'a mut ExportSet,
}

impl Registrar<'_> {
    /// Name the plugin was registered under.
    pub fn plugin_name(&self) -> &str {
        self.plugin
    }

    /// Configuration text from the host, if any.
    pub fn conf(&self) -> Option<&str> {
        self.conf
    }

    /// Export a handler that may later be replaced.
    pub fn add_sym(&mut self, name: &str, func: SymbolFn) {
        self.add(name, func, false);
    }

    /// Export a handler that must never be replaced.
    pub fn add_permanent_sym(&mut self, name: &str, func: SymbolFn) {
        self.add(name, func, true);
    }

    fn add(&mut self, name: &str, func: SymbolFn, permanent: bool) {
        if !self.exports.insert(name, func, permanent) {
            log::warn!(
                "plugin {} exports {} twice, keeping the first",
                self.plugin,
                name
            );
        }
    }
}

/// A registered plugin.
///
/// Its export set is filled only by the init call during [`Plugin::load`]
/// and read-only after that.
pub struct Plugin {
    name: String,
    file: PathBuf,
    conf: Option<String>,
    exports: ExportSet,
    module: Option<Box<dyn Module>>,
}

impl Plugin {
    pub fn new(name: &str, file: impl Into<PathBuf>) -> Self {
        Self {
            name: name.to_string(),
            file: file.into(),
            conf: None,
            exports: ExportSet::default(),
            module: None,
        }
    }

    pub fn with_conf(mut self, conf: impl Into<String>) -> Self {
        self.conf = Some(conf.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn conf(&self) -> Option<&str> {
        self.conf.as_deref()
    }

    pub fn is_loaded(&self) -> bool {
        self.module.is_some()
    }

    pub fn exports(&self) -> &ExportSet {
        &self.exports
    }

    pub fn get_sym(&self, name: &str) -> Option<&Symbol> {
        self.exports.get(name)
    }

    /// Open the module and run its init entry point.
    ///
    /// Failing to open the file, an ABI mismatch, or a missing entry point
    /// is an error. An init that reports failure is not: the plugin stays
    /// loaded with no exports.
    pub fn load(&mut self, loader: &dyn ModuleLoader) -> Result<()> {
        if self.is_loaded() {
            log::debug!("plugin {} already loaded", self.name);
            return Ok(());
        }

        let module = loader.open(&self.file)?;
        if let Some(abi) = module.abi_version() {
            if abi != ABI_VERSION {
                return Err(self.open_error(format!(
                    "ABI version {abi}, host expects {ABI_VERSION}"
                )));
            }
        }
        let init = module
            .lookup(INIT_SYMBOL)
            .ok_or_else(|| self.open_error(format!("no {INIT_SYMBOL} entry point")))?;

        let mut exports = ExportSet::default();
        let outcome = {
            let mut registrar = Registrar {
                plugin: &self.name,
                conf: self.conf.as_deref(),
                exports: &mut exports,
            };
            init(&mut registrar)
        };
        match outcome {
            Ok(()) => self.exports = exports,
            Err(reason) => {
                let err = ShellError::PluginInit {
                    plugin: self.name.clone(),
                    reason,
                };
                log::warn!("{err}; it exports no symbols");
            },
        }

        self.module = Some(module);
        log::debug!("{self}");
        Ok(())
    }

    fn open_error(&self, reason: String) -> ShellError {
        ShellError::PluginOpen {
            path: self.file.display().to_string(),
            reason,
        }
    }
}

impl From<&PluginEntry> for Plugin {
    fn from(entry: &PluginEntry) -> Self {
        let plugin = Plugin::new(&entry.name, entry.resolved_file());
        match &entry.conf {
            Some(conf) => plugin.with_conf(conf.clone()),
            None => plugin,
        }
    }
}

impl fmt::Debug for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin")
            .field("name", &self.name)
            .field("file", &self.file)
            .field("loaded", &self.is_loaded())
            .field("exports", &self.exports.len())
            .finish()
    }
}

impl fmt::Display for Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plugin {} ({})", self.name, self.file.display())?;
        for sym in self.exports.iter() {
            let tag = if sym.is_permanent() { " [permanent]" } else { "" };
            write!(f, "\n  {}{tag}", sym.name())?;
        }
        Ok(())
    }
}

/// Split `symbol@plugin` into its parts.
///
/// An empty qualifier (`name@`) counts as no qualifier.
pub fn split_qualified(name: &str) -> (&str, Option<&str>) {
    match name.split_once('@') {
        Some((sym, "")) => (sym, None),
        Some((sym, plugin)) => (sym, Some(plugin)),
        None => (name, None),
    }
}

/// Plugins in registration order.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<Plugin>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a plugin. Names must be unique.
    pub fn register(&mut self, plugin: Plugin) -> Result<()> {
        if self.find(plugin.name()).is_some() {
            return Err(ShellError::Config(format!(
                "plugin {} registered twice",
                plugin.name()
            )));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Plugin> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Plugin> {
        self.plugins.iter()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Load every plugin in registration order, stopping at the first
    /// that cannot be opened.
    pub fn load_all(&mut self, loader: &dyn ModuleLoader) -> Result<()> {
        for plugin in &mut self.plugins {
            if let Err(e) = plugin.load(loader) {
                log::error!("can't load plugin {}: {e}", plugin.file().display());
                return Err(e);
            }
            log::info!(
                "loaded plugin {} with {} symbols",
                plugin.name(),
                plugin.exports().len()
            );
        }
        Ok(())
    }

    /// Find an exported symbol by plain or `symbol@plugin` name.
    ///
    /// A qualified name searches only the named plugin. A plain name
    /// returns the export of the first plugin, in registration order, that
    /// has it.
    pub fn find_sym(&self, name: &str) -> Option<&Symbol> {
        let (sym, qualifier) = split_qualified(name);
        if sym.is_empty() {
            return None;
        }
        match qualifier {
            Some(plugin) => self.find(plugin)?.get_sym(sym),
            None => self.plugins.iter().find_map(|p| p.get_sym(sym)),
        }
    }
}
