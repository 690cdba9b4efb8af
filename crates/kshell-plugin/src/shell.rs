//! The startup context tying the symbol table to the plugin registry.

use kshell_types::config::ShellConfig;
use kshell_types::error::{Result, ShellError};

use crate::module::ModuleLoader;
use crate::plugin::{Plugin, PluginRegistry};
use crate::symbol::{Invocation, Symbol, SymbolFn, SymbolTable};

/// Owns the symbol table and plugin registry for one shell instance.
///
/// Filled and linked once at startup, then only read while commands are
/// dispatched.
#[derive(Debug, Default)]
pub struct ShellContext {
    // Declared before `plugins` so it is dropped first: resolved entries
    // point into plugin modules.
    symbols: SymbolTable,
    plugins: PluginRegistry,
}

impl ShellContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context with `config` applied to it.
    pub fn from_config(config: &ShellConfig) -> Result<Self> {
        let mut ctx = Self::new();
        ctx.configure(config)?;
        Ok(ctx)
    }

    /// Register every configured plugin after those already registered, in
    /// file order, and add each configured command's symbol as an
    /// unresolved reference.
    pub fn configure(&mut self, config: &ShellConfig) -> Result<()> {
        for entry in &config.plugins {
            self.register_plugin(Plugin::from(entry))?;
        }
        for cmd in &config.commands {
            self.add_unresolved_sym(&cmd.symbol);
        }
        Ok(())
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Add a reference to resolve at link time, or return the existing one.
    pub fn add_unresolved_sym(&mut self, name: &str) -> &Symbol {
        self.symbols.add_unresolved(name)
    }

    /// Add an already-bound symbol, or return the existing one.
    pub fn add_sym(&mut self, name: &str, func: SymbolFn) -> &Symbol {
        self.symbols.add(name, func)
    }

    pub fn find_sym(&self, name: &str) -> Option<&Symbol> {
        self.symbols.find(name)
    }

    pub fn register_plugin(&mut self, plugin: Plugin) -> Result<()> {
        self.plugins.register(plugin)
    }

    /// Open every plugin and collect its exports.
    pub fn load_plugins(&mut self, loader: &dyn ModuleLoader) -> Result<()> {
        self.plugins.load_all(loader)
    }

    /// Resolve every unresolved table entry against the plugin exports.
    ///
    /// Walks the table in order and stops at the first name no plugin
    /// exports. Entries before it stay resolved and entries after it stay
    /// unresolved. Returns the number of entries linked.
    pub fn link_plugins(&mut self) -> Result<usize> {
        let mut linked = 0;
        for sym in self.symbols.iter_mut() {
            if sym.is_resolved() {
                continue;
            }
            let Some(resolution) = self
                .plugins
                .find_sym(sym.name())
                .and_then(Symbol::resolution)
            else {
                log::error!("can't resolve symbol {}", sym.name());
                return Err(ShellError::UnresolvedSymbol(sym.name().to_string()));
            };
            log::debug!(
                "linked {}{}",
                sym.name(),
                if resolution.permanent { " (permanent)" } else { "" }
            );
            sym.resolve(resolution);
            linked += 1;
        }
        log::info!("linked {linked} symbols");
        Ok(linked)
    }

    /// Load then link. Either phase failing aborts startup.
    pub fn startup(&mut self, loader: &dyn ModuleLoader) -> Result<()> {
        self.load_plugins(loader)?;
        self.link_plugins()?;
        Ok(())
    }

    /// Run the handler bound to `name`.
    pub fn call(&self, name: &str, inv: &mut Invocation<'_>) -> Result<i32> {
        self.find_sym(name)
            .ok_or_else(|| ShellError::UnresolvedSymbol(name.to_string()))?
            .call(inv)
    }
}
