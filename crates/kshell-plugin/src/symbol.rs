//! Command-handler symbols and the table of references to them.

use std::collections::BTreeMap;

use kshell_types::error::{Result, ShellError};

/// Signature every command handler exported by a plugin must have.
///
/// The return value is the command's status code (0 = success).
pub type SymbolFn = fn(&mut Invocation<'_>) -> i32;

/// Arguments and output buffer for one handler call.
#[derive(Debug)]
pub struct Invocation<'a> {
    args: &'a [&'a [u8]],
    output: Vec<u8>,
}

impl<'a> Invocation<'a> {
    pub fn new(args: &'a [&'a [u8]]) -> Self {
        Self {
            args,
            output: Vec::new(),
        }
    }

    pub fn args(&self) -> &'a [&'a [u8]] {
        self.args
    }

    pub fn arg(&self, index: usize) -> Option<&'a [u8]> {
        self.args.get(index).copied()
    }

    /// Argument as UTF-8 text, if present and valid.
    pub fn arg_str(&self, index: usize) -> Option<&'a str> {
        self.arg(index).and_then(|a| std::str::from_utf8(a).ok())
    }

    /// Append text to the output.
    pub fn print(&mut self, text: &str) {
        self.output.extend_from_slice(text.as_bytes());
    }

    /// Append raw bytes to the output.
    pub fn write(&mut self, bytes: &[u8]) {
        self.output.extend_from_slice(bytes);
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn into_output(self) -> Vec<u8> {
        self.output
    }
}

/// The implementation a symbol is bound to.
#[derive(Debug, Clone, Copy)]
pub struct Resolution {
    pub func: SymbolFn,
    /// Must not be replaced for the life of the process.
    pub permanent: bool,
}

/// A named reference to a command handler.
///
/// Either unresolved (no function) or fully resolved (function and
/// permanence set together).
#[derive(Debug, Clone)]
pub struct Symbol {
    name: String,
    resolution: Option<Resolution>,
}

impl Symbol {
    pub fn unresolved(name: &str) -> Self {
        Self {
            name: name.to_string(),
            resolution: None,
        }
    }

    pub fn resolved(name: &str, func: SymbolFn, permanent: bool) -> Self {
        Self {
            name: name.to_string(),
            resolution: Some(Resolution { func, permanent }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }

    pub fn func(&self) -> Option<SymbolFn> {
        self.resolution.map(|r| r.func)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn is_permanent(&self) -> bool {
        self.resolution.is_some_and(|r| r.permanent)
    }

    pub(crate) fn resolve(&mut self, resolution: Resolution) {
        self.resolution = Some(resolution);
    }

    /// Run the handler; fails if the symbol was never linked.
    pub fn call(&self, inv: &mut Invocation<'_>) -> Result<i32> {
        let resolution = self
            .resolution
            .ok_or_else(|| ShellError::UnresolvedSymbol(self.name.clone()))?;
        Ok((resolution.func)(inv))
    }
}

/// Symbol references collected while commands are configured, kept
/// sorted by name.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: BTreeMap<String, Symbol>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reference to be resolved at link time.
    ///
    /// Returns the existing entry untouched if the name is already present.
    pub fn add_unresolved(&mut self, name: &str) -> &Symbol {
        self.symbols
            .entry(name.to_string())
            .or_insert_with(|| Symbol::unresolved(name))
    }

    /// Add a symbol that is already bound to `func`.
    ///
    /// Returns the existing entry untouched if the name is already present.
    pub fn add(&mut self, name: &str, func: SymbolFn) -> &Symbol {
        self.symbols
            .entry(name.to_string())
            .or_insert_with(|| Symbol::resolved(name, func, false))
    }

    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Entries in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut Symbol> {
        self.symbols.values_mut()
    }

    /// Names still waiting for a link.
    pub fn unresolved(&self) -> impl Iterator<Item = &str> {
        self.iter().filter(|s| !s.is_resolved()).map(Symbol::name)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
