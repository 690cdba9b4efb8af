//! Plugin runtime for kshell.
//!
//! Startup happens in two phases. First every registered [`Plugin`] is
//! opened and its init entry point registers the symbols it exports. Then
//! the [`SymbolTable`], filled with unresolved names while commands were
//! configured, is linked against those exports. A name may be qualified as
//! `symbol@plugin` to pin it to one plugin; otherwise the first plugin in
//! registration order that exports it wins.
//!
//! Plugin crates export their entry point with [`declare_plugin!`]:
//!
//! ```rust,ignore
//! use kshell_plugin::{Invocation, Registrar, declare_plugin};
//!
//! fn ping(inv: &mut Invocation<'_>) -> i32 {
//!     inv.print("pong");
//!     0
//! }
//!
//! fn init(reg: &mut Registrar<'_>) -> Result<(), String> {
//!     reg.add_sym("ping", ping);
//!     Ok(())
//! }
//!
//! declare_plugin!(init);
//! ```

mod module;
mod plugin;
mod shell;
mod symbol;

pub use module::{
    ABI_SYMBOL, ABI_VERSION, DylibLoader, INIT_SYMBOL, Module, ModuleLoader, PluginInit,
    StaticLoader,
};
pub use plugin::{ExportSet, Plugin, PluginRegistry, Registrar, split_qualified};
pub use shell::ShellContext;
pub use symbol::{Invocation, Resolution, Symbol, SymbolFn, SymbolTable};

/// Export a plugin's init function under the names the loader looks for.
///
/// Also exports the ABI version so the host can refuse a plugin built
/// against a different `kshell-plugin`.
#[macro_export]
macro_rules! declare_plugin {
    ($init:path) => {
        #[unsafe(no_mangle)]
        pub extern "C" fn kshell_plugin_abi_version() -> u32 {
            $crate::ABI_VERSION
        }

        #[unsafe(no_mangle)]
        pub fn kshell_plugin_init(
            registrar: &mut $crate::Registrar<'_>,
        ) -> ::std::result::Result<(), ::std::string::String> {
            let init: $crate::PluginInit = $init;
            init(registrar)
        }
    };
}
