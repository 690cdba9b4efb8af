//! kshell daemon internals: the builtin plugin, command dispatch and the
//! TCP listener. The `kshelld` and `kshell-send` binaries are thin
//! wrappers over this crate.

pub mod builtin;
pub mod dispatch;
pub mod server;

use kshell_plugin::{DylibLoader, ShellContext, StaticLoader};
use kshell_types::config::ShellConfig;
use kshell_types::error::Result;

pub use dispatch::{Dispatcher, PARAM_ARG, PARAM_OUTPUT};
pub use server::Server;

/// Module loader used by the daemon: the builtin module in-process,
/// everything else from shared objects.
pub fn loader() -> StaticLoader {
    let mut loader = StaticLoader::with_fallback(DylibLoader);
    builtin::install(&mut loader);
    loader
}

/// Register the builtin plugin, then everything `config` names.
pub fn build_context(config: &ShellConfig) -> Result<ShellContext> {
    let mut ctx = ShellContext::new();
    ctx.register_plugin(builtin::plugin())?;
    ctx.configure(config)?;
    Ok(ctx)
}

/// Load, link, and wrap the result for dispatch.
pub fn start(config: &ShellConfig, loader: &StaticLoader) -> Result<Dispatcher> {
    let mut ctx = build_context(config)?;
    ctx.startup(loader)?;
    Dispatcher::new(ctx, &config.commands)
}
