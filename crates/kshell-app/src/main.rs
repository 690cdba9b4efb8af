//! kshelld: load plugins, link command symbols, serve requests.
//!
//! The config path comes from the first argument, then `KSHELL_CONFIG`,
//! then `kshell.toml` in the working directory. Any plugin that fails to
//! open or symbol that fails to link stops startup with a non-zero exit.

use std::path::PathBuf;

use anyhow::{Context, Result};

use kshell_app::Server;
use kshell_types::config::ShellConfig;

const DEFAULT_CONFIG: &str = "kshell.toml";

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("KSHELL_CONFIG").ok())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG), PathBuf::from);
    let config = ShellConfig::load(&path)
        .with_context(|| format!("reading config {}", path.display()))?;
    log::info!(
        "starting kshelld with {} plugins and {} commands",
        config.plugins.len(),
        config.commands.len()
    );

    let loader = kshell_app::loader();
    let dispatcher = kshell_app::start(&config, &loader).context("startup failed")?;
    for plugin in dispatcher.context().plugins().iter() {
        log::debug!("{plugin}");
    }

    let server = Server::bind(&config.server, dispatcher)
        .with_context(|| format!("binding {}", config.server.listen))?;
    server.run()?;
    Ok(())
}
