//! Demo plugin for kshell.
//!
//! Built as a shared object (`libkshell_plugin_demo.so`) for the daemon to
//! load, and as an rlib so tests can serve [`init`] in-process.
//!
//! Exports:
//!
//! | symbol    | behavior                                      |
//! |-----------|-----------------------------------------------|
//! | `ping`    | `pong`, or the arguments joined by spaces     |
//! | `greet`   | the configured greeting followed by arg 0     |
//! | `fail`    | returns status 1 with no output               |
//! | `version` | the crate version (permanent)                 |
//!
//! Configuration is a TOML document. The only key is `greeting`:
//!
//! ```toml
//! greeting = "hello"
//! ```
//!
//! Unknown keys or malformed TOML make init fail. The greeting is stored
//! per loaded image, so a second instance of the same shared object asking
//! for a different greeting fails to initialize.

use std::sync::OnceLock;

use kshell_plugin::{Invocation, Registrar, declare_plugin};
use serde::Deserialize;

const DEFAULT_GREETING: &str = "hello";

static GREETING: OnceLock<String> = OnceLock::new();

fn ping(inv: &mut Invocation<'_>) -> i32 {
    if inv.args().is_empty() {
        inv.print("pong");
        return 0;
    }
    for (i, arg) in inv.args().iter().enumerate() {
        if i > 0 {
            inv.print(" ");
        }
        inv.write(arg);
    }
    0
}

fn greet(inv: &mut Invocation<'_>) -> i32 {
    let greeting = GREETING.get().map_or(DEFAULT_GREETING, String::as_str);
    let who = inv.arg_str(0).unwrap_or("world");
    inv.print(&format!("{greeting}, {who}"));
    0
}

fn fail(_inv: &mut Invocation<'_>) -> i32 {
    1
}

fn version(inv: &mut Invocation<'_>) -> i32 {
    inv.print(env!("CARGO_PKG_VERSION"));
    0
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct DemoConf {
    greeting: Option<String>,
}

fn parse_conf(conf: &str) -> Result<DemoConf, String> {
    toml::from_str(conf).map_err(|e| format!("bad conf: {e}"))
}

/// Record the greeting, refusing to replace one set by an earlier instance.
fn set_greeting(greeting: String) -> Result<(), String> {
    let current = GREETING.get_or_init(|| greeting.clone());
    if *current != greeting {
        return Err(format!(
            "greeting already set to '{current}' by another instance, refusing '{greeting}'"
        ));
    }
    Ok(())
}

/// Register the demo symbols.
pub fn init(reg: &mut Registrar<'_>) -> Result<(), String> {
    let conf = reg.conf().map(parse_conf).transpose()?.unwrap_or_default();
    if let Some(greeting) = conf.greeting {
        set_greeting(greeting)?;
    }

    reg.add_sym("ping", ping);
    reg.add_sym("greet", greet);
    reg.add_sym("fail", fail);
    reg.add_permanent_sym("version", version);
    Ok(())
}

declare_plugin!(init);
