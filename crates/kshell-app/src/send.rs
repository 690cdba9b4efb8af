//! kshell-send: issue one request to a kshelld and print the reply.
//!
//! Usage: `kshell-send <addr> <cmd> [args...]`
//!
//! Each argument goes out as an ARG parameter. The reply's OUTPUT
//! parameters are written to stdout and the process exits with status 0
//! only if the reply status is 0. `KSHELL_CONFIG` may point at a daemon
//! config to pick up a non-default magic, version or timeouts.

use std::io::Write;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};

use kshell_app::{PARAM_ARG, PARAM_OUTPUT};
use kshell_proto::{Channel, Protocol, Timeouts};
use kshell_types::config::{ServerConfig, ShellConfig};

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let [addr, cmd, rest @ ..] = args.as_slice() else {
        bail!("usage: kshell-send <addr> <cmd> [args...]");
    };
    let cmd: u16 = cmd
        .parse()
        .with_context(|| format!("command code '{cmd}' is not a u16"))?;

    let server = match std::env::var_os("KSHELL_CONFIG") {
        Some(path) => ShellConfig::load(path.as_ref())?.server,
        None => ServerConfig::default(),
    };
    let protocol = Protocol::from(&server);

    let mut channel = Channel::connect(addr, protocol, Timeouts::from(&server))
        .with_context(|| format!("connecting to {addr}"))?;
    let mut request = protocol.message(cmd, 0, std::process::id());
    for arg in rest {
        request.add_str(PARAM_ARG, arg)?;
    }

    let reply = channel.request(&request)?;
    let mut stdout = std::io::stdout().lock();
    for param in reply.params_by_type(PARAM_OUTPUT) {
        stdout.write_all(param.data())?;
    }
    if reply.param_num() > 0 {
        writeln!(stdout)?;
    }

    if reply.status() != 0 {
        eprintln!("status {:#010X}", reply.status());
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}
