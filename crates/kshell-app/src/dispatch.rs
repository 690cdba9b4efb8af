//! Mapping wire command codes onto linked symbols.

use std::collections::HashMap;

use kshell_plugin::{Invocation, ShellContext};
use kshell_proto::{Message, Protocol};
use kshell_types::config::CommandEntry;
use kshell_types::error::{Result, ShellError};

/// Parameter type carrying handler output in a response.
pub const PARAM_OUTPUT: u16 = 1;

/// Parameter type carrying one handler argument in a request.
pub const PARAM_ARG: u16 = 2;

// Statuses with the top bit set are reserved for the daemon. Handler return
// codes are sent as their two's-complement bit pattern.

/// No `[[command]]` entry for the request's cmd code.
pub const STATUS_UNKNOWN_COMMAND: u32 = 0x8000_0001;

/// The handler's output did not fit in a response.
pub const STATUS_OUTPUT_TOO_LARGE: u32 = 0x8000_0002;

/// The command's symbol is not linked.
pub const STATUS_UNRESOLVED: u32 = 0x8000_0003;

/// Routes requests to command handlers.
#[derive(Debug)]
pub struct Dispatcher {
    ctx: ShellContext,
    commands: HashMap<u16, String>,
}

impl Dispatcher {
    /// Wrap a linked context. Every command's symbol must be in its table.
    pub fn new(ctx: ShellContext, commands: &[CommandEntry]) -> Result<Self> {
        let mut map = HashMap::with_capacity(commands.len());
        for cmd in commands {
            if ctx.find_sym(&cmd.symbol).is_none() {
                return Err(ShellError::UnresolvedSymbol(cmd.symbol.clone()));
            }
            map.insert(cmd.code, cmd.symbol.clone());
        }
        Ok(Self { ctx, commands: map })
    }

    pub fn context(&self) -> &ShellContext {
        &self.ctx
    }

    /// Symbol name bound to `code`.
    pub fn symbol_for(&self, code: u16) -> Option<&str> {
        self.commands.get(&code).map(String::as_str)
    }

    /// Run the handler for `request` and build the response.
    ///
    /// The response echoes the request's cmd and req_id. Failures are
    /// reported through the status; this never fails outright.
    pub fn handle(&self, request: &Message, protocol: &Protocol) -> Message {
        let cmd = request.cmd();
        let req_id = request.req_id();

        let Some(symbol) = self.symbol_for(cmd) else {
            log::warn!("request {req_id}: unknown command {cmd}");
            return protocol.message(cmd, STATUS_UNKNOWN_COMMAND, req_id);
        };

        let args: Vec<&[u8]> = request
            .params_by_type(PARAM_ARG)
            .map(|p| p.data())
            .collect();
        let mut inv = Invocation::new(&args);
        let code = match self.ctx.call(symbol, &mut inv) {
            Ok(code) => code,
            Err(e) => {
                log::error!("request {req_id}: {e}");
                return protocol.message(cmd, STATUS_UNRESOLVED, req_id);
            },
        };
        log::debug!("request {req_id}: {symbol} returned {code}");

        let mut response = protocol.message(cmd, code as u32, req_id);
        let output = inv.into_output();
        if !output.is_empty() {
            if let Err(e) = response.add_param(PARAM_OUTPUT, &output) {
                log::error!("request {req_id}: {e}");
                return protocol.message(cmd, STATUS_OUTPUT_TOO_LARGE, req_id);
            }
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use kshell_plugin::{Invocation, StaticLoader};
    use kshell_types::config::DEFAULT_MAGIC;

    use super::*;
    use crate::builtin;

    fn minus_one(_inv: &mut Invocation<'_>) -> i32 {
        -1
    }

    fn commands(pairs: &[(u16, &str)]) -> Vec<CommandEntry> {
        pairs
            .iter()
            .map(|&(code, symbol)| CommandEntry {
                code,
                symbol: symbol.to_string(),
            })
            .collect()
    }

    fn dispatcher(pairs: &[(u16, &str)]) -> Dispatcher {
        let commands = commands(pairs);
        let mut ctx = ShellContext::new();
        ctx.register_plugin(builtin::plugin()).unwrap();
        // Bound before the command references so linking leaves it alone.
        ctx.add_sym("negative", minus_one);
        for cmd in &commands {
            ctx.add_unresolved_sym(&cmd.symbol);
        }
        let mut loader = StaticLoader::new();
        builtin::install(&mut loader);
        ctx.startup(&loader).unwrap();
        Dispatcher::new(ctx, &commands).unwrap()
    }

    fn protocol() -> Protocol {
        Protocol::new(DEFAULT_MAGIC, 1, 0)
    }

    #[test]
    fn echo_returns_args_as_output() {
        let d = dispatcher(&[(3, "echo")]);
        let mut req = protocol().message(3, 0, 17);
        req.add_str(PARAM_ARG, "hello").unwrap();
        req.add_str(99, "ignored").unwrap();
        req.add_str(PARAM_ARG, "there").unwrap();

        let resp = d.handle(&req, &protocol());
        assert_eq!(resp.cmd(), 3);
        assert_eq!(resp.req_id(), 17);
        assert_eq!(resp.status(), 0);
        assert_eq!(resp.param_str(PARAM_OUTPUT), Some("hello there"));
    }

    #[test]
    fn empty_output_sends_no_params() {
        let d = dispatcher(&[(1, "nop@builtin")]);
        let resp = d.handle(&protocol().message(1, 0, 5), &protocol());
        assert_eq!(resp.status(), 0);
        assert_eq!(resp.param_num(), 0);
    }

    #[test]
    fn unknown_command_status() {
        let d = dispatcher(&[(1, "nop")]);
        let resp = d.handle(&protocol().message(42, 0, 9), &protocol());
        assert_eq!(resp.status(), STATUS_UNKNOWN_COMMAND);
        assert_eq!(resp.cmd(), 42);
        assert_eq!(resp.req_id(), 9);
    }

    #[test]
    fn negative_code_is_sent_as_bit_pattern() {
        let d = dispatcher(&[(8, "negative")]);
        let resp = d.handle(&protocol().message(8, 0, 1), &protocol());
        assert_eq!(resp.status(), u32::MAX);
    }

    #[test]
    fn command_without_table_entry_rejected() {
        let err = Dispatcher::new(ShellContext::new(), &commands(&[(1, "ghost")])).unwrap_err();
        assert!(matches!(err, ShellError::UnresolvedSymbol(ref n) if n == "ghost"));
    }
}
