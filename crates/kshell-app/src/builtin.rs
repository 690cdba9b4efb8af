//! The in-process `builtin` plugin.

use kshell_plugin::{Invocation, Plugin, Registrar, StaticLoader};

/// Registry name, and the qualifier for `nop@builtin` style references.
pub const NAME: &str = "builtin";

/// Path the static loader serves the module under. Not a real file.
pub const PATH: &str = "<builtin>";

fn nop(_inv: &mut Invocation<'_>) -> i32 {
    0
}

fn echo(inv: &mut Invocation<'_>) -> i32 {
    for (i, arg) in inv.args().iter().enumerate() {
        if i > 0 {
            inv.print(" ");
        }
        inv.write(arg);
    }
    0
}

fn init(reg: &mut Registrar<'_>) -> Result<(), String> {
    reg.add_permanent_sym("nop", nop);
    reg.add_permanent_sym("echo", echo);
    Ok(())
}

/// The plugin descriptor to register ahead of configured plugins.
pub fn plugin() -> Plugin {
    Plugin::new(NAME, PATH)
}

/// Make `loader` serve the builtin module.
pub fn install(loader: &mut StaticLoader) {
    loader.insert(PATH, init);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_exports_are_permanent() {
        let mut loader = StaticLoader::new();
        install(&mut loader);
        let mut plugin = plugin();
        plugin.load(&loader).unwrap();
        for name in ["nop", "echo"] {
            assert!(plugin.get_sym(name).unwrap().is_permanent(), "{name}");
        }
    }

    #[test]
    fn echo_joins_args() {
        let args: [&[u8]; 3] = [b"one", b"two", b""];
        let mut inv = Invocation::new(&args);
        assert_eq!(echo(&mut inv), 0);
        assert_eq!(inv.output(), b"one two ");
    }
}
