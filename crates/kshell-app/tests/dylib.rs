//! Load the demo plugin as a real shared object.
//!
//! `kshell-plugin-demo` is a dev-dependency, so cargo builds its `cdylib`
//! alongside this test binary. The library is found next to the test
//! executable (in `deps/`) or one level up.

use std::env::consts::{DLL_PREFIX, DLL_SUFFIX};
use std::path::{Path, PathBuf};

use kshell_plugin::{ABI_VERSION, DylibLoader, Invocation, ModuleLoader, Plugin, ShellContext};

const LIB_STEM: &str = "kshell_plugin_demo";

fn demo_library() -> PathBuf {
    let exe = std::env::current_exe().unwrap();
    let deps = exe.parent().unwrap();
    let prefix = format!("{DLL_PREFIX}{LIB_STEM}");

    let mut candidates: Vec<PathBuf> = [Some(deps), deps.parent()]
        .into_iter()
        .flatten()
        .filter_map(|dir| std::fs::read_dir(dir).ok())
        .flatten()
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix) && n.ends_with(DLL_SUFFIX))
        })
        .collect();
    // Newest build wins if stale copies are lying around.
    candidates.sort_by_key(|p| std::fs::metadata(p).and_then(|m| m.modified()).ok());
    candidates
        .pop()
        .unwrap_or_else(|| panic!("no {prefix}*{DLL_SUFFIX} near {}", deps.display()))
}

fn call(ctx: &ShellContext, name: &str, args: &[&[u8]]) -> (i32, String) {
    let mut inv = Invocation::new(args);
    let code = ctx.call(name, &mut inv).unwrap();
    (code, String::from_utf8(inv.into_output()).unwrap())
}

fn startup(path: &Path, conf: &str) -> ShellContext {
    let mut ctx = ShellContext::new();
    ctx.register_plugin(Plugin::new("demo", path).with_conf(conf))
        .unwrap();
    ctx.add_unresolved_sym("greet@demo");
    ctx.add_unresolved_sym("ping");
    ctx.add_unresolved_sym("version");
    ctx.startup(&DylibLoader).unwrap();
    ctx
}

#[test]
fn shared_object_reports_host_abi() {
    let module = DylibLoader.open(&demo_library()).unwrap();
    assert_eq!(module.abi_version(), Some(ABI_VERSION));
    assert!(module.lookup(kshell_plugin::INIT_SYMBOL).is_some());
}

#[test]
fn shared_object_links_and_runs() {
    // One test per configured greeting: the greeting is per loaded image.
    let ctx = startup(&demo_library(), r#"greeting = "yo""#);

    assert_eq!(call(&ctx, "greet@demo", &[b"bob"]), (0, "yo, bob".to_string()));
    assert_eq!(call(&ctx, "ping", &[]), (0, "pong".to_string()));

    let version = ctx.find_sym("version").unwrap();
    assert!(version.is_resolved());
    assert!(version.is_permanent());
    assert!(!ctx.find_sym("ping").unwrap().is_permanent());
    assert_eq!(
        call(&ctx, "version", &[]),
        (0, env!("CARGO_PKG_VERSION").to_string())
    );
}
