//! A worked example exercising every rule-registration entry point on
//! [`pake::Engine`]. Not part of the public API surface — run with
//! `cargo run --example basic_build` against a scratch directory containing
//! an `a.c` file.

use std::env;
use std::fs;

use pake::{Engine, EngineConfig};
use regex::Regex;

fn main() -> anyhow::Result<()> {
    let root = env::current_dir()?;
    let mut engine = Engine::new(EngineConfig::default_at(&root));

    build_rules(&mut engine);

    let rebuilt = engine.build(&[])?;
    println!("rebuilt {rebuilt} target(s)");
    Ok(())
}

fn build_rules(engine: &mut Engine) {
    // Exact rule: one named target, hand-written recipe.
    engine
        .register_exact("version.txt", vec![], Box::new(|target, _deps| {
            fs::write(target.trim_start_matches("./"), env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }))
        .expect("version.txt registered once");

    // Pattern rule: any `*.o` target compiles from the `*.c` of the same stem.
    engine
        .register_pattern(
            Regex::new(r"(.*)\.o").unwrap(),
            vec![r"\1.c".to_string()],
            Box::new(|target, _deps, _groups| {
                let object_path = target.trim_start_matches("./");
                fs::write(object_path, b"compiled object")?;
                Ok(())
            }),
        )
        .expect("*.o pattern registered once");

    // Virtual alias/group: `all` depends on two file targets.
    engine
        .group("all", vec!["a.o".to_string(), "version.txt".to_string()])
        .expect("all registered once");

    // always-dependent virtual rule: rebuilds its JSON payload every run.
    engine
        .register_always(
            "build_info",
            vec![],
            Box::new(|_deps| Ok(serde_json::json!({ "built_by": "basic_build demo" }))),
        )
        .expect("build_info registered once");

    engine
        .mark_default("all")
        .expect("mark_default called once per engine");
}
