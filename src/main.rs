use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use pake::{Engine, EngineConfig, EngineError};

/// Rebuild targets whose content-addressed inputs have changed.
#[derive(Parser, Debug)]
#[command(name = "pake", version, about)]
struct Cli {
    /// Targets to resolve. With none given, resolves the `default` virtual rule.
    targets: Vec<String>,

    /// Engine root. Defaults to the current directory.
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Overrides the state file path (relative to root unless absolute).
    #[arg(long, value_name = "PATH")]
    state_file: Option<PathBuf>,

    /// Increase log verbosity. Repeat for more (`-v` info, `-vv` debug).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print the build result as a single JSON line instead of plain text.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let targets_requested = if cli.targets.is_empty() { 1 } else { cli.targets.len() };
    let started = Instant::now();

    match run(&cli) {
        Ok(rebuilt) => {
            let elapsed_ms = started.elapsed().as_millis();
            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "resolved": targets_requested,
                        "rebuilt": rebuilt,
                        "elapsed_ms": elapsed_ms,
                    })
                );
            } else {
                println!("rebuilt {rebuilt} target(s) in {elapsed_ms}ms");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if let Some(engine_err) = err.downcast_ref::<EngineError>() {
                report_engine_error(engine_err, cli.json);
                ExitCode::from(engine_err.exit_code() as u8)
            } else {
                eprintln!("error: {err:#}");
                ExitCode::from(2)
            }
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<usize> {
    let root = match &cli.root {
        Some(r) => r.clone(),
        None => std::env::current_dir().context("determining current directory")?,
    };

    let mut config = EngineConfig::load(&root)?;
    if let Some(state_file) = &cli.state_file {
        config.state_file = if state_file.is_absolute() {
            state_file.clone()
        } else {
            config.root.join(state_file)
        };
    }

    let engine_root = config.root.clone();
    let mut engine = Engine::new(config);
    engine.set_interrupt_flag(install_interrupt_flag()?);
    build_rules(&mut engine, &engine_root)?;
    Ok(engine.build(&cli.targets)?)
}

/// Installs a process-wide Ctrl-C handler that flips a shared flag rather
/// than terminating the process outright, so the engine gets a chance to
/// finish its in-flight recipe and flush the State Store (§5: in-progress
/// recipes are never forcibly cancelled).
fn install_interrupt_flag() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = flag.clone();
    ctrlc::set_handler(move || handler_flag.store(true, std::sync::atomic::Ordering::SeqCst))
        .context("installing Ctrl-C handler")?;
    Ok(flag)
}

/// Registers the rule set for this root. A real deployment of this binary
/// loads these declaratively (see the demo build script); wired directly
/// here so `pake` is runnable standalone against whatever is on disk.
///
/// The one built-in rule compiles `*.o` from a same-stem `*.c` by copying
/// its bytes — there is no real toolchain behind this binary, only the
/// scheduling and invalidation logic around one.
fn build_rules(engine: &mut Engine, root: &std::path::Path) -> anyhow::Result<()> {
    let root = root.to_path_buf();
    engine.register_pattern(
        regex::Regex::new(r"(.*)\.o").unwrap(),
        vec![r"\1.c".to_string()],
        Box::new(move |target, deps, _groups| {
            let source = deps
                .first()
                .map(|(_, result)| result)
                .ok_or_else(|| pake::RecipeError::new("expected one dependency: the source file"))?;
            if source.is_absent() {
                return Err(pake::RecipeError::new("source dependency is absent"));
            }
            let object_path = target.trim_start_matches("./");
            let source_path = object_path.trim_end_matches(".o").to_string() + ".c";
            std::fs::copy(root.join(&source_path), root.join(object_path))?;
            Ok(())
        }),
    )?;
    Ok(())
}

fn report_engine_error(err: &EngineError, json: bool) {
    if json {
        eprintln!(
            "{}",
            serde_json::json!({ "error": err.to_string(), "target": err.target() })
        );
        return;
    }
    match err.target() {
        Some(target) => eprintln!("{target}: {err}"),
        None => eprintln!("{err}"),
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .with_target(false)
        .init();
}
