use std::path::PathBuf;

use thiserror::Error;

/// Every way the engine can fail to resolve or build a target.
///
/// Each variant carries enough context to print the `<target>: <message>`
/// line the CLI surfaces (see [`crate::cli_exit_code`]).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}: no rule matches this target")]
    NoRule(String),

    #[error("{0}: source file does not exist")]
    MissingSource(String),

    #[error("{0}: resolves outside the engine root")]
    OutOfRoot(String),

    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<String>),

    #[error("{target}: recipe failed: {cause}")]
    RecipeFailed { target: String, cause: String },

    #[error("{0}: recipe completed without producing the target file")]
    TargetNotProduced(String),

    #[error("{0}: recipe returned a value that is not valid JSON")]
    InvalidResult(String),

    #[error("registry is frozen: rules cannot be registered after the first build()")]
    RegistryFrozen,

    #[error("{0}: a rule for this name is already registered")]
    DuplicateRule(String),

    #[error("{0}: only matched via a pattern rule, which cannot be marked as default")]
    DefaultOnPatternRule(String),

    #[error("build was interrupted")]
    Interrupted,

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config error: {0}")]
    Config(String),
}

fn format_cycle(stack: &[String]) -> String {
    stack.join(" -> ")
}

impl EngineError {
    /// The target this error is attributed to, for the `<target>: <message>` CLI line.
    /// Structural errors with no single target (registry/config/interrupt) return `None`.
    pub fn target(&self) -> Option<&str> {
        match self {
            EngineError::NoRule(t)
            | EngineError::MissingSource(t)
            | EngineError::OutOfRoot(t)
            | EngineError::TargetNotProduced(t)
            | EngineError::InvalidResult(t)
            | EngineError::DuplicateRule(t)
            | EngineError::DefaultOnPatternRule(t) => Some(t),
            EngineError::RecipeFailed { target, .. } => Some(target),
            EngineError::Cycle(_)
            | EngineError::RegistryFrozen
            | EngineError::Interrupted
            | EngineError::Io { .. }
            | EngineError::Config(_) => None,
        }
    }

    /// Process exit code per the category table in the engine's CLI contract.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::RecipeFailed { .. } | EngineError::MissingSource(_) => 1,
            EngineError::Interrupted => 3,
            _ => 2,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
