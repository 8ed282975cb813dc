//! `pake`: a build engine invalidated by the content of what a rule
//! produces, not by file timestamps.
//!
//! A build script constructs an [`Engine`], registers exact, pattern, and
//! virtual rules against it, and calls [`Engine::build`] with the target
//! names to resolve. Rebuild decisions turn on each target's *input
//! signature* — a digest of its rule identity and the tagged results of its
//! dependencies — compared against what was stored the last time that
//! target was resolved, plus (for file-producing rules) a check that the
//! on-disk content digest still matches what was recorded.

mod config;
mod engine;
mod error;
mod hash;
mod normalize;
mod recipe;
mod registry;
mod result;
mod rule;
mod state;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use recipe::{DepResults, ExactRecipe, MatchGroups, PatternRecipe, RecipeError, VirtualRecipe};
pub use result::{unique, ResultValue};
