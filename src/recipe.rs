use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::result::ResultValue;

/// The ordered dep-name → result mapping a recipe is invoked with, in the
/// declaration order of the rule's deps list.
pub type DepResults = Vec<(String, ResultValue)>;

/// Regex capture groups from a pattern match, as owned strings.
///
/// Index 0 is group `\1`, index 1 is group `\2`, and so on — an unmatched
/// optional group is `None`.
#[derive(Debug, Clone, Default)]
pub struct MatchGroups(pub(crate) Vec<Option<String>>);

impl MatchGroups {
    /// Group `\n` (1-indexed, matching the backreference numbering used in
    /// dependency templates).
    pub fn get(&self, n: usize) -> Option<&str> {
        self.0.get(n.checked_sub(1)?).and_then(|g| g.as_deref())
    }
}

/// Error a recipe raises to signal it could not produce its target.
///
/// The engine wraps this as [`crate::error::EngineError::RecipeFailed`],
/// attributing it to whichever target was being resolved.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct RecipeError(pub String);

impl RecipeError {
    pub fn new(message: impl Into<String>) -> Self {
        RecipeError(message.into())
    }
}

impl From<std::io::Error> for RecipeError {
    fn from(e: std::io::Error) -> Self {
        RecipeError(e.to_string())
    }
}

/// Recipe for an [`crate::rule::ExactRule`]: invoked with the canonical
/// target and its deps' results. The file is expected to exist on disk when
/// this returns `Ok`; the engine hashes it afterward, so there is nothing
/// meaningful to return.
pub type ExactRecipe = Box<dyn Fn(&str, &DepResults) -> Result<(), RecipeError> + Send + Sync>;

/// Recipe for a [`crate::rule::PatternRule`]: as [`ExactRecipe`], plus the
/// regex match object for the matched target.
pub type PatternRecipe =
    Box<dyn Fn(&str, &DepResults, &MatchGroups) -> Result<(), RecipeError> + Send + Sync>;

/// Recipe for a [`crate::rule::VirtualRule`]: invoked with its deps' results,
/// returns the JSON value to be recorded as the target's new result.
pub type VirtualRecipe = Box<dyn Fn(&DepResults) -> Result<JsonValue, RecipeError> + Send + Sync>;

/// The `alias`/`group` pass-through recipe: an object mapping each dep's
/// name to its result (rendered as JSON), so the alias's own result changes
/// iff any dep's result changes.
pub(crate) fn passthrough_recipe(deps: &DepResults) -> Result<JsonValue, RecipeError> {
    let mut map = serde_json::Map::with_capacity(deps.len());
    for (name, result) in deps {
        map.insert(name.clone(), result_to_json(result));
    }
    Ok(JsonValue::Object(map))
}

/// Renders a [`ResultValue`] as JSON for embedding in a pass-through result
/// or a signature computation. `Absent` becomes `null` here — callers that
/// need "Absent never compares equal" semantics must not rely on this
/// rendering for equality (see [`crate::engine::dep_signature_json`]).
pub(crate) fn result_to_json(result: &ResultValue) -> JsonValue {
    match result {
        ResultValue::FileDigest(digest) => JsonValue::String(digest.clone()),
        ResultValue::Json(value) => value.clone(),
        ResultValue::Absent => JsonValue::Null,
    }
}
