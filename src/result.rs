use serde_json::Value as JsonValue;
use uuid::Uuid;

/// The tagged value recorded for a target after it resolves.
///
/// Two [`ResultValue`]s are "equal" iff they carry the same tag and equal
/// payloads. [`ResultValue::Absent`] is never equal to anything, including
/// another `Absent` — a rule that declines to produce a comparable result
/// behaves as "always changed" for any dependent that reads it.
#[derive(Debug, Clone)]
pub enum ResultValue {
    /// Content digest of a regular file, or of a directory's sorted entry
    /// names — see [`crate::hash::digest_path`].
    FileDigest(String),
    /// Any JSON-representable value returned by a virtual recipe.
    Json(JsonValue),
    /// The rule ran but declined to produce a comparable result.
    Absent,
}

impl PartialEq for ResultValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ResultValue::FileDigest(a), ResultValue::FileDigest(b)) => a == b,
            (ResultValue::Json(a), ResultValue::Json(b)) => a == b,
            // Absent is never equal to anything, Absent included.
            _ => false,
        }
    }
}

impl ResultValue {
    pub fn kind(&self) -> &'static str {
        match self {
            ResultValue::FileDigest(_) => "file",
            ResultValue::Json(_) => "json",
            ResultValue::Absent => "absent",
        }
    }

    /// `true` if this is [`ResultValue::Absent`] — dependents must treat it
    /// as always dirty rather than compare payloads.
    pub fn is_absent(&self) -> bool {
        matches!(self, ResultValue::Absent)
    }
}

/// A fresh sentinel distinct from every prior run's sentinel.
///
/// Backing implementation: a random UUID encoded as a JSON string. Because
/// `unique()`'s entire purpose is non-reproducibility, it is the one result
/// value explicitly exempt from the "identical bytes across two runs implies
/// no rebuild" invariant — callers that want a target to always rebuild
/// depend on a virtual rule whose recipe returns `unique()`.
pub fn unique() -> JsonValue {
    JsonValue::String(Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_never_equals_absent() {
        assert_ne!(ResultValue::Absent, ResultValue::Absent);
    }

    #[test]
    fn file_digests_compare_by_value() {
        let a = ResultValue::FileDigest("abc".into());
        let b = ResultValue::FileDigest("abc".into());
        let c = ResultValue::FileDigest("def".into());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn json_values_compare_structurally_regardless_of_key_order() {
        let a = ResultValue::Json(serde_json::json!({"a": 1, "b": 2}));
        let b = ResultValue::Json(serde_json::json!({"b": 2, "a": 1}));
        assert_eq!(a, b);
    }

    #[test]
    fn different_tags_are_never_equal() {
        let a = ResultValue::FileDigest("abc".into());
        let b = ResultValue::Json(serde_json::json!("abc"));
        assert_ne!(a, b);
    }

    #[test]
    fn unique_sentinels_differ_across_calls() {
        assert_ne!(unique(), unique());
    }
}
