use regex::Regex;

use crate::recipe::{ExactRecipe, MatchGroups, PatternRecipe, VirtualRecipe};

/// `Exact(target, deps, recipe)` — matches exactly one canonical target.
pub(crate) struct ExactRule {
    pub target: String,
    pub deps: Vec<String>,
    pub recipe: ExactRecipe,
}

/// `Pattern(regex, dep_templates, recipe)` — matches any canonical file
/// target whose canonical form (with or without the leading `./`) matches
/// the regex in full.
pub(crate) struct PatternRule {
    pub regex: Regex,
    pub dep_templates: Vec<String>,
    pub recipe: PatternRecipe,
}

/// `Virtual(name, deps, recipe)` — matches exactly one non-path target name.
pub(crate) struct VirtualRule {
    pub name: String,
    pub deps: Vec<String>,
    pub recipe: VirtualRecipe,
    /// `true` only for the built-in `always` rule: forces a rebuild on
    /// every invocation regardless of its (empty) deps.
    pub force_always: bool,
}

/// Substitutes numbered backreferences (`\1`, `\2`, …) in a pattern rule's
/// dependency template with the corresponding capture group from matching
/// the rule's regex against the target.
pub(crate) fn substitute_template(template: &str, groups: &MatchGroups) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(d) = chars.peek().copied() {
                if d.is_ascii_digit() {
                    chars.next();
                    let n = d.to_digit(10).unwrap() as usize;
                    out.push_str(groups.get(n).unwrap_or(""));
                    continue;
                }
            }
        }
        out.push(c);
    }

    out
}

/// Matches `regex` against `canonical` in full, trying the canonical form
/// with its `./` prefix first and falling back to the stripped form — the
/// two necessarily agree on capture groups by construction, so preferring
/// the longer (prefixed) match when both succeed is just a matter of trying
/// it first.
pub(crate) fn match_canonical(regex: &Regex, canonical: &str) -> Option<MatchGroups> {
    full_match(regex, canonical).or_else(|| {
        canonical
            .strip_prefix("./")
            .and_then(|stripped| full_match(regex, stripped))
    })
}

fn full_match(regex: &Regex, haystack: &str) -> Option<MatchGroups> {
    let caps = regex.captures(haystack)?;
    let whole = caps.get(0)?;
    if whole.start() != 0 || whole.end() != haystack.len() {
        return None;
    }

    let groups = (1..caps.len())
        .map(|i| caps.get(i).map(|m| m.as_str().to_string()))
        .collect();
    Some(MatchGroups(groups))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_single_backreference() {
        let groups = MatchGroups(vec![Some("a".to_string())]);
        assert_eq!(substitute_template(r"\1.c", &groups), "a.c");
    }

    #[test]
    fn substitutes_multiple_backreferences_in_order() {
        let groups = MatchGroups(vec![Some("lib".to_string()), Some("core".to_string())]);
        assert_eq!(substitute_template(r"\2/\1.rs", &groups), "core/lib.rs");
    }

    #[test]
    fn full_match_rejects_partial_matches() {
        let re = Regex::new(r"(.*)\.o").unwrap();
        assert!(match_canonical(&re, "./a.o.bak").is_none());
    }

    #[test]
    fn full_match_accepts_with_or_without_prefix() {
        let re = Regex::new(r"(.*)\.o").unwrap();
        assert!(match_canonical(&re, "./a.o").is_some());

        let re2 = Regex::new(r"a\.o").unwrap();
        assert!(match_canonical(&re2, "./a.o").is_some());
    }
}
