use std::collections::HashMap;

use regex::Regex;

use crate::error::{EngineError, EngineResult};
use crate::normalize;
use crate::recipe::{ExactRecipe, MatchGroups, PatternRecipe, VirtualRecipe};
use crate::rule::{self, ExactRule, PatternRule, VirtualRule};

/// The outcome of matching a raw target string to a rule, per the
/// precedence order: virtual-by-raw-name > exact-by-canonical-path >
/// pattern-by-registration-order > fallback.
pub(crate) enum Matched<'a> {
    Virtual(&'a VirtualRule),
    Exact(&'a ExactRule),
    /// The matched pattern rule, the canonical target it matched, and the
    /// regex capture groups from that match.
    Pattern(&'a PatternRule, String, MatchGroups),
    /// Canonical path with no matching rule; caller must check existence.
    Fallback(String),
}

/// Holds the three ordered kinds of rules registered by the build script.
/// Frozen after the first `build()` call — further registration is
/// rejected with [`EngineError::RegistryFrozen`].
#[derive(Default)]
pub(crate) struct Registry {
    exact: HashMap<String, ExactRule>,
    virtuals: HashMap<String, VirtualRule>,
    patterns: Vec<PatternRule>,
    frozen: bool,
}

impl Registry {
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    fn check_mutable(&self) -> EngineResult<()> {
        if self.frozen {
            Err(EngineError::RegistryFrozen)
        } else {
            Ok(())
        }
    }

    pub fn register_exact(
        &mut self,
        target: &str,
        deps: Vec<String>,
        recipe: ExactRecipe,
    ) -> EngineResult<()> {
        self.check_mutable()?;
        let canonical = normalize::canonicalize(target)?;
        if self.exact.contains_key(&canonical) {
            return Err(EngineError::DuplicateRule(canonical));
        }
        tracing::debug!(target = %canonical, "registered exact rule");
        self.exact.insert(
            canonical.clone(),
            ExactRule {
                target: canonical,
                deps,
                recipe,
            },
        );
        Ok(())
    }

    pub fn register_pattern(
        &mut self,
        regex: Regex,
        dep_templates: Vec<String>,
        recipe: PatternRecipe,
    ) -> EngineResult<()> {
        self.check_mutable()?;
        tracing::debug!(regex = %regex.as_str(), "registered pattern rule");
        self.patterns.push(PatternRule {
            regex,
            dep_templates,
            recipe,
        });
        Ok(())
    }

    pub fn register_virtual(
        &mut self,
        name: &str,
        deps: Vec<String>,
        recipe: VirtualRecipe,
    ) -> EngineResult<()> {
        self.register_virtual_inner(name, deps, recipe, false)
    }

    pub(crate) fn register_virtual_inner(
        &mut self,
        name: &str,
        deps: Vec<String>,
        recipe: VirtualRecipe,
        force_always: bool,
    ) -> EngineResult<()> {
        self.check_mutable()?;
        if self.virtuals.contains_key(name) {
            return Err(EngineError::DuplicateRule(name.to_string()));
        }
        tracing::debug!(name, force_always, "registered virtual rule");
        self.virtuals.insert(
            name.to_string(),
            VirtualRule {
                name: name.to_string(),
                deps,
                recipe,
                force_always,
            },
        );
        Ok(())
    }

    /// Overwrites (rather than rejects) an existing virtual rule. Used only
    /// by `mark_default`, which registers `default` as an alias the first
    /// time it is asked for and is allowed to be called once per engine.
    pub(crate) fn insert_virtual_replacing(&mut self, rule: VirtualRule) -> EngineResult<()> {
        self.check_mutable()?;
        self.virtuals.insert(rule.name.clone(), rule);
        Ok(())
    }

    pub fn has_virtual(&self, name: &str) -> bool {
        self.virtuals.contains_key(name)
    }

    pub fn has_exact(&self, canonical: &str) -> bool {
        self.exact.contains_key(canonical)
    }

    pub fn exact_deps(&self, canonical: &str) -> Option<&[String]> {
        self.exact.get(canonical).map(|r| r.deps.as_slice())
    }

    /// Matches a raw target string (as given on the command line or in a
    /// dependency list) to its rule, per the precedence order in the
    /// registry's matching table: the raw string is probed against the
    /// virtual map first; only if that misses is it normalized as a path
    /// and matched against the file rules.
    pub fn match_raw(&self, raw: &str) -> EngineResult<Matched<'_>> {
        if let Some(v) = self.virtuals.get(raw) {
            return Ok(Matched::Virtual(v));
        }

        let canonical = normalize::canonicalize(raw)?;

        if let Some(e) = self.exact.get(&canonical) {
            return Ok(Matched::Exact(e));
        }

        for pattern in &self.patterns {
            if let Some(groups) = rule::match_canonical(&pattern.regex, &canonical) {
                return Ok(Matched::Pattern(pattern, canonical, groups));
            }
        }

        Ok(Matched::Fallback(canonical))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::DepResults;

    fn noop_exact() -> ExactRecipe {
        Box::new(|_t: &str, _d: &DepResults| Ok(()))
    }

    #[test]
    fn exact_beats_pattern() {
        let mut reg = Registry::default();
        reg.register_exact("X", vec![], noop_exact()).unwrap();
        reg.register_pattern(
            Regex::new(r"X").unwrap(),
            vec![],
            Box::new(|_t: &str, _d: &DepResults, _m: &MatchGroups| Ok(())),
        )
        .unwrap();

        match reg.match_raw("./X").unwrap() {
            Matched::Exact(r) => assert_eq!(r.target, "./X"),
            _ => panic!("expected exact match"),
        }
    }

    #[test]
    fn virtual_by_raw_name_beats_exact_for_bare_name() {
        let mut reg = Registry::default();
        reg.register_virtual(
            "foo",
            vec![],
            Box::new(|_d: &DepResults| Ok(serde_json::json!(null))),
        )
        .unwrap();
        reg.register_exact("foo", vec![], noop_exact()).unwrap();

        assert!(matches!(reg.match_raw("foo").unwrap(), Matched::Virtual(_)));
        assert!(matches!(reg.match_raw("./foo").unwrap(), Matched::Exact(_)));
    }

    #[test]
    fn first_registered_pattern_wins_on_tie() {
        let mut reg = Registry::default();
        reg.register_pattern(
            Regex::new(r".*\.o").unwrap(),
            vec!["first".to_string()],
            Box::new(|_t: &str, _d: &DepResults, _m: &MatchGroups| Ok(())),
        )
        .unwrap();
        reg.register_pattern(
            Regex::new(r".*\.o").unwrap(),
            vec!["second".to_string()],
            Box::new(|_t: &str, _d: &DepResults, _m: &MatchGroups| Ok(())),
        )
        .unwrap();

        match reg.match_raw("a.o").unwrap() {
            Matched::Pattern(p, _, _) => assert_eq!(p.dep_templates, vec!["first".to_string()]),
            _ => panic!("expected pattern match"),
        }
    }

    #[test]
    fn registration_after_freeze_is_rejected() {
        let mut reg = Registry::default();
        reg.freeze();
        assert!(matches!(
            reg.register_exact("x", vec![], noop_exact()),
            Err(EngineError::RegistryFrozen)
        ));
    }

    #[test]
    fn duplicate_exact_rule_is_rejected() {
        let mut reg = Registry::default();
        reg.register_exact("x", vec![], noop_exact()).unwrap();
        assert!(matches!(
            reg.register_exact("x", vec![], noop_exact()),
            Err(EngineError::DuplicateRule(_))
        ));
    }

    #[test]
    fn fallback_when_nothing_matches() {
        let reg = Registry::default();
        assert!(matches!(reg.match_raw("plain.txt").unwrap(), Matched::Fallback(_)));
    }
}
