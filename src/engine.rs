use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use regex::Regex;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::hash;
use crate::recipe::{self, DepResults, ExactRecipe, MatchGroups, PatternRecipe, VirtualRecipe};
use crate::registry::{Matched, Registry};
use crate::result::{self, ResultValue};
use crate::rule::{self as rule_mod, ExactRule, PatternRule, VirtualRule};
use crate::state::{StateEntry, StateStore};

/// The dependency and invalidation engine.
///
/// Owns no global state: a build script builds an `Engine` value by calling
/// its `register_*`/`alias`/`group` methods, then hands it target names via
/// [`Engine::build`]. Registration is rejected once `build` has run once.
pub struct Engine {
    registry: Registry,
    config: EngineConfig,
    store: StateStore,
    state: HashMap<String, StateEntry>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl Engine {
    /// Creates an engine rooted at `config.root`, with the built-in
    /// `always` rule already registered.
    pub fn new(config: EngineConfig) -> Self {
        let store = StateStore::new(config.state_file.clone());
        let mut engine = Engine {
            registry: Registry::default(),
            config,
            store,
            state: HashMap::new(),
            interrupt: None,
        };
        engine.register_builtin_always();
        engine
    }

    /// Registers a shared flag the engine polls between recipe invocations.
    /// When the host sets it (e.g. from a Ctrl-C handler), the engine stops
    /// starting new recipes, flushes the State Store with whatever was
    /// already recorded this run, and returns [`EngineError::Interrupted`].
    /// In-progress recipes are never forcibly cancelled (§5: the engine has
    /// no suspension API to recipes).
    pub fn set_interrupt_flag(&mut self, flag: Arc<AtomicBool>) {
        self.interrupt = Some(flag);
    }

    fn register_builtin_always(&mut self) {
        self.registry
            .register_virtual_inner(
                "always",
                vec![],
                Box::new(|_deps: &DepResults| Ok(result::unique())),
                true,
            )
            .expect("registering the built-in `always` rule cannot fail");
    }

    pub fn register_exact(
        &mut self,
        target: &str,
        deps: Vec<String>,
        recipe: ExactRecipe,
    ) -> EngineResult<()> {
        self.registry.register_exact(target, deps, recipe)
    }

    pub fn register_pattern(
        &mut self,
        regex: Regex,
        dep_templates: Vec<String>,
        recipe: PatternRecipe,
    ) -> EngineResult<()> {
        self.registry.register_pattern(regex, dep_templates, recipe)
    }

    pub fn register_virtual(
        &mut self,
        name: &str,
        deps: Vec<String>,
        recipe: VirtualRecipe,
    ) -> EngineResult<()> {
        self.registry.register_virtual(name, deps, recipe)
    }

    /// `@always`: wraps a virtual rule, prepending `"always"` to its deps
    /// so it rebuilds on every invocation.
    pub fn register_always(
        &mut self,
        name: &str,
        deps: Vec<String>,
        recipe: VirtualRecipe,
    ) -> EngineResult<()> {
        let mut deps = deps;
        deps.insert(0, "always".to_string());
        self.registry.register_virtual(name, deps, recipe)
    }

    /// `alias(name, target)`: sugar for a single-dep [`Engine::group`].
    pub fn alias(&mut self, name: &str, target: &str) -> EngineResult<()> {
        self.group(name, vec![target.to_string()])
    }

    /// `group(name, targets)`: registers a virtual rule whose recipe
    /// returns a JSON object summarizing its deps' results, so the group's
    /// own result changes iff any dep's result changes.
    pub fn group(&mut self, name: &str, targets: Vec<String>) -> EngineResult<()> {
        self.registry
            .register_virtual(name, targets, Box::new(recipe::passthrough_recipe))
    }

    /// `@default`: marks `target` as the target built when `build` is
    /// called with no arguments. Equivalent to registering an alias virtual
    /// rule named `"default"` pointing at `target`. May only be called
    /// once per engine.
    ///
    /// Rejected with [`EngineError::DefaultOnPatternRule`] when `target`
    /// only matches a `Pattern` rule — a pattern rule has no single concrete
    /// target to alias, so it cannot be marked default.
    pub fn mark_default(&mut self, target: &str) -> EngineResult<()> {
        if self.registry.has_virtual("default") {
            return Err(EngineError::DuplicateRule("default".to_string()));
        }
        if let Matched::Pattern(..) = self.registry.match_raw(target)? {
            return Err(EngineError::DefaultOnPatternRule(target.to_string()));
        }
        self.registry.insert_virtual_replacing(VirtualRule {
            name: "default".to_string(),
            deps: vec![target.to_string()],
            recipe: Box::new(recipe::passthrough_recipe),
            force_always: false,
        })
    }

    /// Resolves each target in order, returning the number of targets whose
    /// recipe actually ran. Aborts on the first error, but the State Store
    /// is flushed with whatever was successfully recorded before bubbling
    /// the error up.
    pub fn build(&mut self, targets: &[String]) -> EngineResult<usize> {
        self.registry.freeze();
        self.state = self.store.load();

        let resolved_targets: Vec<String> = if targets.is_empty() {
            if !self.registry.has_virtual("default") {
                return Err(EngineError::NoRule("default".to_string()));
            }
            vec!["default".to_string()]
        } else {
            targets.to_vec()
        };

        let (rebuilt, outcome) = {
            let mut run = Run {
                registry: &self.registry,
                root: &self.config.root,
                state: &mut self.state,
                memo: HashMap::new(),
                stack: Vec::new(),
                rebuilt: 0,
                interrupt: self.interrupt.as_ref(),
            };

            let outcome: EngineResult<()> = (|| {
                for target in &resolved_targets {
                    tracing::info!(target = %target, "resolving");
                    run.resolve(target)?;
                }
                Ok(())
            })();

            (run.rebuilt, outcome)
        };

        // Flushed unconditionally, with whatever was recorded so far, before
        // a build error (if any) is allowed to propagate — partial progress
        // on a failed run must not be lost.
        let save_outcome = self.store.save(&self.state);
        outcome?;
        save_outcome?;
        Ok(rebuilt)
    }
}

/// One call to `build`'s worth of mutable scheduling state: memoized
/// results, the in-progress stack for cycle detection, and the rebuild
/// counter. Kept separate from `Engine` so that `registry` (read-only once
/// frozen) and `state` (read-write) can be borrowed independently —
/// `Engine::build` itself is the only thing that needs `&mut self` on the
/// whole engine.
struct Run<'a> {
    registry: &'a Registry,
    root: &'a Path,
    state: &'a mut HashMap<String, StateEntry>,
    memo: HashMap<String, ResultValue>,
    stack: Vec<String>,
    rebuilt: usize,
    interrupt: Option<&'a Arc<AtomicBool>>,
}

impl<'a> Run<'a> {
    /// Checked right after a recipe returns successfully, before the engine
    /// would otherwise move on to the next target. The just-completed
    /// target's result has already been recorded by the caller, so an
    /// `Interrupted` here still leaves that result in the State Store.
    fn check_interrupted(&self) -> EngineResult<()> {
        match self.interrupt {
            Some(flag) if flag.load(Ordering::SeqCst) => Err(EngineError::Interrupted),
            _ => Ok(()),
        }
    }

    fn resolve(&mut self, raw: &str) -> EngineResult<ResultValue> {
        match self.registry.match_raw(raw)? {
            Matched::Virtual(rule) => self.with_guard(rule.name.clone(), |run| run.build_virtual(rule)),
            Matched::Exact(rule) => self.with_guard(rule.target.clone(), |run| run.build_exact(rule)),
            Matched::Pattern(rule, canonical, groups) => {
                let key = canonical.clone();
                self.with_guard(key.clone(), move |run| run.build_pattern(rule, &key, &groups))
            }
            Matched::Fallback(canonical) => {
                self.with_guard(canonical.clone(), move |run| run.build_fallback(&canonical))
            }
        }
    }

    /// Memoizes by `key` (at-most-one-build-per-target-per-run) and detects
    /// cycles via a per-run stack of in-progress targets.
    fn with_guard(
        &mut self,
        key: String,
        compute: impl FnOnce(&mut Self) -> EngineResult<ResultValue>,
    ) -> EngineResult<ResultValue> {
        if let Some(cached) = self.memo.get(&key) {
            return Ok(cached.clone());
        }
        if self.stack.contains(&key) {
            let mut path = self.stack.clone();
            path.push(key);
            return Err(EngineError::Cycle(path));
        }

        self.stack.push(key.clone());
        let outcome = compute(self);
        self.stack.pop();

        let result = outcome?;
        self.memo.insert(key, result.clone());
        Ok(result)
    }

    fn resolve_deps(&mut self, deps: &[String]) -> EngineResult<DepResults> {
        let mut out = Vec::with_capacity(deps.len());
        for dep in deps {
            let result = self.resolve(dep)?;
            out.push((dep.clone(), result));
        }
        Ok(out)
    }

    fn build_virtual(&mut self, rule: &'a VirtualRule) -> EngineResult<ResultValue> {
        let dep_results = self.resolve_deps(&rule.deps)?;
        let fresh_sig = compute_input_sig("virtual", &rule.name, &dep_results);
        let prior = self.state.get(&rule.name);

        let dirty = rule.force_always
            || prior.map(|p| p.input_sig != fresh_sig).unwrap_or(true);

        if dirty {
            let reason = if rule.force_always {
                "always"
            } else if prior.is_none() {
                "prior missing"
            } else {
                "input_sig changed"
            };
            tracing::debug!(target = %rule.name, reason, "rebuilding virtual rule");
        }

        let result = if dirty {
            let value = (rule.recipe)(&dep_results).map_err(|e| EngineError::RecipeFailed {
                target: rule.name.clone(),
                cause: e.0,
            })?;
            self.rebuilt += 1;
            ResultValue::Json(value)
        } else {
            prior.unwrap().result.clone()
        };

        self.state.insert(
            rule.name.clone(),
            StateEntry {
                result: result.clone(),
                input_sig: fresh_sig,
            },
        );
        if dirty {
            self.check_interrupted()?;
        }
        Ok(result)
    }

    fn build_exact(&mut self, rule: &'a ExactRule) -> EngineResult<ResultValue> {
        let dep_results = self.resolve_deps(&rule.deps)?;
        self.build_file_rule(&rule.target, &dep_results, "exact", |target| {
            (rule.recipe)(target, &dep_results)
        })
    }

    fn build_pattern(
        &mut self,
        rule: &'a PatternRule,
        canonical: &str,
        groups: &MatchGroups,
    ) -> EngineResult<ResultValue> {
        let dep_names: Vec<String> = rule
            .dep_templates
            .iter()
            .map(|template| rule_mod::substitute_template(template, groups))
            .collect();
        let dep_results = self.resolve_deps(&dep_names)?;
        self.build_file_rule(canonical, &dep_results, "pattern", |target| {
            (rule.recipe)(target, &dep_results, groups)
        })
    }

    /// Shared rebuild decision and bookkeeping for file-producing rules
    /// (exact and pattern): rebuild iff the prior entry is missing, the
    /// file is missing on disk, the input signature changed, or the stored
    /// file digest disagrees with what's on disk right now.
    fn build_file_rule(
        &mut self,
        target: &str,
        dep_results: &DepResults,
        rule_kind: &str,
        invoke: impl FnOnce(&str) -> Result<(), crate::recipe::RecipeError>,
    ) -> EngineResult<ResultValue> {
        let fresh_sig = compute_input_sig(rule_kind, target, dep_results);
        let file_path = self.file_path(target);
        // An I/O error reading the target (e.g. permission denied) is treated the
        // same as the target being missing: per the rebuild decision, "missing or
        // unreadable" means dirty, not a fatal error that aborts the whole build.
        let on_disk_digest = match hash::digest_path(&file_path) {
            Ok(digest) => digest,
            Err(e) => {
                tracing::debug!(target, error = %e, "target unreadable, treating as dirty");
                None
            }
        };

        let prior = self.state.get(target);
        let prior_file_digest = prior.and_then(|p| match &p.result {
            ResultValue::FileDigest(d) => Some(d.as_str()),
            _ => None,
        });

        let dirty = prior.is_none()
            || on_disk_digest.is_none()
            || prior.map(|p| p.input_sig != fresh_sig).unwrap_or(true)
            || prior_file_digest != on_disk_digest.as_deref();

        if dirty {
            let reason = if prior.is_none() {
                "prior missing"
            } else if on_disk_digest.is_none() {
                "file missing"
            } else if prior.map(|p| p.input_sig != fresh_sig).unwrap_or(true) {
                "input_sig changed"
            } else {
                "file changed"
            };
            tracing::debug!(target, reason, "rebuilding file rule");
        }

        let final_digest = if dirty {
            invoke(target).map_err(|e| EngineError::RecipeFailed {
                target: target.to_string(),
                cause: e.0,
            })?;
            self.rebuilt += 1;
            hash::digest_path(&file_path)?
                .ok_or_else(|| EngineError::TargetNotProduced(target.to_string()))?
        } else {
            on_disk_digest.expect("checked above: None implies dirty")
        };

        let result = ResultValue::FileDigest(final_digest);
        self.state.insert(
            target.to_string(),
            StateEntry {
                result: result.clone(),
                input_sig: fresh_sig,
            },
        );
        if dirty {
            self.check_interrupted()?;
        }
        Ok(result)
    }

    fn build_fallback(&mut self, canonical: &str) -> EngineResult<ResultValue> {
        let file_path = self.file_path(canonical);
        let digest = hash::digest_path(&file_path)?
            .ok_or_else(|| EngineError::MissingSource(canonical.to_string()))?;
        let result = ResultValue::FileDigest(digest);
        self.state.insert(
            canonical.to_string(),
            StateEntry {
                result: result.clone(),
                input_sig: String::new(),
            },
        );
        Ok(result)
    }

    fn file_path(&self, canonical: &str) -> std::path::PathBuf {
        self.root.join(canonical.trim_start_matches("./"))
    }
}

/// `fresh_input_sig = digest over (rule kind, rule identity, canonicalized dep_sig)`,
/// per the scheduler's rebuild decision (§4.5 step 6 in the design notes).
fn compute_input_sig(rule_kind: &str, identity: &str, deps: &DepResults) -> String {
    let dep_sig: Vec<JsonValue> = deps
        .iter()
        .map(|(name, result)| serde_json::json!([name, dep_signature_json(result)]))
        .collect();
    let envelope = serde_json::json!([rule_kind, identity, dep_sig]);
    hash::digest_json(&envelope)
}

/// Renders a dependency's result for signature hashing. Unlike
/// [`crate::recipe::result_to_json`] (used for `alias`/`group` pass-through
/// values), `Absent` is rendered here as a fresh random marker so its
/// signature never matches a prior run's: "any dep's stored result is
/// Absent" must always force a rebuild, and a stable `null` would defeat
/// that by comparing equal to itself across runs.
fn dep_signature_json(result: &ResultValue) -> JsonValue {
    match result {
        ResultValue::Absent => JsonValue::String(format!("absent:{}", Uuid::new_v4())),
        other => recipe::result_to_json(other),
    }
}
