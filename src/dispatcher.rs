//! Rule table and dispatcher.
//!
//! Rules are evaluated in declaration order and the first one whose scope and
//! predicate both accept a module decides its strategy.

use std::collections::HashSet;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{debug, warn};

use crate::classifier::{Classifier, MatcherSet, ModuleKind, package_name};
use crate::compiler::CompilerCache;
use crate::config::{Config, MatcherConfig};
use crate::errors::{BentoError, Result};
use crate::function_map::FunctionMap;
use crate::parser;
use crate::resyntax::RewriteSet;
use crate::transformer::{ModuleDescriptor, Strategy, TransformResult};

type PredicateFn = dyn Fn(&ModuleDescriptor) -> bool + Send + Sync;

#[derive(Clone)]
pub enum RulePredicate {
    Always,
    /// Regex tested against the file path
    Pattern(Regex),
    Matcher(MatcherSet),
    Custom(Arc<PredicateFn>),
}

impl RulePredicate {
    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&ModuleDescriptor) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(predicate))
    }

    pub fn matches(&self, descriptor: &ModuleDescriptor) -> bool {
        match self {
            Self::Always => true,
            Self::Pattern(pattern) => pattern.is_match(&descriptor.file_path.to_string_lossy()),
            Self::Matcher(matchers) => matchers.matches(&descriptor.file_path.to_string_lossy()),
            Self::Custom(predicate) => predicate(descriptor),
        }
    }
}

impl std::fmt::Debug for RulePredicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Pattern(pattern) => f.debug_tuple("Pattern").field(&pattern.as_str()).finish(),
            Self::Matcher(matchers) => f.debug_tuple("Matcher").field(matchers).finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub name: String,
    pub scope: Option<ModuleKind>,
    pub predicate: RulePredicate,
    pub strategy: Strategy,
    /// Log an advisory once per package handled by this rule
    pub warn: bool,
}

impl Rule {
    pub fn new(name: impl Into<String>, strategy: Strategy) -> Self {
        Self {
            name: name.into(),
            scope: None,
            predicate: RulePredicate::Always,
            strategy,
            warn: false,
        }
    }

    pub fn scoped(mut self, kind: ModuleKind) -> Self {
        self.scope = Some(kind);
        self
    }

    pub fn when(mut self, predicate: RulePredicate) -> Self {
        self.predicate = predicate;
        self
    }

    pub fn with_warning(mut self) -> Self {
        self.warn = true;
        self
    }

    pub fn applies(&self, kind: ModuleKind, descriptor: &ModuleDescriptor) -> bool {
        if self.scope.is_some_and(|scope| scope != kind) {
            return false;
        }
        self.predicate.matches(descriptor)
    }
}

/// Ordered rules. Order is part of the contract.
#[derive(Debug, Clone, Default)]
pub struct RuleTable {
    rules: Vec<Rule>,
}

impl RuleTable {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Default table: passthrough, framework runtime, targeted packages, app code,
    /// then everything else through the compiler with a warning.
    pub fn from_config(config: &Config) -> Result<Self> {
        let compilers = Arc::new(CompilerCache::from_config(config.compile.clone()));
        let transform = &config.transform;

        let targeted: IndexMap<String, RewriteSet> = transform
            .targeted
            .iter()
            .map(|target| (target.module.clone(), RewriteSet::new(target.rewrites.iter().copied())))
            .collect();
        let targeted_matcher = MatcherSet::from_configs(&[MatcherConfig::modules(targeted.keys())])?;

        let mut rules = Vec::new();
        rules.push(
            Rule::new("passthrough", Strategy::Passthrough)
                .scoped(ModuleKind::Package)
                .when(RulePredicate::Matcher(MatcherSet::from_configs(&transform.passthrough)?)),
        );
        rules.push(
            Rule::new(
                "framework-runtime",
                Strategy::LightResyntax(RewriteSet::new(transform.light_rewrites.iter().copied())),
            )
            .scoped(ModuleKind::Framework),
        );
        if !targeted.is_empty() {
            rules.push(
                Rule::new("targeted", Strategy::TargetedResyntax(targeted))
                    .scoped(ModuleKind::Package)
                    .when(RulePredicate::Matcher(targeted_matcher)),
            );
        }
        rules.push(Rule::new("app", Strategy::FullCompile(compilers.clone())).scoped(ModuleKind::App));

        let untranspiled = Rule::new("untranspiled-module", Strategy::FullCompile(compilers));
        rules.push(if transform.warn_untranspiled {
            untranspiled.with_warning()
        } else {
            untranspiled
        });

        Ok(Self::new(rules))
    }
}

pub struct Dispatcher {
    classifier: Classifier,
    rules: RuleTable,
    warned: Mutex<HashSet<String>>,
}

impl Dispatcher {
    pub fn new(classifier: Classifier, rules: RuleTable) -> Self {
        Self {
            classifier,
            rules,
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Classifier::new(&config.classifier)?,
            RuleTable::from_config(config)?,
        ))
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// The first rule accepting the module
    pub fn select(&self, descriptor: &ModuleDescriptor) -> Result<&Rule> {
        let kind = self.classifier.classify(&descriptor.file_path);
        self.rules
            .rules()
            .iter()
            .find(|rule| rule.applies(kind, descriptor))
            .ok_or_else(|| BentoError::no_rule_matched(&descriptor.file_path))
    }

    pub fn transform(&self, descriptor: &ModuleDescriptor) -> Result<TransformResult> {
        let rule = self.select(descriptor)?;
        debug!(
            "{} -> rule '{}' ({})",
            descriptor.file_path.display(),
            rule.name,
            rule.strategy.name()
        );

        if rule.warn {
            self.warn_once(descriptor);
        }

        let mut result = rule.strategy.transform(descriptor, descriptor.mode())?;
        result.rule = Some(rule.name.clone());

        if let (Some(code), None) = (&result.code, &result.ast) {
            let tree = parser::parse_permissive(&descriptor.file_path, code)?;
            if result.function_map.is_none() {
                result.function_map = Some(FunctionMap::generate(&tree));
            }
            result.ast = Some(tree);
        }

        Ok(result)
    }

    /// Module names warned about so far, sorted
    pub fn warned_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.warned.lock().iter().cloned().collect();
        names.sort();
        names
    }

    fn warn_once(&self, descriptor: &ModuleDescriptor) {
        let name = package_name(&descriptor.file_path)
            .unwrap_or_else(|| descriptor.file_path.display().to_string());

        if self.warned.lock().insert(name.clone()) {
            warn!(
                "Module '{}' is not known to ship precompiled code, running the full compiler on it",
                name
            );
        }
    }
}
