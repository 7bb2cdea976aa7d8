//! Origin classification for module paths.
//!
//! A [`Classifier`] tags every path with a [`ModuleKind`] using ordered sets of
//! [`ModuleMatcher`]s. Matchers look for a folder (usually `node_modules`) at a
//! path-segment boundary and then test the remainder against a set of module ids.

use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::{ClassifierConfig, MatcherConfig};
use crate::errors::{BentoError, Result};

/// Closed set of module origins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModuleKind {
    /// First-party application code
    App,
    /// Framework runtime packages known to need only light rewriting
    Framework,
    /// Any other installed dependency
    Package,
}

impl ModuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "app",
            Self::Framework => "framework",
            Self::Package => "package",
        }
    }

    pub fn is_dependency(&self) -> bool {
        !matches!(self, Self::App)
    }
}

impl std::fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matches paths of the form `<folder>/<module id>[/...]`
#[derive(Debug, Clone)]
pub struct ModuleMatcher {
    folders: Vec<String>,
    ids: Option<Regex>,
}

impl ModuleMatcher {
    /// Build a matcher. `module_ids` are literal names and get escaped,
    /// `module_patterns` are regex fragments used as-is.
    pub fn new<F, I, P>(folders: F, module_ids: I, module_patterns: P) -> Result<Self>
    where
        F: IntoIterator,
        F::Item: Into<String>,
        I: IntoIterator,
        I::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let folders = folders
            .into_iter()
            .map(Into::into)
            .map(|folder: String| folder.trim_end_matches(is_separator).to_string())
            .filter(|folder| !folder.is_empty())
            .collect();

        let mut alternatives: Vec<String> = module_ids
            .into_iter()
            .map(|id| regex::escape(id.as_ref()))
            .collect();

        for pattern in module_patterns {
            let pattern = pattern.as_ref();
            // Validate each fragment on its own so the error names the culprit
            Regex::new(pattern).map_err(|e| BentoError::invalid_pattern(pattern, e))?;
            alternatives.push(format!("(?:{})", pattern));
        }

        let ids = if alternatives.is_empty() {
            None
        } else {
            let source = format!(r"^(?:{})(?:[/\\]|$)", alternatives.join("|"));
            Some(Regex::new(&source).map_err(|e| BentoError::invalid_pattern(source.clone(), e))?)
        };

        Ok(Self { folders, ids })
    }

    pub fn from_config(config: &MatcherConfig) -> Result<Self> {
        Self::new(
            config.folders.iter().cloned(),
            &config.module_ids,
            &config.module_patterns,
        )
    }

    pub fn matches(&self, path: &str) -> bool {
        if self.folders.is_empty() {
            return self.matches_id(path);
        }

        self.folders.iter().any(|folder| {
            segment_starts(path).any(|start| {
                path[start..]
                    .strip_prefix(folder.as_str())
                    .and_then(|rest| rest.strip_prefix(is_separator))
                    .is_some_and(|remainder| self.matches_id(remainder))
            })
        })
    }

    fn matches_id(&self, remainder: &str) -> bool {
        match &self.ids {
            Some(ids) => ids.is_match(remainder),
            None => true,
        }
    }
}

/// A group of matchers combined with logical OR
#[derive(Debug, Clone, Default)]
pub struct MatcherSet {
    matchers: Vec<ModuleMatcher>,
}

impl MatcherSet {
    pub fn new(matchers: Vec<ModuleMatcher>) -> Self {
        Self { matchers }
    }

    pub fn from_configs(configs: &[MatcherConfig]) -> Result<Self> {
        configs
            .iter()
            .map(ModuleMatcher::from_config)
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    pub fn matches(&self, path: &str) -> bool {
        self.matchers.iter().any(|matcher| matcher.matches(path))
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

/// Tags module paths with their origin
#[derive(Debug, Clone)]
pub struct Classifier {
    kinds: Vec<(ModuleKind, MatcherSet)>,
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Result<Self> {
        Ok(Self {
            kinds: vec![
                (ModuleKind::Framework, MatcherSet::from_configs(&config.framework)?),
                (ModuleKind::Package, MatcherSet::from_configs(&config.packages)?),
            ],
        })
    }

    /// First matching kind wins, anything unmatched is application code
    pub fn classify(&self, file_path: &Path) -> ModuleKind {
        let path = file_path.to_string_lossy();
        self.kinds
            .iter()
            .find(|(_, matchers)| matchers.matches(&path))
            .map(|(kind, _)| *kind)
            .unwrap_or(ModuleKind::App)
    }
}

/// Installed package name for a path inside `node_modules`, scoped names included
pub fn package_name(file_path: &Path) -> Option<String> {
    let path = file_path.to_string_lossy();
    let segments: Vec<&str> = path.split(is_separator).collect();
    let position = segments.iter().rposition(|segment| *segment == "node_modules")?;
    let name = segments.get(position + 1).filter(|name| !name.is_empty())?;

    if name.starts_with('@') {
        let scoped = segments.get(position + 2).filter(|name| !name.is_empty())?;
        Some(format!("{}/{}", name, scoped))
    } else {
        Some((*name).to_string())
    }
}

fn is_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

fn segment_starts(path: &str) -> impl Iterator<Item = usize> + '_ {
    std::iter::once(0).chain(
        path.char_indices()
            .filter(|(_, c)| is_separator(*c))
            .map(|(index, _)| index + 1),
    )
}
