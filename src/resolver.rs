//! Vendor patch substitution at resolution time.
//!
//! Files under the patches directory shadow the file with the same relative
//! path inside an installed dependency, e.g. `patches/react-native/index.js`
//! replaces any resolved path ending in `react-native/index.js`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::{BentoError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Resolution {
    #[serde(rename_all = "camelCase")]
    SourceFile { file_path: PathBuf },
    #[serde(rename_all = "camelCase")]
    AssetFiles { file_paths: Vec<PathBuf> },
    Empty,
}

/// Where a request comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionContext {
    pub origin_module_path: PathBuf,
    pub project_root: PathBuf,
}

impl ResolutionContext {
    pub fn new(origin_module_path: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            origin_module_path: origin_module_path.into(),
            project_root: project_root.into(),
        }
    }
}

pub trait ModuleResolver: Send + Sync {
    fn resolve(
        &self,
        context: &ResolutionContext,
        module_name: &str,
        platform: Option<&str>,
    ) -> Result<Resolution>;
}

impl<F> ModuleResolver for F
where
    F: Fn(&ResolutionContext, &str, Option<&str>) -> Result<Resolution> + Send + Sync,
{
    fn resolve(
        &self,
        context: &ResolutionContext,
        module_name: &str,
        platform: Option<&str>,
    ) -> Result<Resolution> {
        self(context, module_name, platform)
    }
}

#[derive(Debug, Clone)]
pub struct ModuleReplacement {
    pub match_pattern: Regex,
    pub replacement_path: PathBuf,
}

impl ModuleReplacement {
    pub fn new(match_pattern: Regex, replacement_path: impl Into<PathBuf>) -> Self {
        Self {
            match_pattern,
            replacement_path: replacement_path.into(),
        }
    }

    /// Replacement for a patch file at `relative` inside the patches tree
    fn for_patch(relative: &Path, replacement_path: PathBuf) -> Result<Self> {
        let segments: Vec<String> = relative
            .components()
            .map(|component| regex::escape(&component.as_os_str().to_string_lossy()))
            .collect();
        let source = format!(r"(?:^|[/\\]){}$", segments.join(r"[/\\]"));
        let match_pattern = Regex::new(&source).map_err(|e| BentoError::invalid_pattern(source.clone(), e))?;

        Ok(Self::new(match_pattern, replacement_path))
    }
}

static PATCH_TABLES: Lazy<Mutex<HashMap<PathBuf, Arc<PatchTable>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Replacements in directory walk order
#[derive(Debug, Clone, Default)]
pub struct PatchTable {
    replacements: Vec<ModuleReplacement>,
}

impl PatchTable {
    pub fn new(replacements: Vec<ModuleReplacement>) -> Self {
        Self { replacements }
    }

    /// Walk a patches tree in lexical order. A missing directory yields an empty table.
    pub fn from_dir(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            debug!("No patches directory at {}", root.display());
            return Ok(Self::default());
        }

        let root = std::path::absolute(root)
            .map_err(|e| BentoError::file_system_error("Failed to resolve patches directory", root, e))?;

        let mut replacements = Vec::new();
        for entry in WalkDir::new(&root).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                BentoError::file_system_error("Failed to walk patches directory", &root, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            replacements.push(ModuleReplacement::for_patch(relative, entry.path().to_path_buf())?);
        }

        info!(
            "Loaded {} vendor patches from {}",
            replacements.len(),
            root.display()
        );
        Ok(Self::new(replacements))
    }

    /// Like [`PatchTable::from_dir`], walked at most once per directory for the process lifetime
    pub fn load_cached(root: &Path) -> Result<Arc<Self>> {
        let mut tables = PATCH_TABLES.lock();
        if let Some(table) = tables.get(root) {
            return Ok(table.clone());
        }

        let table = Arc::new(Self::from_dir(root)?);
        tables.insert(root.to_path_buf(), table.clone());
        Ok(table)
    }

    pub fn replacements(&self) -> &[ModuleReplacement] {
        &self.replacements
    }

    pub fn len(&self) -> usize {
        self.replacements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replacements.is_empty()
    }

    /// Every matching replacement overwrites the previous one, so the last match wins
    pub fn apply(&self, file_path: &Path) -> Option<PathBuf> {
        let path = file_path.to_string_lossy();
        self.replacements
            .iter()
            .filter(|replacement| replacement.match_pattern.is_match(&path))
            .last()
            .map(|replacement| replacement.replacement_path.clone())
    }
}

/// Resolver that delegates to `inner` and swaps in vendor patches
pub struct PatchResolver<R> {
    inner: R,
    table: Arc<PatchTable>,
}

impl<R: ModuleResolver> PatchResolver<R> {
    pub fn new(inner: R, table: Arc<PatchTable>) -> Self {
        Self { inner, table }
    }

    pub fn table(&self) -> &PatchTable {
        &self.table
    }
}

impl<R: ModuleResolver> ModuleResolver for PatchResolver<R> {
    fn resolve(
        &self,
        context: &ResolutionContext,
        module_name: &str,
        platform: Option<&str>,
    ) -> Result<Resolution> {
        let resolution = self.inner.resolve(context, module_name, platform)?;

        Ok(match resolution {
            Resolution::SourceFile { file_path } => match self.table.apply(&file_path) {
                Some(replacement) => {
                    debug!(
                        "Patched {} -> {}",
                        file_path.display(),
                        replacement.display()
                    );
                    Resolution::SourceFile {
                        file_path: replacement,
                    }
                }
                None => Resolution::SourceFile { file_path },
            },
            other => other,
        })
    }
}
