use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::classifier::package_name;
use crate::compiler::{CompilerCache, CompilerWarning};
use crate::errors::Result;
use crate::function_map::FunctionMap;
use crate::parser::{self, SyntaxTree};
use crate::resyntax::{self, RewriteSet};

/// Development or production build, threaded through every transform call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildMode {
    Development,
    Production,
}

impl BuildMode {
    pub fn from_dev(dev: bool) -> Self {
        if dev { Self::Development } else { Self::Production }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Development)
    }

    /// Value of `process.env.NODE_ENV` for this mode
    pub fn node_env(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformOptions {
    pub dev: bool,
    pub platform: String,
    pub project_root: PathBuf,
}

impl TransformOptions {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            dev: true,
            platform: "ios".to_string(),
            project_root: project_root.into(),
        }
    }

    pub fn with_dev(mut self, dev: bool) -> Self {
        self.dev = dev;
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = platform.into();
        self
    }
}

/// One module handed over by the build driver
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub file_path: PathBuf,
    pub source: String,
    pub options: TransformOptions,
}

impl ModuleDescriptor {
    pub fn new(file_path: impl Into<PathBuf>, source: impl Into<String>, options: TransformOptions) -> Self {
        Self {
            file_path: file_path.into(),
            source: source.into(),
            options,
        }
    }

    pub fn mode(&self) -> BuildMode {
        BuildMode::from_dev(self.options.dev)
    }
}

/// Output of a transform.
///
/// `code: None` with `ast: None` means the module produced no output.
#[derive(Debug, Clone, Default)]
pub struct TransformResult {
    pub code: Option<String>,
    pub ast: Option<SyntaxTree>,
    pub function_map: Option<FunctionMap>,
    /// Name of the rule that handled the module
    pub rule: Option<String>,
    pub strategy: Option<&'static str>,
    pub warnings: Vec<CompilerWarning>,
}

/// Transform implementations, cheapest first
#[derive(Debug, Clone)]
pub enum Strategy {
    /// Source unchanged, still parsed for the tree and function map
    Passthrough,
    /// Narrow rewrites for known-safe framework runtime modules
    LightResyntax(RewriteSet),
    /// Per-package rewrite sets for named problem dependencies
    TargetedResyntax(IndexMap<String, RewriteSet>),
    /// The project's complete compile pipeline
    FullCompile(Arc<CompilerCache>),
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Passthrough => "passthrough",
            Self::LightResyntax(_) => "light-resyntax",
            Self::TargetedResyntax(_) => "targeted-resyntax",
            Self::FullCompile(_) => "full-compile",
        }
    }

    pub fn transform(&self, descriptor: &ModuleDescriptor, mode: BuildMode) -> Result<TransformResult> {
        let mut result = match self {
            Self::Passthrough => passthrough(descriptor)?,
            Self::LightResyntax(rewrites) => light_resyntax(descriptor, rewrites)?,
            Self::TargetedResyntax(modules) => targeted_resyntax(descriptor, modules)?,
            Self::FullCompile(compilers) => full_compile(descriptor, mode, compilers)?,
        };
        result.strategy = Some(self.name());
        Ok(result)
    }
}

fn passthrough(descriptor: &ModuleDescriptor) -> Result<TransformResult> {
    let path = descriptor.file_path.as_path();
    let tree = parser::parse(path, &descriptor.source, parser::syntax_for_path(path))?.tree;

    Ok(TransformResult {
        code: Some(descriptor.source.clone()),
        function_map: Some(FunctionMap::generate(&tree)),
        ast: Some(tree),
        ..Default::default()
    })
}

fn light_resyntax(descriptor: &ModuleDescriptor, rewrites: &RewriteSet) -> Result<TransformResult> {
    let code = resyntax::resyntax(&descriptor.file_path, &descriptor.source, rewrites)?;
    Ok(TransformResult {
        code: Some(code),
        ..Default::default()
    })
}

fn targeted_resyntax(
    descriptor: &ModuleDescriptor,
    modules: &IndexMap<String, RewriteSet>,
) -> Result<TransformResult> {
    let rewrites = rewrites_for(&descriptor.file_path, modules);
    debug!(
        "Targeted rewrites for {}: {:?}",
        descriptor.file_path.display(),
        rewrites.iter().collect::<Vec<_>>()
    );
    light_resyntax(descriptor, &rewrites)
}

fn rewrites_for(file_path: &Path, modules: &IndexMap<String, RewriteSet>) -> RewriteSet {
    package_name(file_path)
        .and_then(|name| modules.get(&name).cloned())
        .unwrap_or_default()
}

fn full_compile(
    descriptor: &ModuleDescriptor,
    mode: BuildMode,
    compilers: &CompilerCache,
) -> Result<TransformResult> {
    let compiler = compilers.get(&descriptor.options.project_root)?;

    let mut warnings = Vec::new();
    let output = compiler.compile(descriptor, mode, &mut |warning| {
        warn!("{}", warning);
        warnings.push(warning);
    })?;

    Ok(match output {
        Some(output) => TransformResult {
            code: Some(output.code),
            function_map: Some(FunctionMap::generate(&output.tree)),
            ast: Some(output.tree),
            warnings,
            ..Default::default()
        },
        None => TransformResult {
            warnings,
            ..Default::default()
        },
    })
}
