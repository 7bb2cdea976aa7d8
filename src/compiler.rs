//! The full compile pipeline used for first-party code.
//!
//! A [`ProjectCompiler`] is loaded once per project root and reused for the rest
//! of the process through [`CompilerCache`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use swc_core::ecma::ast::{Expr, MemberExpr, MemberProp};
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tracing::{debug, info};

use crate::config::{CONFIG_FILE_NAME, CompileConfig, Config};
use crate::errors::{BentoError, CodeLocation, Result};
use crate::parser::{self, SyntaxTree};
use crate::resyntax;
use crate::transformer::{BuildMode, ModuleDescriptor};

/// Ordered steps of the compile pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CompilePlugin {
    /// Lower JSX to React runtime calls
    Jsx,
    /// Strip TypeScript syntax
    Typescript,
    /// Inline `__DEV__` and `process.env.NODE_ENV`
    InlineDev,
    /// Turn `import(x)` into a promise of `require(x)`
    DynamicImport,
    /// ES modules to CommonJS
    Imports,
}

/// User-facing diagnostic reported by the compiler without failing the module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerWarning {
    pub file: PathBuf,
    pub message: String,
    pub location: Option<CodeLocation>,
}

impl std::fmt::Display for CompilerWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{}: {}", location, self.message),
            None => write!(f, "{}: {}", self.file.display(), self.message),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub code: String,
    pub tree: SyntaxTree,
}

pub trait ProjectCompiler: Send + Sync {
    /// Compile one module. `Ok(None)` means the compiler has no output for the file.
    fn compile(
        &self,
        descriptor: &ModuleDescriptor,
        mode: BuildMode,
        on_warning: &mut dyn FnMut(CompilerWarning),
    ) -> Result<Option<CompileOutput>>;
}

/// swc-backed compiler running the configured plugin list
#[derive(Debug, Clone)]
pub struct SwcCompiler {
    plugins: Vec<CompilePlugin>,
    ignore: Vec<Regex>,
}

impl SwcCompiler {
    pub fn new(config: &CompileConfig) -> Result<Self> {
        let ignore = config
            .ignore
            .iter()
            .map(|pattern| Regex::new(pattern).map_err(|e| BentoError::invalid_pattern(pattern, e)))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            plugins: config.plugins.clone(),
            ignore,
        })
    }

    pub fn plugins(&self) -> &[CompilePlugin] {
        &self.plugins
    }

    fn is_ignored(&self, file_path: &Path) -> bool {
        let path = file_path.to_string_lossy();
        self.ignore.iter().any(|pattern| pattern.is_match(&path))
    }
}

impl ProjectCompiler for SwcCompiler {
    fn compile(
        &self,
        descriptor: &ModuleDescriptor,
        mode: BuildMode,
        on_warning: &mut dyn FnMut(CompilerWarning),
    ) -> Result<Option<CompileOutput>> {
        let path = descriptor.file_path.as_path();
        if self.is_ignored(path) {
            debug!("Compiler ignores {}", path.display());
            return Ok(None);
        }

        let syntax = parser::syntax_for_path(path);
        let parsed = parser::parse(path, &descriptor.source, syntax).map_err(into_compile_failure)?;
        for diagnostic in parsed.recovered {
            on_warning(CompilerWarning {
                file: path.to_path_buf(),
                message: diagnostic.message,
                location: Some(
                    CodeLocation::new(path)
                        .with_line(diagnostic.line)
                        .with_column(diagnostic.column),
                ),
            });
        }

        let mut tree = parsed.tree;
        for plugin in &self.plugins {
            match plugin {
                CompilePlugin::Jsx => resyntax::lower_jsx(&mut tree),
                CompilePlugin::Typescript => {
                    if parser::is_typescript_path(path) {
                        resyntax::strip_types(&mut tree.program);
                    }
                }
                CompilePlugin::InlineDev => {
                    let mut inliner = DevInliner::new(mode)?;
                    tree.program.visit_mut_with(&mut inliner);
                }
                CompilePlugin::DynamicImport => {
                    resyntax::rewrite_dynamic_imports(&mut tree.program)?;
                }
                CompilePlugin::Imports => {
                    if tree.is_module() {
                        let code = resyntax::to_common_js(&tree)?;
                        tree = parser::parse(path, &code, syntax)
                            .map_err(into_compile_failure)?
                            .tree;
                    }
                }
            }
        }

        Ok(Some(CompileOutput {
            code: tree.print(),
            tree,
        }))
    }
}

fn into_compile_failure(err: BentoError) -> BentoError {
    match err {
        BentoError::ParseError {
            file,
            message,
            location,
        } => BentoError::compile_failure(file, message, location),
        other => other,
    }
}

struct DevInliner {
    dev: Box<Expr>,
    node_env: Box<Expr>,
}

impl DevInliner {
    fn new(mode: BuildMode) -> Result<Self> {
        Ok(Self {
            dev: parser::parse_expr(if mode.is_dev() { "true" } else { "false" })?,
            node_env: parser::parse_expr(&resyntax::quote(mode.node_env()))?,
        })
    }
}

fn is_node_env(member: &MemberExpr) -> bool {
    let MemberProp::Ident(prop) = &member.prop else {
        return false;
    };
    let Expr::Member(inner) = &*member.obj else {
        return false;
    };
    let (Expr::Ident(object), MemberProp::Ident(env)) = (&*inner.obj, &inner.prop) else {
        return false;
    };
    prop.sym == "NODE_ENV" && env.sym == "env" && object.sym == "process"
}

impl VisitMut for DevInliner {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        let inlined = match &*expr {
            Expr::Ident(ident) if ident.sym == "__DEV__" => Some(self.dev.clone()),
            Expr::Member(member) if is_node_env(member) => Some(self.node_env.clone()),
            _ => None,
        };

        match inlined {
            Some(value) => *expr = *value,
            None => expr.visit_mut_children_with(self),
        }
    }
}

type CompilerLoader = dyn Fn(&Path) -> Result<Arc<dyn ProjectCompiler>> + Send + Sync;

/// One compiler per project root, loaded lazily and kept for the process lifetime
pub struct CompilerCache {
    loader: Box<CompilerLoader>,
    compilers: Mutex<HashMap<PathBuf, Arc<dyn ProjectCompiler>>>,
}

impl CompilerCache {
    pub fn new<F>(loader: F) -> Self
    where
        F: Fn(&Path) -> Result<Arc<dyn ProjectCompiler>> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            compilers: Mutex::new(HashMap::new()),
        }
    }

    /// Use the project's own `bento.toml` compile section when it has one
    pub fn from_config(fallback: CompileConfig) -> Self {
        Self::new(move |project_root| {
            let config_path = project_root.join(CONFIG_FILE_NAME);
            let compile = if config_path.is_file() {
                let content = std::fs::read_to_string(&config_path).map_err(|e| {
                    BentoError::file_system_error("Failed to read project config", &config_path, e)
                })?;
                Config::parse(&content)?.compile
            } else {
                fallback.clone()
            };

            let compiler: Arc<dyn ProjectCompiler> = Arc::new(SwcCompiler::new(&compile)?);
            Ok(compiler)
        })
    }

    pub fn get(&self, project_root: &Path) -> Result<Arc<dyn ProjectCompiler>> {
        let mut compilers = self.compilers.lock();
        if let Some(compiler) = compilers.get(project_root) {
            return Ok(compiler.clone());
        }

        info!("Loading compiler for project {}", project_root.display());
        let compiler = (self.loader)(project_root)?;
        compilers.insert(project_root.to_path_buf(), compiler.clone());
        Ok(compiler)
    }

    pub fn len(&self) -> usize {
        self.compilers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CompilerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerCache")
            .field("projects", &self.len())
            .finish()
    }
}
