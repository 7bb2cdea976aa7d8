use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::transformer::BuildMode;
use crate::value::RuntimeCapabilities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    /// Code wrapped in a module factory
    #[serde(rename = "js/module")]
    Module,
    /// Code run as-is in global scope
    #[serde(rename = "js/script")]
    Script,
    /// Script produced by a serializer plugin
    #[serde(rename = "generated-script")]
    GeneratedScript,
}

impl OutputKind {
    pub fn is_script(&self) -> bool {
        !matches!(self, Self::Module)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleOutput {
    pub kind: OutputKind,
    pub code: String,
    pub line_count: usize,
    /// Raw mapping tuples; generated code carries none
    pub map: Vec<Vec<u32>>,
}

impl ModuleOutput {
    pub fn new(kind: OutputKind, code: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            kind,
            line_count: count_lines(&code),
            code,
            map: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub path: PathBuf,
    /// Specifier to resolved path
    pub dependencies: IndexMap<String, PathBuf>,
    pub output: Vec<ModuleOutput>,
}

impl Module {
    pub fn new(path: impl Into<PathBuf>, output: Vec<ModuleOutput>) -> Self {
        Self {
            path: path.into(),
            dependencies: IndexMap::new(),
            output,
        }
    }

    pub fn with_dependency(mut self, specifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.dependencies.insert(specifier.into(), path.into());
        self
    }

    /// Whether this module is `name`, either by full path or by file stem
    pub fn is_named(&self, name: &str) -> bool {
        self.path.as_os_str() == name
            || self.path.file_stem().is_some_and(|stem| stem == name)
    }
}

/// Linked modules of one bundle, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Graph {
    pub entry_points: Vec<PathBuf>,
    pub modules: IndexMap<PathBuf, Module>,
}

impl Graph {
    pub fn new(entry_points: Vec<PathBuf>) -> Self {
        Self {
            entry_points,
            modules: IndexMap::new(),
        }
    }

    pub fn add_module(&mut self, module: Module) {
        self.modules.insert(module.path.clone(), module);
    }

    /// Numeric id of a module: its position in the graph
    pub fn module_id(&self, path: &Path) -> Option<usize> {
        self.modules.get_index_of(path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializerOptions {
    pub mode: BuildMode,
    /// Append a call running each entry point
    pub run_module: bool,
    pub project_root: PathBuf,
    pub runtime: RuntimeCapabilities,
}

impl SerializerOptions {
    pub fn new(project_root: impl Into<PathBuf>, mode: BuildMode) -> Self {
        Self {
            mode,
            run_module: true,
            project_root: project_root.into(),
            runtime: RuntimeCapabilities::default(),
        }
    }
}

/// Line terminators plus one, so empty code still has a line
pub fn count_lines(code: &str) -> usize {
    let mut count = 1;
    let mut chars = code.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                count += 1;
            }
            '\n' | '\u{2028}' | '\u{2029}' => count += 1,
            _ => {}
        }
    }
    count
}
