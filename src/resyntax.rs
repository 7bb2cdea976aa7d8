//! Fast syntax rewriting for dependency code.
//!
//! This is the cheap engine behind the light and targeted resyntax strategies:
//! one parse, a handful of narrow rewrites and a print. It never runs the
//! project's compile pipeline.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use swc_core::common::comments::SingleThreadedComments;
use swc_core::common::sync::Lrc;
use swc_core::common::{GLOBALS, Globals, Mark, SourceMap, SyntaxContext};
use swc_core::ecma::ast::*;
use swc_core::ecma::codegen::{Node, to_code_default};
use swc_core::ecma::transforms::base::resolver;
use swc_core::ecma::transforms::react::jsx;
use swc_core::ecma::transforms::typescript::strip;
use swc_core::ecma::visit::{VisitMut, VisitMutWith};
use tracing::debug;

use crate::errors::Result;
use crate::parser::{self, SyntaxTree};

/// A single narrow rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Rewrite {
    /// Lower JSX elements to calls
    Jsx,
    /// `import`/`export` to `require`/`exports`
    Imports,
    /// Strip type annotations from `.ts`/`.tsx` files
    Typescript,
    /// `import(x)` to a promise of `require(x)`
    DynamicImport,
}

/// Ordered, duplicate-free set of rewrites
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteSet {
    rewrites: BTreeSet<Rewrite>,
}

impl RewriteSet {
    pub fn new(rewrites: impl IntoIterator<Item = Rewrite>) -> Self {
        Self {
            rewrites: rewrites.into_iter().collect(),
        }
    }

    pub fn contains(&self, rewrite: Rewrite) -> bool {
        self.rewrites.contains(&rewrite)
    }

    pub fn iter(&self) -> impl Iterator<Item = Rewrite> + '_ {
        self.rewrites.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }
}

impl FromIterator<Rewrite> for RewriteSet {
    fn from_iter<T: IntoIterator<Item = Rewrite>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Rewrite a file and return the new source text
pub fn resyntax(path: &Path, source: &str, rewrites: &RewriteSet) -> Result<String> {
    let mut tree = parser::parse(path, source, parser::syntax_for_path(path))?.tree;

    if rewrites.contains(Rewrite::Jsx) {
        lower_jsx(&mut tree);
    }

    if rewrites.contains(Rewrite::Typescript) && parser::is_typescript_path(path) {
        strip_types(&mut tree.program);
    }

    if rewrites.contains(Rewrite::DynamicImport) {
        let count = rewrite_dynamic_imports(&mut tree.program)?;
        debug!("Rewrote {} dynamic imports in {}", count, path.display());
    }

    if rewrites.contains(Rewrite::Imports) {
        to_common_js(&tree)
    } else {
        Ok(tree.print())
    }
}

/// Lower JSX elements to React runtime calls
pub fn lower_jsx(tree: &mut SyntaxTree) {
    let source_map = tree.source_map.clone();
    let program = &mut tree.program;
    program.visit_mut_with(&mut ClearContexts);
    GLOBALS.set(&Globals::new(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        program.mutate(resolver(unresolved_mark, top_level_mark, true));
        program.mutate(jsx(
            source_map,
            None::<SingleThreadedComments>,
            Default::default(),
            top_level_mark,
            unresolved_mark,
        ));
    });
}

/// Remove TypeScript-only syntax in place
pub fn strip_types(program: &mut Program) {
    program.visit_mut_with(&mut ClearContexts);
    GLOBALS.set(&Globals::new(), || {
        let unresolved_mark = Mark::new();
        let top_level_mark = Mark::new();

        program.mutate(resolver(unresolved_mark, top_level_mark, true));
        program.mutate(strip(unresolved_mark, top_level_mark));
    });
}

const SPECIFIER_PLACEHOLDER: &str = "__bento_specifier__";

/// Replace every `import(x)` with `Promise.resolve().then(() => require(x))`
pub fn rewrite_dynamic_imports(program: &mut Program) -> Result<usize> {
    let template = parser::parse_expr(&format!(
        "Promise.resolve().then(() => require({}))",
        SPECIFIER_PLACEHOLDER
    ))?;

    let mut rewriter = DynamicImportRewriter { template, rewritten: 0 };
    program.visit_mut_with(&mut rewriter);
    Ok(rewriter.rewritten)
}

struct DynamicImportRewriter {
    template: Box<Expr>,
    rewritten: usize,
}

impl VisitMut for DynamicImportRewriter {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        expr.visit_mut_children_with(self);

        let specifier = match expr {
            Expr::Call(CallExpr {
                callee: Callee::Import(_),
                args,
                ..
            }) if args.len() == 1 && args[0].spread.is_none() => args[0].expr.clone(),
            _ => return,
        };

        let mut replacement = self.template.clone();
        replacement.visit_mut_with(&mut Substitute {
            specifier: Some(specifier),
        });
        *expr = *replacement;
        self.rewritten += 1;
    }
}

struct Substitute {
    specifier: Option<Box<Expr>>,
}

impl VisitMut for Substitute {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        if let Expr::Ident(ident) = expr {
            if ident.sym == SPECIFIER_PLACEHOLDER {
                if let Some(specifier) = self.specifier.take() {
                    *expr = *specifier;
                }
                return;
            }
        }
        expr.visit_mut_children_with(self);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Helper {
    ImportDefault,
    ImportStar,
    ExportStar,
}

impl Helper {
    fn source(&self) -> &'static str {
        match self {
            Self::ImportDefault => {
                "function __importDefault(mod) { return mod && mod.__esModule ? mod : { default: mod }; }"
            }
            Self::ImportStar => {
                "function __importStar(mod) { if (mod && mod.__esModule) return mod; var result = {}; if (mod != null) for (var key in mod) if (key !== \"default\" && Object.prototype.hasOwnProperty.call(mod, key)) result[key] = mod[key]; result.default = mod; return result; }"
            }
            Self::ExportStar => {
                "function __exportStar(mod, target) { Object.keys(mod).forEach(function (key) { if (key === \"default\" || key === \"__esModule\" || Object.prototype.hasOwnProperty.call(target, key)) return; Object.defineProperty(target, key, { enumerable: true, get: function () { return mod[key]; } }); }); }"
            }
        }
    }
}

/// Print an ES module as CommonJS.
///
/// Every `require` is hoisted above the module body in source order. Imported
/// names are read through their require binding at each use and exports are
/// getters, so bindings stay live across cycles and later mutation.
pub fn to_common_js(tree: &SyntaxTree) -> Result<String> {
    if !tree.is_module() {
        return Ok(tree.print());
    }

    let mut program = tree.program.clone();
    program.visit_mut_with(&mut ClearContexts);
    GLOBALS.set(&Globals::new(), || {
        program.mutate(resolver(Mark::new(), Mark::new(), true));
    });
    let Program::Module(mut module) = program else {
        return Ok(tree.print());
    };

    let mut emitter = CommonJsEmitter::new(tree.source_map.clone());
    for item in &module.body {
        if let ModuleItem::ModuleDecl(decl) = item {
            emitter.module_request(decl);
        }
    }

    let mut rewriter = ImportRewriter::new(&emitter.imports)?;
    module.visit_mut_with(&mut rewriter);

    for item in &module.body {
        match item {
            ModuleItem::Stmt(stmt) => emitter.push_node(stmt),
            ModuleItem::ModuleDecl(decl) => emitter.module_decl(decl),
        }
    }
    Ok(emitter.finish())
}

/// Reset hygiene contexts left behind by an earlier resolver run
struct ClearContexts;

impl VisitMut for ClearContexts {
    fn visit_mut_syntax_context(&mut self, ctxt: &mut SyntaxContext) {
        *ctxt = SyntaxContext::empty();
    }
}

/// Replaces references to imported bindings with reads through the require binding
struct ImportRewriter {
    values: HashMap<Id, Box<Expr>>,
    callees: HashMap<Id, Box<Expr>>,
}

impl ImportRewriter {
    fn new(imports: &HashMap<Id, String>) -> Result<Self> {
        let mut values = HashMap::new();
        let mut callees = HashMap::new();
        for (id, access) in imports {
            values.insert(id.clone(), parser::parse_expr(access)?);
            // `(0, ns.f)()` keeps `this` undefined like a call to the local binding
            let callee = if is_identifier(access) {
                access.clone()
            } else {
                format!("(0, {})", access)
            };
            callees.insert(id.clone(), parser::parse_expr(&callee)?);
        }
        Ok(Self { values, callees })
    }
}

impl VisitMut for ImportRewriter {
    fn visit_mut_expr(&mut self, expr: &mut Expr) {
        let Expr::Ident(ident) = &*expr else {
            expr.visit_mut_children_with(self);
            return;
        };
        if let Some(value) = self.values.get(&ident.to_id()).cloned() {
            *expr = *value;
        }
    }

    fn visit_mut_callee(&mut self, callee: &mut Callee) {
        let replacement = match &*callee {
            Callee::Expr(expr) => match &**expr {
                Expr::Ident(ident) => self.callees.get(&ident.to_id()).cloned(),
                _ => None,
            },
            _ => None,
        };

        match replacement {
            Some(replacement) => *callee = Callee::Expr(replacement),
            None => callee.visit_mut_children_with(self),
        }
    }

    fn visit_mut_prop(&mut self, prop: &mut Prop) {
        let Prop::Shorthand(ident) = &*prop else {
            prop.visit_mut_children_with(self);
            return;
        };
        if let Some(value) = self.values.get(&ident.to_id()).cloned() {
            let key = PropName::Ident(IdentName::from(ident.clone()));
            *prop = Prop::KeyValue(KeyValueProp { key, value });
        }
    }
}

struct CommonJsEmitter {
    source_map: Lrc<SourceMap>,
    helpers: BTreeSet<Helper>,
    /// Local name of every imported binding and the expression reading it
    imports: HashMap<Id, String>,
    getters: Vec<String>,
    requires: Vec<String>,
    body: Vec<String>,
    count: usize,
    has_exports: bool,
}

impl CommonJsEmitter {
    fn new(source_map: Lrc<SourceMap>) -> Self {
        Self {
            source_map,
            helpers: BTreeSet::new(),
            imports: HashMap::new(),
            getters: Vec::new(),
            requires: Vec::new(),
            body: Vec::new(),
            count: 0,
            has_exports: false,
        }
    }

    fn print(&self, node: &impl Node) -> String {
        to_code_default(self.source_map.clone(), None, node)
            .trim_end()
            .to_string()
    }

    fn push_node(&mut self, node: &impl Node) {
        let code = self.print(node);
        self.body.push(code);
    }

    fn print_expr(&self, expr: &Expr) -> String {
        let code = self.print(expr);
        if matches!(expr, Expr::Seq(_)) {
            format!("({})", code)
        } else {
            code
        }
    }

    fn require(&mut self, src: &Str) -> Dependency {
        self.count += 1;
        let binding = format!("_req{}", self.count);
        self.requires.push(format!(
            "var {} = require({});",
            binding,
            quote(&src.value.to_string())
        ));
        Dependency {
            binding,
            default: None,
            star: None,
        }
    }

    fn default_of(&mut self, dependency: &mut Dependency) -> String {
        let name = match &dependency.default {
            Some(name) => name.clone(),
            None => {
                self.helpers.insert(Helper::ImportDefault);
                let name = format!("{}_default", dependency.binding);
                self.requires
                    .push(format!("var {} = __importDefault({});", name, dependency.binding));
                dependency.default = Some(name.clone());
                name
            }
        };
        format!("{}.default", name)
    }

    fn star_of(&mut self, dependency: &mut Dependency) -> String {
        match &dependency.star {
            Some(name) => name.clone(),
            None => {
                self.helpers.insert(Helper::ImportStar);
                let name = format!("{}_star", dependency.binding);
                self.requires
                    .push(format!("var {} = __importStar({});", name, dependency.binding));
                dependency.star = Some(name.clone());
                name
            }
        }
    }

    fn named_of(&mut self, dependency: &mut Dependency, name: &str) -> String {
        if name == "default" {
            self.default_of(dependency)
        } else {
            member(&dependency.binding, name)
        }
    }

    fn export_getter(&mut self, name: &str, value: &str) {
        self.has_exports = true;
        self.getters.push(format!(
            "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {}; }} }});",
            quote(name),
            value
        ));
    }

    fn export_value(&mut self, name: &str, value: &str) {
        self.has_exports = true;
        self.body.push(format!("{} = {};", member("exports", name), value));
    }

    /// Local binding or, for a re-exported import, the expression reading it.
    /// Export lists only name top-level bindings, so the symbol alone is enough.
    fn local_value(&self, name: &ModuleExportName) -> String {
        let name = export_name(name);
        self.imports
            .iter()
            .find(|(id, _)| &*id.0 == name.as_str())
            .map(|(_, access)| access.clone())
            .unwrap_or(name)
    }

    fn import(&mut self, import: &ImportDecl) {
        if import.type_only {
            return;
        }
        if import.specifiers.is_empty() {
            self.requires
                .push(format!("require({});", quote(&import.src.value.to_string())));
            return;
        }

        let mut dependency = self.require(&import.src);
        for specifier in &import.specifiers {
            let (local, access) = match specifier {
                ImportSpecifier::Default(default) => (&default.local, self.default_of(&mut dependency)),
                ImportSpecifier::Namespace(namespace) => (&namespace.local, self.star_of(&mut dependency)),
                ImportSpecifier::Named(named) => {
                    if named.is_type_only {
                        continue;
                    }
                    let imported = named
                        .imported
                        .as_ref()
                        .map(export_name)
                        .unwrap_or_else(|| named.local.sym.to_string());
                    (&named.local, self.named_of(&mut dependency, &imported))
                }
            };
            self.imports.insert(local.to_id(), access);
        }
    }

    /// Declarations that load another module, in source order
    fn module_request(&mut self, decl: &ModuleDecl) {
        match decl {
            ModuleDecl::Import(import) => self.import(import),
            ModuleDecl::ExportNamed(NamedExport {
                src: Some(src),
                type_only: false,
                specifiers,
                ..
            }) => self.re_export(src, specifiers),
            ModuleDecl::ExportAll(all) if !all.type_only => {
                self.has_exports = true;
                self.helpers.insert(Helper::ExportStar);
                self.requires.push(format!(
                    "__exportStar(require({}), exports);",
                    quote(&all.src.value.to_string())
                ));
            }
            _ => {}
        }
    }

    fn module_decl(&mut self, decl: &ModuleDecl) {
        match decl {
            // hoisted by `module_request`
            ModuleDecl::Import(_) | ModuleDecl::ExportAll(_) => {}
            ModuleDecl::ExportNamed(named) if named.src.is_some() => {}
            ModuleDecl::ExportDecl(export) => {
                self.push_node(&Stmt::Decl(export.decl.clone()));
                for name in declared_names(&export.decl) {
                    self.export_getter(&name, &name);
                }
            }
            ModuleDecl::ExportNamed(named) => self.export_named(named),
            ModuleDecl::ExportDefaultExpr(export) => {
                let value = self.print_expr(&export.expr);
                self.export_value("default", &value);
            }
            ModuleDecl::ExportDefaultDecl(export) => self.export_default_decl(&export.decl),
            other => self.push_node(&ModuleItem::ModuleDecl(other.clone())),
        }
    }

    fn export_named(&mut self, named: &NamedExport) {
        if named.type_only {
            return;
        }

        for specifier in &named.specifiers {
            if let ExportSpecifier::Named(spec) = specifier {
                if spec.is_type_only {
                    continue;
                }
                let exported = spec
                    .exported
                    .as_ref()
                    .map(export_name)
                    .unwrap_or_else(|| export_name(&spec.orig));
                let value = self.local_value(&spec.orig);
                self.export_getter(&exported, &value);
            }
        }
    }

    fn re_export(&mut self, src: &Str, specifiers: &[ExportSpecifier]) {
        let mut dependency = self.require(src);
        for specifier in specifiers {
            let (exported, value) = match specifier {
                ExportSpecifier::Named(spec) => {
                    if spec.is_type_only {
                        continue;
                    }
                    let orig = export_name(&spec.orig);
                    let exported = spec.exported.as_ref().map(export_name).unwrap_or_else(|| orig.clone());
                    (exported, self.named_of(&mut dependency, &orig))
                }
                ExportSpecifier::Namespace(spec) => (export_name(&spec.name), self.star_of(&mut dependency)),
                ExportSpecifier::Default(spec) => (spec.exported.sym.to_string(), self.default_of(&mut dependency)),
            };
            self.export_getter(&exported, &value);
        }
    }

    fn export_default_decl(&mut self, decl: &DefaultDecl) {
        match decl {
            DefaultDecl::Fn(FnExpr {
                ident: Some(ident),
                function,
            }) => {
                self.push_node(&Stmt::Decl(Decl::Fn(FnDecl {
                    ident: ident.clone(),
                    declare: false,
                    function: function.clone(),
                })));
                self.export_getter("default", &ident.sym);
            }
            DefaultDecl::Class(ClassExpr {
                ident: Some(ident),
                class,
            }) => {
                self.push_node(&Stmt::Decl(Decl::Class(ClassDecl {
                    ident: ident.clone(),
                    declare: false,
                    class: class.clone(),
                })));
                self.export_getter("default", &ident.sym);
            }
            DefaultDecl::Fn(function) => {
                let value = self.print_expr(&Expr::Fn(function.clone()));
                self.export_value("default", &value);
            }
            DefaultDecl::Class(class) => {
                let value = self.print_expr(&Expr::Class(class.clone()));
                self.export_value("default", &value);
            }
            DefaultDecl::TsInterfaceDecl(_) => {}
        }
    }

    fn finish(self) -> String {
        let mut out: Vec<String> = self
            .helpers
            .iter()
            .map(|helper| helper.source().to_string())
            .collect();
        if self.has_exports {
            out.push("Object.defineProperty(exports, \"__esModule\", { value: true });".to_string());
        }
        out.extend(self.getters);
        out.extend(self.requires);
        out.extend(self.body);

        let mut code = out.join("\n");
        code.push('\n');
        code
    }
}

/// Require binding of one import or re-export declaration and its interop wrappers
struct Dependency {
    binding: String,
    default: Option<String>,
    star: Option<String>,
}

fn declared_names(decl: &Decl) -> Vec<String> {
    let mut names = Vec::new();
    match decl {
        Decl::Fn(function) => names.push(function.ident.sym.to_string()),
        Decl::Class(class) => names.push(class.ident.sym.to_string()),
        Decl::Var(var) => {
            for declarator in &var.decls {
                pattern_names(&declarator.name, &mut names);
            }
        }
        _ => {}
    }
    names
}

fn pattern_names(pat: &Pat, names: &mut Vec<String>) {
    match pat {
        Pat::Ident(binding) => names.push(binding.id.sym.to_string()),
        Pat::Array(array) => {
            for element in array.elems.iter().flatten() {
                pattern_names(element, names);
            }
        }
        Pat::Object(object) => {
            for prop in &object.props {
                match prop {
                    ObjectPatProp::KeyValue(kv) => pattern_names(&kv.value, names),
                    ObjectPatProp::Assign(assign) => names.push(assign.key.sym.to_string()),
                    ObjectPatProp::Rest(rest) => pattern_names(&rest.arg, names),
                }
            }
        }
        Pat::Assign(assign) => pattern_names(&assign.left, names),
        Pat::Rest(rest) => pattern_names(&rest.arg, names),
        _ => {}
    }
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::Ident(ident) => ident.sym.to_string(),
        ModuleExportName::Str(s) => s.value.to_string(),
    }
}

/// JSON string literals are valid JavaScript string literals
pub(crate) fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

fn member(object: &str, property: &str) -> String {
    if is_identifier(property) {
        format!("{}.{}", object, property)
    } else {
        format!("{}[{}]", object, quote(property))
    }
}
