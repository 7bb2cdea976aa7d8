//! Parse and print capability backed by swc.
//!
//! Everything else in the crate treats syntax trees as opaque values produced
//! and consumed here.

use std::path::Path;

use swc_core::common::sync::Lrc;
use swc_core::common::{BytePos, DUMMY_SP, FileName, SourceMap, Span, Spanned};
use swc_core::ecma::ast::{EsVersion, Expr, Program};
use swc_core::ecma::codegen::to_code_default;
use swc_core::ecma::parser::{EsSyntax, Parser, StringInput, Syntax, TsSyntax, error::Error, lexer::Lexer};
use swc_core::ecma::visit::{VisitMut, VisitMutWith};

use crate::errors::{BentoError, CodeLocation, Result};

/// A parsed program together with the source map its spans point into
#[derive(Clone)]
pub struct SyntaxTree {
    pub program: Program,
    pub source_map: Lrc<SourceMap>,
}

/// Recoverable syntax problem reported next to a successful parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// Output of [`parse`]
#[derive(Debug)]
pub struct Parsed {
    pub tree: SyntaxTree,
    pub recovered: Vec<Diagnostic>,
}

impl SyntaxTree {
    /// Print the program back to source text
    pub fn print(&self) -> String {
        to_code_default(self.source_map.clone(), None, &self.program)
    }

    /// 1-based line, 0-based column of a position
    pub fn locate(&self, pos: BytePos) -> (usize, usize) {
        let loc = self.source_map.lookup_char_pos(pos);
        (loc.line, loc.col.0)
    }

    pub fn is_module(&self) -> bool {
        matches!(self.program, Program::Module(_))
    }
}

impl std::fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_module() { "module" } else { "script" };
        f.debug_struct("SyntaxTree").field("program", &kind).finish()
    }
}

/// Syntax picked from the file extension
pub fn syntax_for_path(path: &Path) -> Syntax {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match extension.as_deref() {
        Some("ts") | Some("mts") | Some("cts") => Syntax::Typescript(TsSyntax {
            tsx: false,
            decorators: true,
            ..Default::default()
        }),
        Some("tsx") => Syntax::Typescript(TsSyntax {
            tsx: true,
            decorators: true,
            ..Default::default()
        }),
        _ => permissive_syntax(),
    }
}

/// Dialect-neutral JavaScript syntax with the common extensions turned on
pub fn permissive_syntax() -> Syntax {
    Syntax::Es(EsSyntax {
        jsx: true,
        decorators: true,
        export_default_from: true,
        allow_super_outside_method: true,
        allow_return_outside_function: true,
        ..Default::default()
    })
}

pub fn is_typescript_path(path: &Path) -> bool {
    matches!(syntax_for_path(path), Syntax::Typescript(_))
}

/// Parse a whole file
pub fn parse(path: &Path, source: &str, syntax: Syntax) -> Result<Parsed> {
    let source_map: Lrc<SourceMap> = Default::default();
    let file = source_map.new_source_file(FileName::Real(path.to_path_buf()).into(), source.to_string());

    let lexer = Lexer::new(syntax, EsVersion::EsNext, StringInput::from(&*file), None);
    let mut parser = Parser::new_from(lexer);

    let program = parser
        .parse_program()
        .map_err(|err| syntax_error(&source_map, path, &err))?;

    let recovered = parser
        .take_errors()
        .iter()
        .map(|err| diagnostic(&source_map, err))
        .collect();

    Ok(Parsed {
        tree: SyntaxTree { program, source_map },
        recovered,
    })
}

/// Parse generated code with the permissive dialect, ignoring recoverable errors
pub fn parse_permissive(path: &Path, source: &str) -> Result<SyntaxTree> {
    parse(path, source, permissive_syntax()).map(|parsed| parsed.tree)
}

/// Parse a single expression, stripped of spans so it can be grafted into another tree
pub fn parse_expr(code: &str) -> Result<Box<Expr>> {
    let source_map: Lrc<SourceMap> = Default::default();
    let file = source_map.new_source_file(FileName::Anon.into(), code.to_string());

    let lexer = Lexer::new(permissive_syntax(), EsVersion::EsNext, StringInput::from(&*file), None);
    let mut parser = Parser::new_from(lexer);

    let mut expr = parser
        .parse_expr()
        .map_err(|err| syntax_error(&source_map, Path::new("<expression>"), &err))?;
    expr.visit_mut_with(&mut DropSpans);
    Ok(expr)
}

fn diagnostic(source_map: &SourceMap, err: &Error) -> Diagnostic {
    let loc = source_map.lookup_char_pos(err.span().lo);
    Diagnostic {
        message: err.kind().msg().to_string(),
        line: loc.line,
        column: loc.col.0,
    }
}

fn syntax_error(source_map: &SourceMap, path: &Path, err: &Error) -> BentoError {
    let found = diagnostic(source_map, err);
    BentoError::ParseError {
        file: path.to_path_buf(),
        message: found.message,
        location: Some(
            CodeLocation::new(path)
                .with_line(found.line)
                .with_column(found.column),
        ),
    }
}

struct DropSpans;

impl VisitMut for DropSpans {
    fn visit_mut_span(&mut self, span: &mut Span) {
        *span = DUMMY_SP;
    }
}
