//! Function name location maps.
//!
//! Records which named function encloses every position of a module so stack
//! traces of transformed code can be symbolicated. `mappings` is a compact list
//! of base64 VLQ segments, each `column, name index[, line]`, relative to the
//! previous segment. The column restarts from zero whenever the line changes.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use swc_core::common::Span;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitWith};

use crate::parser::SyntaxTree;

const GLOBAL_NAME: &str = "<global>";
const ANONYMOUS_NAME: &str = "<anonymous>";
const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMap {
    pub names: Vec<String>,
    pub mappings: String,
}

/// A position where the enclosing function name changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    line: usize,
    column: usize,
    name: usize,
}

struct FunctionRange {
    name: String,
    start: (usize, usize),
    end: (usize, usize),
}

impl FunctionMap {
    pub fn generate(tree: &SyntaxTree) -> Self {
        let mut collector = FunctionCollector::default();
        tree.program.visit_with(&mut collector);

        let mut ranges: Vec<FunctionRange> = collector
            .functions
            .into_iter()
            .map(|(name, span)| FunctionRange {
                name,
                start: tree.locate(span.lo),
                end: tree.locate(span.hi),
            })
            .collect();
        ranges.sort_by_key(|range| range.start);

        let mut names = IndexSet::new();
        let mut mappings = Vec::new();
        let global = names.insert_full(GLOBAL_NAME.to_string()).0;
        push_mapping(&mut mappings, (1, 0), global);

        let mut stack: Vec<(usize, (usize, usize))> = Vec::new();
        for range in ranges {
            while let Some(&(_, end)) = stack.last() {
                if end > range.start {
                    break;
                }
                stack.pop();
                let enclosing = stack.last().map(|(name, _)| *name).unwrap_or(global);
                push_mapping(&mut mappings, end, enclosing);
            }

            let name = names.insert_full(range.name).0;
            push_mapping(&mut mappings, range.start, name);
            stack.push((name, range.end));
        }

        while let Some((_, end)) = stack.pop() {
            let enclosing = stack.last().map(|(name, _)| *name).unwrap_or(global);
            push_mapping(&mut mappings, end, enclosing);
        }

        Self {
            names: names.into_iter().collect(),
            mappings: encode_mappings(&mappings),
        }
    }
}

/// Later mappings at the same position replace earlier ones
fn push_mapping(mappings: &mut Vec<Mapping>, (line, column): (usize, usize), name: usize) {
    if let Some(last) = mappings.last_mut() {
        if last.line == line && last.column == column {
            last.name = name;
            return;
        }
    }
    mappings.push(Mapping { line, column, name });
}

fn encode_mappings(mappings: &[Mapping]) -> String {
    let mut out = String::new();
    let mut previous = Mapping { line: 1, column: 0, name: 0 };

    for (index, mapping) in mappings.iter().enumerate() {
        if index > 0 {
            out.push(',');
        }
        let line_delta = mapping.line as i64 - previous.line as i64;
        let column_base = if line_delta == 0 { previous.column } else { 0 };

        encode_vlq(&mut out, mapping.column as i64 - column_base as i64);
        encode_vlq(&mut out, mapping.name as i64 - previous.name as i64);
        if line_delta != 0 {
            encode_vlq(&mut out, line_delta);
        }
        previous = *mapping;
    }

    out
}

fn encode_vlq(out: &mut String, value: i64) {
    let mut vlq = if value < 0 { ((-value) << 1) | 1 } else { value << 1 };
    loop {
        let mut digit = (vlq & 0b11111) as usize;
        vlq >>= 5;
        if vlq > 0 {
            digit |= 0b100000;
        }
        out.push(BASE64[digit] as char);
        if vlq == 0 {
            break;
        }
    }
}

#[derive(Default)]
struct FunctionCollector {
    functions: Vec<(String, Span)>,
    pending_name: Option<String>,
    classes: Vec<String>,
}

impl FunctionCollector {
    fn take_name(&mut self, own: Option<&Ident>) -> String {
        let pending = self.pending_name.take();
        own.map(|ident| ident.sym.to_string())
            .or(pending)
            .unwrap_or_else(|| ANONYMOUS_NAME.to_string())
    }

    fn member_name(&self, key: &PropName, is_static: bool) -> String {
        let method = match key {
            PropName::Ident(ident) => ident.sym.to_string(),
            PropName::Num(num) => num.value.to_string(),
            _ => ANONYMOUS_NAME.to_string(),
        };
        match self.classes.last() {
            Some(class) if is_static => format!("{}.{}", class, method),
            Some(class) => format!("{}#{}", class, method),
            None => method,
        }
    }
}

fn is_function_like(expr: &Expr) -> bool {
    matches!(expr, Expr::Fn(_) | Expr::Arrow(_) | Expr::Class(_))
}

impl Visit for FunctionCollector {
    fn visit_var_declarator(&mut self, n: &VarDeclarator) {
        if let (Pat::Ident(binding), Some(init)) = (&n.name, &n.init) {
            if is_function_like(init) {
                self.pending_name = Some(binding.id.sym.to_string());
            }
        }
        n.visit_children_with(self);
    }

    fn visit_key_value_prop(&mut self, n: &KeyValueProp) {
        if let PropName::Ident(key) = &n.key {
            if is_function_like(&n.value) {
                self.pending_name = Some(key.sym.to_string());
            }
        }
        n.visit_children_with(self);
    }

    fn visit_fn_decl(&mut self, n: &FnDecl) {
        self.pending_name = None;
        self.functions.push((n.ident.sym.to_string(), n.function.span));
        n.visit_children_with(self);
    }

    fn visit_fn_expr(&mut self, n: &FnExpr) {
        let name = self.take_name(n.ident.as_ref());
        self.functions.push((name, n.function.span));
        n.visit_children_with(self);
    }

    fn visit_arrow_expr(&mut self, n: &ArrowExpr) {
        let name = self.take_name(None);
        self.functions.push((name, n.span));
        n.visit_children_with(self);
    }

    fn visit_class_decl(&mut self, n: &ClassDecl) {
        self.pending_name = None;
        self.classes.push(n.ident.sym.to_string());
        n.visit_children_with(self);
        self.classes.pop();
    }

    fn visit_class_expr(&mut self, n: &ClassExpr) {
        let name = self.take_name(n.ident.as_ref());
        self.classes.push(name);
        n.visit_children_with(self);
        self.classes.pop();
    }

    fn visit_class_method(&mut self, n: &ClassMethod) {
        let name = self.member_name(&n.key, n.is_static);
        self.functions.push((name, n.function.span));
        n.visit_children_with(self);
    }

    fn visit_constructor(&mut self, n: &Constructor) {
        let name = self.member_name(&n.key, false);
        self.functions.push((name, n.span));
        n.visit_children_with(self);
    }

    fn visit_method_prop(&mut self, n: &MethodProp) {
        let name = self.member_name(&n.key, false);
        self.functions.push((name, n.function.span));
        n.visit_children_with(self);
    }
}
