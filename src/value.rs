//! Runtime values to JavaScript source text.
//!
//! Only the kinds [`DefineValue`] can hold are serializable, so there is no
//! fallback coercion for unsupported values.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::errors::{BentoError, Result};
use crate::resyntax::quote;

#[derive(Debug, Clone, PartialEq)]
pub enum DefineValue {
    Null,
    Undefined,
    Bool(bool),
    /// Negative zero, NaN and the infinities included
    Number(f64),
    /// Decimal digits, optionally with a leading `-`
    BigInt(String),
    String(String),
    Regex { pattern: String, flags: String },
    /// Function source, emitted as a parenthesized expression
    Function(String),
    /// Raw expression text
    Code(String),
    Array(Vec<DefineValue>),
    Object(IndexMap<String, DefineValue>),
}

/// Features of the JavaScript engine the bundle runs on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeCapabilities {
    /// Native `123n` literal syntax
    pub bigint_literal: bool,
}

/// How the top-level text of [`stringify_obj`] is protected against
/// automatic semicolon insertion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AsiSafety {
    /// No wrapping
    Unwrapped,
    /// Parenthesize objects
    Safe,
    /// Leading `;`, objects also parenthesized
    Unsafe,
    /// `/*#__PURE__*/Object(...)`, an expression in any statement position
    #[default]
    Unknown,
}

/// `Number.MAX_SAFE_INTEGER`
const MAX_SAFE_INTEGER: u64 = (1 << 53) - 1;

const SPECIAL_KEYS: &[&str] = &[
    "$regex", "$flags", "$bigint", "$function", "$code", "$undefined", "$null", "$number",
];

impl DefineValue {
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Convert a TOML value from the `[define]` table.
    ///
    /// Single-purpose tables such as `{ "$bigint" = "1" }` spell values TOML
    /// cannot express directly.
    pub fn from_toml(key: &str, value: &toml::Value) -> Result<Self> {
        Ok(match value {
            toml::Value::String(s) => Self::String(s.clone()),
            toml::Value::Integer(i) if i.unsigned_abs() > MAX_SAFE_INTEGER => {
                return Err(BentoError::invalid_define(
                    key,
                    format!("{} is not exactly representable, use {{ \"$bigint\" = \"{}\" }}", i, i),
                ));
            }
            toml::Value::Integer(i) => Self::Number(*i as f64),
            toml::Value::Float(f) => Self::Number(*f),
            toml::Value::Boolean(b) => Self::Bool(*b),
            toml::Value::Datetime(dt) => Self::String(dt.to_string()),
            toml::Value::Array(items) => Self::Array(
                items
                    .iter()
                    .map(|item| Self::from_toml(key, item))
                    .collect::<Result<Vec<_>>>()?,
            ),
            toml::Value::Table(table) => {
                if table.keys().any(|k| SPECIAL_KEYS.contains(&k.as_str())) {
                    Self::from_special_table(key, table)?
                } else {
                    Self::Object(
                        table
                            .iter()
                            .map(|(k, v)| -> Result<(String, Self)> { Ok((k.clone(), Self::from_toml(key, v)?)) })
                            .collect::<Result<IndexMap<_, _>>>()?,
                    )
                }
            }
        })
    }

    fn from_special_table(key: &str, table: &toml::map::Map<String, toml::Value>) -> Result<Self> {
        let text = |name: &str| -> Result<Option<String>> {
            match table.get(name) {
                None => Ok(None),
                Some(toml::Value::String(s)) => Ok(Some(s.clone())),
                Some(toml::Value::Integer(i)) if name == "$bigint" => Ok(Some(i.to_string())),
                Some(_) => Err(BentoError::invalid_define(key, format!("'{}' must be a string", name))),
            }
        };

        if let Some(pattern) = text("$regex")? {
            let flags = text("$flags")?.unwrap_or_default();
            if let Some(flag) = flags.chars().find(|c| !"dgimsuvy".contains(*c)) {
                return Err(BentoError::invalid_define(key, format!("unknown regex flag '{}'", flag)));
            }
            return Ok(Self::Regex { pattern, flags });
        }
        if let Some(digits) = text("$bigint")? {
            let body = digits.strip_prefix('-').unwrap_or(&digits);
            if body.is_empty() || !body.chars().all(|c| c.is_ascii_digit()) {
                return Err(BentoError::invalid_define(key, format!("'{}' is not an integer", digits)));
            }
            return Ok(Self::BigInt(digits));
        }
        if let Some(source) = text("$function")? {
            return Ok(Self::Function(source));
        }
        if let Some(source) = text("$code")? {
            return Ok(Self::Code(source));
        }
        if let Some(number) = text("$number")? {
            return match number.as_str() {
                "-0" => Ok(Self::Number(-0.0)),
                "NaN" => Ok(Self::Number(f64::NAN)),
                "Infinity" => Ok(Self::Number(f64::INFINITY)),
                "-Infinity" => Ok(Self::Number(f64::NEG_INFINITY)),
                other => other
                    .parse()
                    .map(Self::Number)
                    .map_err(|_| BentoError::invalid_define(key, format!("'{}' is not a number", other))),
            };
        }
        if matches!(table.get("$undefined"), Some(toml::Value::Boolean(true))) {
            return Ok(Self::Undefined);
        }
        if matches!(table.get("$null"), Some(toml::Value::Boolean(true))) {
            return Ok(Self::Null);
        }

        Err(BentoError::invalid_define(key, "unsupported special value"))
    }
}

/// Source text for a value, without any top-level wrapping
pub fn to_code(value: &DefineValue, runtime: &RuntimeCapabilities) -> String {
    match value {
        DefineValue::Null => "null".to_string(),
        DefineValue::Undefined => "undefined".to_string(),
        DefineValue::Bool(b) => b.to_string(),
        DefineValue::Number(n) => number_to_code(*n),
        DefineValue::BigInt(digits) => {
            if runtime.bigint_literal {
                format!("{}n", digits)
            } else {
                format!("BigInt({})", quote(digits))
            }
        }
        DefineValue::String(s) => quote(s),
        DefineValue::Regex { pattern, flags } => format!("/{}/{}", regex_source(pattern), flags),
        DefineValue::Function(source) => format!("({})", source),
        DefineValue::Code(source) => source.clone(),
        DefineValue::Array(items) => {
            let items: Vec<String> = items.iter().map(|item| to_code(item, runtime)).collect();
            format!("[{}]", items.join(","))
        }
        DefineValue::Object(entries) => {
            let entries: Vec<String> = entries
                .iter()
                .map(|(key, value)| format!("{}:{}", quote(key), to_code(value, runtime)))
                .collect();
            format!("{{{}}}", entries.join(","))
        }
    }
}

/// Source text for an object or array, wrapped once at the top level per `asi`.
/// Other values are emitted as by [`to_code`].
pub fn stringify_obj(value: &DefineValue, runtime: &RuntimeCapabilities, asi: AsiSafety) -> String {
    let code = to_code(value, runtime);
    if !matches!(value, DefineValue::Array(_) | DefineValue::Object(_)) {
        return code;
    }

    match asi {
        AsiSafety::Unwrapped => code,
        AsiSafety::Safe if value.is_array() => code,
        AsiSafety::Safe => format!("({})", code),
        AsiSafety::Unsafe if value.is_array() => format!(";{}", code),
        AsiSafety::Unsafe => format!(";({})", code),
        AsiSafety::Unknown => format!("/*#__PURE__*/Object({})", code),
    }
}

fn number_to_code(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n == 0.0 && n.is_sign_negative() {
        "-0".to_string()
    } else {
        format!("{}", n)
    }
}

/// Escape `/` outside character classes and every line terminator so the
/// pattern fits a literal
fn regex_source(pattern: &str) -> String {
    if pattern.is_empty() {
        return "(?:)".to_string();
    }

    let mut out = String::with_capacity(pattern.len());
    let mut escaped = false;
    let mut in_class = false;
    for c in pattern.chars() {
        let terminator = match c {
            '\n' => Some("n"),
            '\r' => Some("r"),
            '\u{2028}' => Some("u2028"),
            '\u{2029}' => Some("u2029"),
            _ => None,
        };
        if let Some(name) = terminator {
            // an escaped terminator already has its backslash
            if !escaped {
                out.push('\\');
            }
            out.push_str(name);
            escaped = false;
            continue;
        }

        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' => in_class = false,
            '/' if !in_class => out.push('\\'),
            _ => {}
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::parser::parse_expr;
    use swc_core::ecma::ast::*;

    /// Evaluate a literal-only expression back into a value
    pub(crate) fn evaluate(expr: &Expr) -> DefineValue {
        match expr {
            Expr::Lit(Lit::Null(_)) => DefineValue::Null,
            Expr::Lit(Lit::Bool(b)) => DefineValue::Bool(b.value),
            Expr::Lit(Lit::Num(n)) => DefineValue::Number(n.value),
            Expr::Lit(Lit::Str(s)) => DefineValue::String(s.value.to_string()),
            Expr::Lit(Lit::BigInt(b)) => DefineValue::BigInt(b.value.to_string()),
            Expr::Lit(Lit::Regex(r)) => DefineValue::Regex {
                pattern: r.exp.to_string(),
                flags: r.flags.to_string(),
            },
            Expr::Ident(ident) => match &*ident.sym {
                "undefined" => DefineValue::Undefined,
                "NaN" => DefineValue::Number(f64::NAN),
                "Infinity" => DefineValue::Number(f64::INFINITY),
                other => panic!("unexpected identifier {other}"),
            },
            Expr::Unary(UnaryExpr { op: UnaryOp::Minus, arg, .. }) => match evaluate(arg) {
                DefineValue::Number(n) => DefineValue::Number(-n),
                DefineValue::BigInt(digits) => DefineValue::BigInt(format!("-{digits}")),
                other => panic!("cannot negate {other:?}"),
            },
            Expr::Paren(paren) => match &*paren.expr {
                Expr::Fn(_) | Expr::Arrow(_) => DefineValue::Function("<function>".to_string()),
                inner => evaluate(inner),
            },
            Expr::Call(call) => {
                let Callee::Expr(callee) = &call.callee else {
                    panic!("unexpected callee");
                };
                let Expr::Ident(name) = &**callee else {
                    panic!("unexpected callee");
                };
                let arg = evaluate(&call.args[0].expr);
                match (&*name.sym, arg) {
                    ("BigInt", DefineValue::String(digits)) => DefineValue::BigInt(digits),
                    ("Object", value) => value,
                    (other, _) => panic!("unexpected call {other}"),
                }
            }
            Expr::Array(array) => DefineValue::Array(
                array
                    .elems
                    .iter()
                    .map(|elem| evaluate(&elem.as_ref().unwrap().expr))
                    .collect(),
            ),
            Expr::Object(object) => DefineValue::Object(
                object
                    .props
                    .iter()
                    .map(|prop| match prop {
                        PropOrSpread::Prop(prop) => match &**prop {
                            Prop::KeyValue(kv) => {
                                let PropName::Str(key) = &kv.key else {
                                    panic!("unquoted key");
                                };
                                (key.value.to_string(), evaluate(&kv.value))
                            }
                            _ => panic!("unexpected property"),
                        },
                        PropOrSpread::Spread(_) => panic!("unexpected spread"),
                    })
                    .collect(),
            ),
            other => panic!("unsupported expression {other:?}"),
        }
    }

    /// Deep equality with `Object.is` semantics for numbers and functions compared by kind
    pub(crate) fn same_value(a: &DefineValue, b: &DefineValue) -> bool {
        match (a, b) {
            (DefineValue::Number(x), DefineValue::Number(y)) => {
                (x.is_nan() && y.is_nan()) || (x == y && x.is_sign_negative() == y.is_sign_negative())
            }
            (DefineValue::Function(_), DefineValue::Function(_)) => true,
            (DefineValue::Array(xs), DefineValue::Array(ys)) => {
                xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
            }
            (DefineValue::Object(xs), DefineValue::Object(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|((kx, x), (ky, y))| kx == ky && same_value(x, y))
            }
            _ => a == b,
        }
    }

    fn round_trip(value: &DefineValue, runtime: RuntimeCapabilities, asi: AsiSafety) -> DefineValue {
        let code = stringify_obj(value, &runtime, asi);
        let code = code.strip_prefix(';').unwrap_or(&code);
        evaluate(&parse_expr(code).unwrap())
    }

    fn sample() -> DefineValue {
        let mut nested = IndexMap::new();
        nested.insert("zero".to_string(), DefineValue::Number(-0.0));
        nested.insert("big".to_string(), DefineValue::BigInt("12345678901234567890".to_string()));
        nested.insert(
            "list".to_string(),
            DefineValue::Array(vec![
                DefineValue::Null,
                DefineValue::Undefined,
                DefineValue::Bool(false),
                DefineValue::Number(f64::NAN),
                DefineValue::Number(f64::NEG_INFINITY),
                DefineValue::Number(1.5),
            ]),
        );
        nested.insert("text".to_string(), DefineValue::String("quote \" and \\ slash".to_string()));
        nested.insert(
            "pattern".to_string(),
            DefineValue::Regex {
                pattern: "^a[/]b\\/c$".to_string(),
                flags: "gi".to_string(),
            },
        );
        nested.insert("callback".to_string(), DefineValue::Function("function () { return 1; }".to_string()));
        nested.insert("key with spaces".to_string(), DefineValue::Number(-42.0));
        DefineValue::Object(nested)
    }

    #[test]
    fn test_scalars() {
        let runtime = RuntimeCapabilities::default();
        assert_eq!(to_code(&DefineValue::Null, &runtime), "null");
        assert_eq!(to_code(&DefineValue::Undefined, &runtime), "undefined");
        assert_eq!(to_code(&DefineValue::Number(-0.0), &runtime), "-0");
        assert_eq!(to_code(&DefineValue::Number(0.0), &runtime), "0");
        assert_eq!(to_code(&DefineValue::Number(3.0), &runtime), "3");
        assert_eq!(to_code(&DefineValue::Number(f64::INFINITY), &runtime), "Infinity");
        assert_eq!(to_code(&DefineValue::String("a\"b".into()), &runtime), "\"a\\\"b\"");
        assert_eq!(
            to_code(&DefineValue::Function("() => 1".into()), &runtime),
            "(() => 1)"
        );
    }

    #[test]
    fn test_bigint_depends_on_runtime() {
        let value = DefineValue::BigInt("1".into());
        assert_eq!(to_code(&value, &RuntimeCapabilities { bigint_literal: true }), "1n");
        assert_eq!(to_code(&value, &RuntimeCapabilities::default()), "BigInt(\"1\")");
    }

    #[test]
    fn test_regex_literals() {
        let runtime = RuntimeCapabilities::default();
        let regex = |pattern: &str| DefineValue::Regex {
            pattern: pattern.to_string(),
            flags: "u".to_string(),
        };

        assert_eq!(to_code(&regex("a/b"), &runtime), "/a\\/b/u");
        assert_eq!(to_code(&regex("a\\/b"), &runtime), "/a\\/b/u");
        assert_eq!(to_code(&regex("[/]"), &runtime), "/[/]/u");
        assert_eq!(to_code(&regex(""), &runtime), "/(?:)/u");
    }

    #[test]
    fn test_regex_line_terminators_are_escaped() {
        let runtime = RuntimeCapabilities::default();
        let regex = |pattern: &str| DefineValue::Regex {
            pattern: pattern.to_string(),
            flags: String::new(),
        };

        assert_eq!(to_code(&regex("a\nb"), &runtime), "/a\\nb/");
        assert_eq!(to_code(&regex("a\\\nb"), &runtime), "/a\\nb/");
        assert_eq!(to_code(&regex("\r\u{2028}\u{2029}"), &runtime), "/\\r\\u2028\\u2029/");
        assert_eq!(to_code(&regex("[\\\r]"), &runtime), "/[\\r]/");

        let code = to_code(&regex("x\\\ny\u{2028}"), &runtime);
        assert!(!code.contains(['\n', '\r', '\u{2028}', '\u{2029}']));
        assert!(parse_expr(&code).is_ok());
    }

    #[test]
    fn test_unsafe_integers_are_rejected() {
        let table: toml::Table = toml::from_str("safe = 9007199254740991\nunsafe = 9007199254740993\nlow = -9007199254740993").unwrap();

        assert_eq!(
            DefineValue::from_toml("safe", &table["safe"]).unwrap(),
            DefineValue::Number(9007199254740991.0)
        );
        for key in ["unsafe", "low"] {
            let err = DefineValue::from_toml(key, &table[key]).unwrap_err();
            assert!(matches!(err, BentoError::InvalidDefine { .. }));
            assert!(err.to_string().contains("$bigint"), "{err}");
        }
    }

    #[test]
    fn test_nested_values_are_not_wrapped() {
        let runtime = RuntimeCapabilities::default();
        let mut inner = IndexMap::new();
        inner.insert("a".to_string(), DefineValue::Array(vec![DefineValue::Number(1.0)]));
        let value = DefineValue::Array(vec![DefineValue::Object(inner)]);

        assert_eq!(to_code(&value, &runtime), "[{\"a\":[1]}]");
        assert_eq!(
            stringify_obj(&value, &runtime, AsiSafety::Unknown),
            "/*#__PURE__*/Object([{\"a\":[1]}])"
        );
    }

    #[test]
    fn test_asi_wrapping() {
        let runtime = RuntimeCapabilities::default();
        let array = DefineValue::Array(vec![]);
        let object = DefineValue::Object(IndexMap::new());

        assert_eq!(stringify_obj(&object, &runtime, AsiSafety::Unwrapped), "{}");
        assert_eq!(stringify_obj(&object, &runtime, AsiSafety::Safe), "({})");
        assert_eq!(stringify_obj(&array, &runtime, AsiSafety::Safe), "[]");
        assert_eq!(stringify_obj(&object, &runtime, AsiSafety::Unsafe), ";({})");
        assert_eq!(stringify_obj(&array, &runtime, AsiSafety::Unsafe), ";[]");
        assert_eq!(stringify_obj(&object, &runtime, AsiSafety::Unknown), "/*#__PURE__*/Object({})");
        assert_eq!(stringify_obj(&DefineValue::Bool(true), &runtime, AsiSafety::Unknown), "true");
    }

    #[test]
    fn test_round_trip() {
        let value = sample();
        for bigint_literal in [false, true] {
            let runtime = RuntimeCapabilities { bigint_literal };
            for asi in [AsiSafety::Unwrapped, AsiSafety::Safe, AsiSafety::Unsafe, AsiSafety::Unknown] {
                let back = round_trip(&value, runtime, asi);
                assert!(same_value(&value, &back), "{asi:?}: {back:?}");
            }
        }
    }

    #[test]
    fn test_from_toml() {
        let table: toml::Table = toml::from_str(
            r#"
            flag = true
            count = 3
            name = "bento"
            big = { "$bigint" = "9007199254740993" }
            pattern = { "$regex" = "^x$", "$flags" = "i" }
            missing = { "$undefined" = true }
            nothing = { "$null" = true }
            negative_zero = { "$number" = "-0" }
            nested = { list = [1, 2], inner = { ok = false } }
            "#,
        )
        .unwrap();

        let convert = |key: &str| DefineValue::from_toml(key, &table[key]).unwrap();
        assert_eq!(convert("flag"), DefineValue::Bool(true));
        assert_eq!(convert("count"), DefineValue::Number(3.0));
        assert_eq!(convert("big"), DefineValue::BigInt("9007199254740993".into()));
        assert_eq!(
            convert("pattern"),
            DefineValue::Regex {
                pattern: "^x$".into(),
                flags: "i".into()
            }
        );
        assert_eq!(convert("missing"), DefineValue::Undefined);
        assert_eq!(convert("nothing"), DefineValue::Null);
        assert!(same_value(&convert("negative_zero"), &DefineValue::Number(-0.0)));
        assert!(matches!(convert("nested"), DefineValue::Object(ref o) if o.len() == 2));
    }

    #[test]
    fn test_from_toml_rejects_bad_specials() {
        let bad: toml::Value = toml::from_str::<toml::Table>(r#"v = { "$bigint" = "12a" }"#).unwrap()["v"].clone();
        assert!(matches!(
            DefineValue::from_toml("v", &bad),
            Err(BentoError::InvalidDefine { .. })
        ));

        let bad: toml::Value = toml::from_str::<toml::Table>(r#"v = { "$regex" = "x", "$flags" = "q" }"#).unwrap()["v"].clone();
        assert!(DefineValue::from_toml("v", &bad).is_err());
    }
}
