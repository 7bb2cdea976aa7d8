//! Serializer plugins that splice generated constants into the bundle.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::Config;
use crate::errors::{BentoError, Result};
use crate::graph::{Graph, Module, ModuleOutput, OutputKind, SerializerOptions};
use crate::resyntax::is_identifier;
use crate::serializer::SerializerPlugin;
use crate::value::{AsiSafety, DefineValue, RuntimeCapabilities, stringify_obj};

/// Folder virtual modules are placed under
pub const GENERATED_NAMESPACE: &str = "__generated__";

const RESERVED_WORDS: &[&str] = &[
    "await", "break", "case", "catch", "class", "const", "continue", "debugger", "default",
    "delete", "do", "else", "enum", "export", "extends", "false", "finally", "for", "function",
    "if", "implements", "import", "in", "instanceof", "interface", "let", "new", "null",
    "package", "private", "protected", "public", "return", "static", "super", "switch", "this",
    "throw", "true", "try", "typeof", "var", "void", "while", "with", "yield",
];

/// Check that `key` can appear on the left of a generated declaration or assignment
pub fn validate_define_key(key: &str) -> Result<()> {
    if key.contains('.') {
        if let Some(segment) = key.split('.').find(|segment| !is_identifier(segment)) {
            return Err(BentoError::invalid_define(
                key,
                format!("'{}' is not a valid property name", segment),
            ));
        }
    } else if !is_identifier(key) || RESERVED_WORDS.contains(&key) {
        return Err(BentoError::invalid_define(key, "not a valid identifier"));
    }
    Ok(())
}

/// One line per entry. Dotted keys such as `process.env.API_URL` are assigned,
/// plain identifiers become `const` declarations.
pub fn generate_define_code(values: &IndexMap<String, DefineValue>, runtime: &RuntimeCapabilities) -> String {
    values
        .iter()
        .map(|(key, value)| {
            // right-hand side of `=`, no statement-position wrapping needed
            let code = stringify_obj(value, runtime, AsiSafety::Unwrapped);
            if key.contains('.') {
                format!("{} = {};", key, code)
            } else {
                format!("const {} = {};", key, code)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Virtual pre-module named after the hash of its code
pub fn virtual_module(code: &str) -> Module {
    let digest = format!("{:x}", Sha256::digest(code.as_bytes()));
    let path = PathBuf::from(format!("{}/{}.js", GENERATED_NAMESPACE, &digest[..16]));
    Module::new(path, vec![ModuleOutput::new(OutputKind::GeneratedScript, code)])
}

/// Insert `module` right after the anchor pre-module, or after the first one
fn splice_after_anchor(pre_modules: &mut Vec<Module>, anchor: &str, module: Module) {
    if pre_modules.iter().any(|existing| existing.path == module.path) {
        debug!("{} is already present", module.path.display());
        return;
    }

    let position = pre_modules
        .iter()
        .position(|existing| existing.is_named(anchor))
        .unwrap_or(0);
    let index = (position + 1).min(pre_modules.len());

    debug!("Injecting {} at pre-module {}", module.path.display(), index);
    pre_modules.insert(index, module);
}

#[derive(Debug, Clone)]
pub struct DefinePlugin {
    values: IndexMap<String, DefineValue>,
    bootstrap_module: String,
}

impl DefinePlugin {
    pub fn new(values: IndexMap<String, DefineValue>, bootstrap_module: impl Into<String>) -> Self {
        Self {
            values,
            bootstrap_module: bootstrap_module.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let values = config
            .define
            .iter()
            .map(|(key, value)| -> Result<(String, DefineValue)> {
                validate_define_key(key)?;
                Ok((key.clone(), DefineValue::from_toml(key, value)?))
            })
            .collect::<Result<IndexMap<_, _>>>()?;

        Ok(Self::new(values, config.serializer.bootstrap_module.clone()))
    }

    pub fn values(&self) -> &IndexMap<String, DefineValue> {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn generate(&self, runtime: &RuntimeCapabilities) -> Module {
        virtual_module(&generate_define_code(&self.values, runtime))
    }
}

impl SerializerPlugin for DefinePlugin {
    fn name(&self) -> &str {
        "define"
    }

    fn apply(
        &self,
        _entry_point: &Path,
        pre_modules: &mut Vec<Module>,
        _graph: &mut Graph,
        options: &SerializerOptions,
    ) -> Result<()> {
        if self.values.is_empty() {
            return Ok(());
        }

        splice_after_anchor(pre_modules, &self.bootstrap_module, self.generate(&options.runtime));
        Ok(())
    }
}

/// Exposes prefixed environment variables as `process.env.*` in dev builds
#[derive(Debug, Clone)]
pub struct PublicEnvPlugin {
    define: DefinePlugin,
}

impl PublicEnvPlugin {
    /// Snapshot of `vars` whose names start with `prefix`, sorted by name
    pub fn from_vars<I>(prefix: &str, vars: I, bootstrap_module: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let sorted: BTreeMap<String, String> = vars
            .into_iter()
            .filter(|(name, _)| name.starts_with(prefix))
            .filter(|(name, _)| {
                let valid = is_identifier(name);
                if !valid {
                    debug!("Skipping environment variable {}", name);
                }
                valid
            })
            .collect();

        let values = sorted
            .into_iter()
            .map(|(name, value)| (format!("process.env.{}", name), DefineValue::String(value)))
            .collect();

        Self {
            define: DefinePlugin::new(values, bootstrap_module),
        }
    }

    pub fn from_env(config: &Config) -> Self {
        Self::from_vars(
            &config.serializer.public_env_prefix,
            std::env::vars(),
            config.serializer.bootstrap_module.clone(),
        )
    }

    pub fn values(&self) -> &IndexMap<String, DefineValue> {
        self.define.values()
    }
}

impl SerializerPlugin for PublicEnvPlugin {
    fn name(&self) -> &str {
        "public-env"
    }

    fn apply(
        &self,
        entry_point: &Path,
        pre_modules: &mut Vec<Module>,
        graph: &mut Graph,
        options: &SerializerOptions,
    ) -> Result<()> {
        if !options.mode.is_dev() {
            return Ok(());
        }
        self.define.apply(entry_point, pre_modules, graph, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_permissive;
    use crate::transformer::BuildMode;
    use crate::value::tests::{evaluate, same_value};
    use swc_core::ecma::ast::{Decl, ModuleItem, Program, Stmt};

    fn options(mode: BuildMode) -> SerializerOptions {
        SerializerOptions::new("/app", mode)
    }

    fn script(path: &str) -> Module {
        Module::new(path, vec![ModuleOutput::new(OutputKind::Script, "/* pre */")])
    }

    fn scenario() -> IndexMap<String, DefineValue> {
        let mut values = IndexMap::new();
        values.insert("__DEV__".to_string(), DefineValue::Bool(true));
        values.insert("large".to_string(), DefineValue::BigInt("1".to_string()));
        values.insert("nullish".to_string(), DefineValue::Null);
        values.insert("undefinedish".to_string(), DefineValue::Undefined);
        values
    }

    /// Evaluate `const name = <literal>;` declarations back into values
    fn evaluate_declarations(code: &str) -> IndexMap<String, DefineValue> {
        let tree = parse_permissive(Path::new("generated.js"), code).unwrap();
        let statements: Vec<Stmt> = match tree.program {
            Program::Script(script) => script.body,
            Program::Module(module) => module
                .body
                .into_iter()
                .filter_map(|item| match item {
                    ModuleItem::Stmt(stmt) => Some(stmt),
                    ModuleItem::ModuleDecl(_) => None,
                })
                .collect(),
        };

        let mut values = IndexMap::new();
        for statement in statements {
            let Stmt::Decl(Decl::Var(var)) = statement else {
                panic!("unexpected statement");
            };
            for declarator in &var.decls {
                let name = declarator.name.as_ident().unwrap().id.sym.to_string();
                values.insert(name, evaluate(declarator.init.as_ref().unwrap()));
            }
        }
        values
    }

    #[test]
    fn test_bigint_fallback_scenario() {
        let code = generate_define_code(&scenario(), &RuntimeCapabilities::default());

        assert!(code.contains("BigInt(\"1\")"));
        assert_eq!(code.lines().count(), 4);

        let evaluated = evaluate_declarations(&code);
        let expected = scenario();
        assert_eq!(evaluated.len(), expected.len());
        for (key, value) in &expected {
            assert!(same_value(value, &evaluated[key]), "{key}");
        }
    }

    #[test]
    fn test_env_keys_are_assignments() {
        let mut values = IndexMap::new();
        values.insert("process.env.API_URL".to_string(), DefineValue::String("https://x".into()));
        let code = generate_define_code(&values, &RuntimeCapabilities::default());

        assert_eq!(code, "process.env.API_URL = \"https://x\";");
    }

    #[test]
    fn test_virtual_module_is_content_addressed() {
        let runtime = RuntimeCapabilities::default();
        let first = DefinePlugin::new(scenario(), "__prelude__").generate(&runtime);
        let second = DefinePlugin::new(scenario(), "__prelude__").generate(&runtime);

        assert_eq!(first, second);
        assert!(first.path.starts_with(GENERATED_NAMESPACE));
        assert!(first.dependencies.is_empty());
        assert_eq!(first.output[0].kind, OutputKind::GeneratedScript);
        assert_eq!(first.output[0].line_count, 4);
        assert!(first.output[0].map.is_empty());

        let literal = DefinePlugin::new(scenario(), "__prelude__")
            .generate(&RuntimeCapabilities { bigint_literal: true });
        assert_ne!(first.path, literal.path);
    }

    #[test]
    fn test_spliced_after_bootstrap_module() {
        let plugin = DefinePlugin::new(scenario(), "__prelude__");
        let mut pre_modules = vec![script("polyfill.js"), script("__prelude__"), script("other.js")];

        plugin
            .apply(Path::new("/app/index.js"), &mut pre_modules, &mut Graph::default(), &options(BuildMode::Production))
            .unwrap();

        assert_eq!(pre_modules.len(), 4);
        assert!(pre_modules[2].path.starts_with(GENERATED_NAMESPACE));
    }

    #[test]
    fn test_spliced_after_first_module_without_anchor() {
        let plugin = DefinePlugin::new(scenario(), "__prelude__");
        let mut pre_modules = vec![script("a.js"), script("b.js")];
        plugin
            .apply(Path::new("/app/index.js"), &mut pre_modules, &mut Graph::default(), &options(BuildMode::Production))
            .unwrap();
        assert!(pre_modules[1].path.starts_with(GENERATED_NAMESPACE));

        let mut empty = Vec::new();
        plugin
            .apply(Path::new("/app/index.js"), &mut empty, &mut Graph::default(), &options(BuildMode::Production))
            .unwrap();
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn test_rerun_is_idempotent() {
        let plugin = DefinePlugin::new(scenario(), "__prelude__");
        let mut pre_modules = vec![script("__prelude__")];
        let opts = options(BuildMode::Development);

        plugin.apply(Path::new("/app/index.js"), &mut pre_modules, &mut Graph::default(), &opts).unwrap();
        let snapshot = pre_modules.clone();
        plugin.apply(Path::new("/app/index.js"), &mut pre_modules, &mut Graph::default(), &opts).unwrap();

        assert_eq!(pre_modules, snapshot);
    }

    #[test]
    fn test_empty_define_map_adds_nothing() {
        let plugin = DefinePlugin::new(IndexMap::new(), "__prelude__");
        let mut pre_modules = vec![script("__prelude__")];
        plugin
            .apply(Path::new("/app/index.js"), &mut pre_modules, &mut Graph::default(), &options(BuildMode::Development))
            .unwrap();
        assert_eq!(pre_modules.len(), 1);
    }

    #[test]
    fn test_from_config() {
        let config = Config::parse(
            r#"
            [define]
            __DEV__ = false
            "process.env.NODE_ENV" = "production"
            big = { "$bigint" = "10" }
            "#,
        )
        .unwrap();
        let plugin = DefinePlugin::from_config(&config).unwrap();
        let code = generate_define_code(plugin.values(), &RuntimeCapabilities { bigint_literal: true });

        assert_eq!(
            code,
            "const __DEV__ = false;\nprocess.env.NODE_ENV = \"production\";\nconst big = 10n;"
        );
    }

    #[test]
    fn test_object_values_are_not_wrapped() {
        let mut flags = IndexMap::new();
        flags.insert("beta".to_string(), DefineValue::Bool(true));
        let mut values = IndexMap::new();
        values.insert("FLAGS".to_string(), DefineValue::Object(flags));

        assert_eq!(
            generate_define_code(&values, &RuntimeCapabilities::default()),
            "const FLAGS = {\"beta\":true};"
        );
    }

    #[test]
    fn test_invalid_keys_are_rejected() {
        for key in ["my-key", "a..b", "process.env.", "class", "1st"] {
            let mut config = Config::default();
            config.define.insert(key.to_string(), toml::Value::Integer(1));
            assert!(
                matches!(DefinePlugin::from_config(&config), Err(BentoError::InvalidDefine { .. })),
                "{key}"
            );
        }

        assert!(validate_define_key("$config").is_ok());
        assert!(validate_define_key("process.env.API_URL").is_ok());
        assert!(validate_define_key("globalThis.default").is_ok());
    }

    #[test]
    fn test_public_env_skips_unusable_names() {
        let plugin = PublicEnvPlugin::from_vars(
            "EXPO_PUBLIC_",
            vec![
                ("EXPO_PUBLIC_OK".to_string(), "1".to_string()),
                ("EXPO_PUBLIC_NOT-OK".to_string(), "2".to_string()),
            ],
            "__prelude__",
        );
        assert_eq!(plugin.values().len(), 1);
    }

    #[test]
    fn test_public_env_only_in_dev() {
        let plugin = PublicEnvPlugin::from_vars(
            "EXPO_PUBLIC_",
            vec![
                ("EXPO_PUBLIC_B".to_string(), "2".to_string()),
                ("SECRET".to_string(), "x".to_string()),
                ("EXPO_PUBLIC_A".to_string(), "1".to_string()),
            ],
            "__prelude__",
        );
        assert_eq!(
            plugin.values().keys().collect::<Vec<_>>(),
            vec!["process.env.EXPO_PUBLIC_A", "process.env.EXPO_PUBLIC_B"]
        );

        let mut production = vec![script("__prelude__")];
        plugin
            .apply(Path::new("/app/index.js"), &mut production, &mut Graph::default(), &options(BuildMode::Production))
            .unwrap();
        assert_eq!(production.len(), 1);

        let mut development = vec![script("__prelude__")];
        plugin
            .apply(Path::new("/app/index.js"), &mut development, &mut Graph::default(), &options(BuildMode::Development))
            .unwrap();
        assert_eq!(development.len(), 2);
        assert!(development[1].output[0].code.contains("process.env.EXPO_PUBLIC_A = \"1\";"));
    }
}
