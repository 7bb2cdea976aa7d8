use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::compiler::CompilePlugin;
use crate::resyntax::Rewrite;

/// Name of the project configuration file
pub const CONFIG_FILE_NAME: &str = "bento.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Module origin classification
    pub classifier: ClassifierConfig,

    /// Transform rule configuration
    pub transform: TransformConfig,

    /// Full compile pipeline configuration
    pub compile: CompileConfig,

    /// Vendor patch configuration
    pub patches: PatchConfig,

    /// Bundle serializer configuration
    pub serializer: SerializerConfig,

    /// Constants injected into the bundle by the define plugin
    pub define: IndexMap<String, toml::Value>,
}

/// Folder + module id matcher, e.g. `node_modules/react-native`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatcherConfig {
    /// Folders the module must live directly under
    #[serde(default = "default_matcher_folders")]
    pub folders: Vec<String>,

    /// Literal module names
    #[serde(default)]
    pub module_ids: Vec<String>,

    /// Regex fragments matched against the module name
    #[serde(default)]
    pub module_patterns: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Framework runtime packages
    #[serde(default = "default_framework_matchers")]
    pub framework: Vec<MatcherConfig>,

    /// Installed third-party packages
    #[serde(default = "default_package_matchers")]
    pub packages: Vec<MatcherConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Rewrites applied to framework runtime modules
    #[serde(default = "default_light_rewrites")]
    pub light_rewrites: Vec<Rewrite>,

    /// Warn once per package that falls through to the full compiler
    #[serde(default = "default_warn_untranspiled")]
    pub warn_untranspiled: bool,

    /// Prebuilt packages that are passed through untouched
    #[serde(default = "default_passthrough_matchers")]
    pub passthrough: Vec<MatcherConfig>,

    /// Problem dependencies that get a wider rewrite set
    #[serde(default = "default_targeted_modules")]
    pub targeted: Vec<TargetedModuleConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetedModuleConfig {
    /// Package name, e.g. `@scope/name`
    pub module: String,

    /// Rewrites to apply to every file of the package
    #[serde(default = "default_light_rewrites")]
    pub rewrites: Vec<Rewrite>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Ordered compile plugins
    #[serde(default = "default_compile_plugins")]
    pub plugins: Vec<CompilePlugin>,

    /// Files the compiler produces no output for
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchConfig {
    /// Enable vendor patch substitution
    #[serde(default = "default_patches_enabled")]
    pub enabled: bool,

    /// Patch tree location, relative to the project root
    #[serde(default = "default_patches_dir")]
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializerConfig {
    /// Target runtime understands `123n` literals
    #[serde(default)]
    pub bigint_literal: bool,

    /// Pre-module that generated constants are placed after
    #[serde(default = "default_bootstrap_module")]
    pub bootstrap_module: String,

    /// Prefix of environment variables exposed to the bundle
    #[serde(default = "default_public_env_prefix")]
    pub public_env_prefix: String,

    /// Inject public environment variables in dev builds
    #[serde(default = "default_inject_public_env")]
    pub inject_public_env: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            transform: TransformConfig::default(),
            compile: CompileConfig::default(),
            patches: PatchConfig::default(),
            serializer: SerializerConfig::default(),
            define: IndexMap::new(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            framework: default_framework_matchers(),
            packages: default_package_matchers(),
        }
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            light_rewrites: default_light_rewrites(),
            warn_untranspiled: default_warn_untranspiled(),
            passthrough: default_passthrough_matchers(),
            targeted: default_targeted_modules(),
        }
    }
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            plugins: default_compile_plugins(),
            ignore: Vec::new(),
        }
    }
}

impl Default for PatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_patches_enabled(),
            directory: default_patches_dir(),
        }
    }
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            bigint_literal: false,
            bootstrap_module: default_bootstrap_module(),
            public_env_prefix: default_public_env_prefix(),
            inject_public_env: default_inject_public_env(),
        }
    }
}

impl MatcherConfig {
    pub fn modules<I, S>(module_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            folders: default_matcher_folders(),
            module_ids: module_ids.into_iter().map(Into::into).collect(),
            module_patterns: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::find_config_file()?,
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

            Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> crate::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Initialize configuration file
    pub fn init(output_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(output_dir)
            .with_context(|| format!("Failed to create directory: {}", output_dir.display()))?;

        let config_path = output_dir.join(CONFIG_FILE_NAME);
        let config = Config::default();

        let content = toml::to_string_pretty(&config)
            .context("Failed to serialize default configuration")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Absolute patch tree location for a project
    pub fn patches_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.patches.directory)
    }

    /// Find configuration file in standard locations
    fn find_config_file() -> Result<PathBuf> {
        let current_dir = std::env::current_dir()
            .context("Failed to get current directory")?;

        // Look for bento.toml in current directory and parents
        let mut dir = current_dir.as_path();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Ok(config_path);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => break,
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("bento").join("config.toml");
            if config_path.exists() {
                return Ok(config_path);
            }
        }

        // Return default path (may not exist)
        Ok(current_dir.join(CONFIG_FILE_NAME))
    }
}

// Default value functions
fn default_matcher_folders() -> Vec<String> {
    vec!["node_modules".to_string()]
}

fn default_framework_matchers() -> Vec<MatcherConfig> {
    vec![MatcherConfig {
        folders: default_matcher_folders(),
        module_ids: vec![
            "react-native".to_string(),
            "@react-native".to_string(),
            "expo".to_string(),
            "expo-modules-core".to_string(),
            "@expo".to_string(),
        ],
        module_patterns: vec!["@react-native-community/[^/]+".to_string()],
    }]
}

fn default_package_matchers() -> Vec<MatcherConfig> {
    vec![MatcherConfig::modules(Vec::<String>::new())]
}

fn default_passthrough_matchers() -> Vec<MatcherConfig> {
    vec![MatcherConfig::modules(["@babel/runtime", "regenerator-runtime"])]
}

fn default_light_rewrites() -> Vec<Rewrite> {
    vec![Rewrite::Jsx, Rewrite::Imports, Rewrite::Typescript]
}

fn default_targeted_modules() -> Vec<TargetedModuleConfig> {
    vec![TargetedModuleConfig {
        module: "@tanstack/query-core".to_string(),
        rewrites: vec![Rewrite::Imports, Rewrite::DynamicImport],
    }]
}

fn default_warn_untranspiled() -> bool {
    true
}

fn default_compile_plugins() -> Vec<CompilePlugin> {
    vec![
        CompilePlugin::Jsx,
        CompilePlugin::Typescript,
        CompilePlugin::InlineDev,
        CompilePlugin::DynamicImport,
        CompilePlugin::Imports,
    ]
}

fn default_patches_enabled() -> bool {
    true
}

fn default_patches_dir() -> PathBuf {
    PathBuf::from("patches")
}

fn default_bootstrap_module() -> String {
    "__prelude__".to_string()
}

fn default_public_env_prefix() -> String {
    "EXPO_PUBLIC_".to_string()
}

fn default_inject_public_env() -> bool {
    true
}
