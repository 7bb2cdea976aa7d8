//! Bento - transform-and-assemble core for a JavaScript module bundler
//!
//! Given the modules of a dependency graph, Bento classifies each one by
//! origin, dispatches it to the cheapest transform strategy that is safe for
//! it, substitutes locally authored vendor patches at resolution time and runs
//! serializer plugins (including generated constants) before the bundle text
//! is produced.
//!
//! # Features
//!
//! - Ordered, first-match rule dispatch over module classifications
//! - Passthrough, light/targeted resyntax and full compile strategies
//! - Vendor patch resolver built from a `patches/` tree
//! - Serializer plugin chain with a content-addressed define module
//!
//! # Example
//!
//! ```rust,no_run
//! use bento::{Config, Dispatcher, ModuleDescriptor, TransformOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let dispatcher = Dispatcher::from_config(&config)?;
//!
//!     let descriptor = ModuleDescriptor::new(
//!         "/app/node_modules/react-native/index.js",
//!         "export default 42;",
//!         TransformOptions::new("/app"),
//!     );
//!     let result = dispatcher.transform(&descriptor)?;
//!     println!("{:?} via {:?}", result.rule, result.strategy);
//!
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod cli;
pub mod compiler;
pub mod config;
pub mod define;
pub mod dispatcher;
pub mod errors;
pub mod function_map;
pub mod graph;
pub mod parser;
pub mod resolver;
pub mod resyntax;
pub mod serializer;
pub mod transformer;
pub mod value;

// Re-export main types for convenience
pub use classifier::{Classifier, ModuleKind};
pub use config::Config;
pub use define::{DefinePlugin, PublicEnvPlugin};
pub use dispatcher::{Dispatcher, Rule, RulePredicate, RuleTable};
pub use errors::{BentoError, Result};
pub use graph::{Graph, Module, ModuleOutput, OutputKind, SerializerOptions};
pub use resolver::{ModuleResolver, PatchResolver, PatchTable, Resolution, ResolutionContext};
pub use serializer::{BundleSerializer, BundleWriter, ScriptBundleWriter, SerializerPlugin};
pub use transformer::{BuildMode, ModuleDescriptor, Strategy, TransformOptions, TransformResult};
pub use value::{AsiSafety, DefineValue, RuntimeCapabilities};

/// Current version of Bento
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Serializer with the configured plugins: define constants, then public env in dev builds
pub fn default_serializer(config: &Config) -> Result<BundleSerializer> {
    let mut serializer = BundleSerializer::new(ScriptBundleWriter)
        .with_plugin(DefinePlugin::from_config(config)?);
    if config.serializer.inject_public_env {
        serializer = serializer.with_plugin(PublicEnvPlugin::from_env(config));
    }
    Ok(serializer)
}

/// Runtime capabilities declared in the configuration
pub fn runtime_capabilities(config: &Config) -> RuntimeCapabilities {
    RuntimeCapabilities {
        bigint_literal: config.serializer.bigint_literal,
    }
}
