//! Bundle assembly: serializer plugins followed by bundle text production.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{BentoError, Result};
use crate::graph::{Graph, Module, OutputKind, SerializerOptions};
use crate::resyntax::quote;

/// Runs once per bundle, before the bundle text is produced
pub trait SerializerPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn apply(
        &self,
        entry_point: &Path,
        pre_modules: &mut Vec<Module>,
        graph: &mut Graph,
        options: &SerializerOptions,
    ) -> Result<()>;
}

/// Produces the final bundle text
#[async_trait]
pub trait BundleWriter: Send + Sync {
    async fn write(
        &self,
        entry_point: &Path,
        pre_modules: &[Module],
        graph: &Graph,
        options: &SerializerOptions,
    ) -> Result<String>;
}

/// Plain script bundle: pre-modules verbatim, graph modules as `__d` factories,
/// then `__r` for each entry point
#[derive(Debug, Clone, Default)]
pub struct ScriptBundleWriter;

#[async_trait]
impl BundleWriter for ScriptBundleWriter {
    async fn write(
        &self,
        entry_point: &Path,
        pre_modules: &[Module],
        graph: &Graph,
        options: &SerializerOptions,
    ) -> Result<String> {
        let mut parts: Vec<String> = Vec::new();

        for module in pre_modules {
            for output in &module.output {
                parts.push(output.code.trim_end().to_string());
            }
        }

        for (id, (path, module)) in graph.modules.iter().enumerate() {
            let dependencies = module
                .dependencies
                .values()
                .map(|dependency| {
                    graph.module_id(dependency).map(|id| id.to_string()).ok_or_else(|| BentoError::BundleError {
                        message: format!(
                            "{} depends on {}, which is not in the graph",
                            path.display(),
                            dependency.display()
                        ),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let relative = path.strip_prefix(&options.project_root).unwrap_or(path);
            for output in &module.output {
                if output.kind.is_script() {
                    parts.push(output.code.trim_end().to_string());
                    continue;
                }
                parts.push(format!(
                    "__d(function (global, require, _$$_IMPORT_DEFAULT, _$$_IMPORT_ALL, module, exports, _dependencyMap) {{\n{}\n}}, {}, [{}], {});",
                    output.code.trim_end(),
                    id,
                    dependencies.join(","),
                    quote(&relative.to_string_lossy())
                ));
            }
        }

        if options.run_module {
            let entry_points = if graph.entry_points.is_empty() {
                vec![entry_point.to_path_buf()]
            } else {
                graph.entry_points.clone()
            };
            for entry in entry_points {
                if let Some(id) = graph.module_id(&entry) {
                    parts.push(format!("__r({});", id));
                }
            }
        }

        let mut bundle = parts.join("\n");
        bundle.push('\n');
        Ok(bundle)
    }
}

pub struct BundleSerializer {
    plugins: Vec<Box<dyn SerializerPlugin>>,
    writer: Box<dyn BundleWriter>,
}

impl BundleSerializer {
    pub fn new(writer: impl BundleWriter + 'static) -> Self {
        Self {
            plugins: Vec::new(),
            writer: Box::new(writer),
        }
    }

    pub fn with_plugin(mut self, plugin: impl SerializerPlugin + 'static) -> Self {
        self.plugins.push(Box::new(plugin));
        self
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.plugins.iter().map(|plugin| plugin.name()).collect()
    }

    /// Run every plugin in order, then produce the bundle text
    pub async fn serialize(
        &self,
        entry_point: &Path,
        pre_modules: &mut Vec<Module>,
        graph: &mut Graph,
        options: &SerializerOptions,
    ) -> Result<String> {
        for plugin in &self.plugins {
            debug!("Running serializer plugin '{}'", plugin.name());
            plugin.apply(entry_point, pre_modules, graph, options)?;
        }

        self.writer
            .write(entry_point, pre_modules, graph, options)
            .await
    }
}

impl std::fmt::Debug for BundleSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleSerializer")
            .field("plugins", &self.plugin_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ModuleOutput;
    use crate::transformer::BuildMode;
    use std::path::PathBuf;
    use std::sync::Arc;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        calls: Arc<Mutex<Vec<&'static str>>>,
    }

    impl SerializerPlugin for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn apply(
            &self,
            _entry_point: &Path,
            pre_modules: &mut Vec<Module>,
            _graph: &mut Graph,
            _options: &SerializerOptions,
        ) -> Result<()> {
            self.calls.lock().push(self.name);
            pre_modules.push(Module::new(
                self.name,
                vec![ModuleOutput::new(OutputKind::Script, format!("// {}", self.name))],
            ));
            Ok(())
        }
    }

    struct Failing;

    impl SerializerPlugin for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn apply(&self, _: &Path, _: &mut Vec<Module>, _: &mut Graph, _: &SerializerOptions) -> Result<()> {
            Err(BentoError::BundleError {
                message: "boom".to_string(),
            })
        }
    }

    fn graph() -> Graph {
        let mut graph = Graph::new(vec![PathBuf::from("/app/index.js")]);
        graph.add_module(
            Module::new(
                "/app/index.js",
                vec![ModuleOutput::new(OutputKind::Module, "require(_dependencyMap[0]);")],
            )
            .with_dependency("./b", "/app/b.js"),
        );
        graph.add_module(Module::new(
            "/app/b.js",
            vec![ModuleOutput::new(OutputKind::Module, "exports.b = 1;")],
        ));
        graph
    }

    #[tokio::test]
    async fn test_plugins_run_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let serializer = BundleSerializer::new(ScriptBundleWriter)
            .with_plugin(Recorder { name: "first", calls: calls.clone() })
            .with_plugin(Recorder { name: "second", calls: calls.clone() });

        let mut pre_modules = Vec::new();
        let mut graph = graph();
        let options = SerializerOptions::new("/app", BuildMode::Development);
        let bundle = serializer
            .serialize(Path::new("/app/index.js"), &mut pre_modules, &mut graph, &options)
            .await
            .unwrap();

        assert_eq!(*calls.lock(), vec!["first", "second"]);
        assert_eq!(pre_modules.len(), 2);
        assert!(bundle.find("// first").unwrap() < bundle.find("// second").unwrap());
    }

    #[tokio::test]
    async fn test_script_bundle_layout() {
        let options = SerializerOptions::new("/app", BuildMode::Production);
        let bundle = ScriptBundleWriter
            .write(Path::new("/app/index.js"), &[], &graph(), &options)
            .await
            .unwrap();

        assert!(bundle.contains("}, 0, [1], \"index.js\");"));
        assert!(bundle.contains("}, 1, [], \"b.js\");"));
        assert!(bundle.trim_end().ends_with("__r(0);"));
    }

    #[tokio::test]
    async fn test_missing_dependency_is_an_error() {
        let mut graph = Graph::new(vec![]);
        graph.add_module(
            Module::new("/app/a.js", vec![ModuleOutput::new(OutputKind::Module, "")])
                .with_dependency("./gone", "/app/gone.js"),
        );
        let options = SerializerOptions::new("/app", BuildMode::Production);

        let err = ScriptBundleWriter
            .write(Path::new("/app/a.js"), &[], &graph, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, BentoError::BundleError { .. }));
    }

    #[tokio::test]
    async fn test_plugin_errors_stop_serialization() {
        let serializer = BundleSerializer::new(ScriptBundleWriter).with_plugin(Failing);
        let options = SerializerOptions::new("/app", BuildMode::Production);

        let result = serializer
            .serialize(Path::new("/app/index.js"), &mut Vec::new(), &mut graph(), &options)
            .await;
        assert!(result.is_err());
    }
}
