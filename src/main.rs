use anyhow::{Context, Result};
use clap::Parser;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bento::cli::{Cli, Commands};
use bento::{
    Classifier, Config, DefinePlugin, Dispatcher, ModuleDescriptor, PatchTable, TransformOptions,
    classifier::package_name,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Initialize tracing
    init_tracing(cli.verbose)?;

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    info!("Starting Bento v{}", bento::VERSION);

    // Handle commands
    match cli.command {
        Commands::Transform {
            file,
            project_root,
            platform,
            production,
        } => {
            let source = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("Failed to read module: {}", file.display()))?;

            let dispatcher = Dispatcher::from_config(&config)?;
            let options = TransformOptions::new(project_root)
                .with_dev(!production)
                .with_platform(platform);
            let descriptor = ModuleDescriptor::new(&file, source, options);

            let result = dispatcher.transform(&descriptor)?;
            let classification = dispatcher.classifier().classify(&file);
            let summary = json!({
                "file": file,
                "classification": classification,
                "rule": result.rule,
                "strategy": result.strategy,
                "warnings": result.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "functionMap": result.function_map,
                "code": result.code,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Commands::Classify { path } => {
            let classifier = Classifier::new(&config.classifier)?;
            let kind = classifier.classify(&path);
            match package_name(&path) {
                Some(name) => println!("{} ({})", kind, name),
                None => println!("{}", kind),
            }
        }

        Commands::Patches { project_root } => {
            if !config.patches.enabled {
                info!("Vendor patches are disabled");
                return Ok(());
            }

            let table = PatchTable::load_cached(&config.patches_dir(&project_root))?;
            for replacement in table.replacements() {
                println!(
                    "{} -> {}",
                    replacement.match_pattern.as_str(),
                    replacement.replacement_path.display()
                );
            }
        }

        Commands::Define { bigint_literal } => {
            let plugin = DefinePlugin::from_config(&config)?;
            let mut runtime = bento::runtime_capabilities(&config);
            runtime.bigint_literal |= bigint_literal;
            let module = plugin.generate(&runtime);

            println!("// {}", module.path.display());
            for output in &module.output {
                println!("{}", output.code);
            }
        }

        Commands::Init { output_dir } => {
            Config::init(&output_dir)?;
            info!("Initialized Bento configuration in {}", output_dir.display());
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_level = if verbose { "bento=debug" } else { "bento=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
        )
        .with(filter)
        .init();

    Ok(())
}
