use std::path::PathBuf;
use clap::{Parser, Subcommand};

/// Transform-and-assemble core for a JavaScript module bundler
#[derive(Parser)]
#[command(
    name = "bento",
    version,
    about = "Transform-and-assemble core for a JavaScript module bundler",
    long_about = "Bento is the transform-and-assemble core of a JavaScript module bundler. It classifies modules, dispatches each one to the cheapest transform strategy that is safe for it, substitutes vendor patches at resolution time and injects generated constants into bundles."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transform a single module and print the result as JSON
    Transform {
        /// Module source file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Project root the module belongs to
        #[arg(short, long, default_value = ".")]
        project_root: PathBuf,

        /// Target platform
        #[arg(long, default_value = "ios", env = "BENTO_PLATFORM")]
        platform: String,

        /// Production build
        #[arg(long)]
        production: bool,
    },

    /// Show the origin classification of a module path
    Classify {
        /// Module path
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// List the vendor patch replacement table
    Patches {
        /// Project root holding the patches directory
        #[arg(short, long, default_value = ".")]
        project_root: PathBuf,
    },

    /// Print the generated constants module for the configured define table
    Define {
        /// Target runtime supports BigInt literals
        #[arg(long)]
        bigint_literal: bool,
    },

    /// Initialize Bento configuration
    Init {
        /// Output directory for configuration
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },
}
