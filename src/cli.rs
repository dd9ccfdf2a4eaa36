use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// labstrap - Recipe-driven provisioner for scientific Python environments
#[derive(Parser)]
#[command(name = "labstrap")]
#[command(about = "Provision reproducible simulation environments from recipe files")]
#[command(version)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Dry-run mode: show what would be executed without making changes.
    ///
    /// In this mode, commands that mutate the environment (pip, git) are
    /// skipped and logged. Base resolution and filesystem checks still
    /// run so the preview is realistic.
    #[arg(long, global = true)]
    pub dry_run: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Provision an environment from a recipe file
    Provision {
        /// Path to the recipe file describing the environment
        #[arg(short, long)]
        recipe: PathBuf,

        /// Directory the source checkout is cloned into (default: current directory)
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Extra directory to search for base environments (repeatable)
        #[arg(long)]
        base_root: Vec<PathBuf>,
    },
    /// Validate a recipe file
    Validate {
        /// Path to recipe file to validate
        recipe: PathBuf,
    },
    /// Resolve a recipe and print the commands it would run
    Plan {
        /// Path to the recipe file describing the environment
        #[arg(short, long)]
        recipe: PathBuf,

        /// Directory the source checkout would be cloned into (default: current directory)
        #[arg(short, long)]
        workdir: Option<PathBuf>,

        /// Extra directory to search for base environments (repeatable)
        #[arg(long)]
        base_root: Vec<PathBuf>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        <Self as clap::Parser>::parse()
    }
}
