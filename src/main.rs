//! labstrap - Main entry point
//!
//! Thin binary over the labstrap library: initialize logging and signal
//! handling, parse arguments, dispatch the requested subcommand.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use labstrap::base;
use labstrap::cli::{Cli, Commands};
use labstrap::host::{self, HostInfo};
use labstrap::plan::plan_provision;
use labstrap::process_guard::{self, ProcessGuard};
use labstrap::provisioner::Provisioner;
use labstrap::recipe::Recipe;

/// Initialize the tracing subscriber with appropriate settings
fn init_logger() {
    use tracing_subscriber::EnvFilter;

    // Default to info; RUST_LOG overrides
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Main application entry point
fn main() -> anyhow::Result<()> {
    // Initialize logging first
    init_logger();
    info!("labstrap starting up");

    // Initialize signal handlers for graceful child process cleanup
    // This ensures pip and git are terminated if we receive SIGINT/SIGTERM
    if let Err(e) = process_guard::init_signal_handlers() {
        tracing::warn!("Failed to initialize signal handlers: {}", e);
        // Continue anyway - cleanup will still work via Drop
    }
    debug!("Signal handlers initialized");

    // Terminates any still-registered children when main returns
    let _guard = ProcessGuard::new();

    let cli = Cli::parse_args();
    debug!("CLI arguments parsed");

    if cli.dry_run {
        labstrap::step_traits::enable_dry_run();
        info!("Dry-run mode enabled: commands that mutate the environment are skipped");
    }

    match cli.command {
        Commands::Validate { recipe } => {
            info!("Validating recipe file: {:?}", recipe);
            let _ = load_and_validate_recipe(&recipe);
            info!("Recipe validation successful");
            println!("✓ Recipe file is valid: {:?}", recipe);
        }
        Commands::Plan {
            recipe,
            workdir,
            base_root,
        } => {
            let parsed = load_and_validate_recipe(&recipe);
            let workdir = resolve_workdir(workdir);

            match base::resolve(&parsed.base, &base_root) {
                Ok(resolved) => match plan_provision(&parsed, &resolved, &workdir) {
                    Ok(plan) => println!("{}", plan.summary()),
                    Err(e) => {
                        error!("Planning failed: {:#}", e);
                        eprintln!("✗ Planning failed: {:#}", e);
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    error!("Base resolution failed: {}", e);
                    eprintln!("✗ Base resolution failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Provision {
            recipe,
            workdir,
            base_root,
        } => {
            info!("Provisioning from recipe: {:?}", recipe);
            let parsed = load_and_validate_recipe(&recipe);
            let workdir = resolve_workdir(workdir);

            // Fail before step 1 if git is missing, not in the middle of a run
            host::run_preflight_checks();
            let host_info = HostInfo::detect();

            let mut provisioner = Provisioner::with_host(parsed, workdir, base_root, &host_info);
            match provisioner.provision() {
                Ok(report) => {
                    println!("✓ Environment provisioned");
                    println!(
                        "  Base:     {} ({})",
                        report.base.reference,
                        report.base.prefix.display()
                    );
                    println!("  Packages: {}", report.aux_requirements.join(", "));
                    println!("  Checkout: {}", report.checkout_dir.display());
                    println!("  Scope:    {}", report.scope);
                }
                Err(e) => {
                    let step = e.step();
                    error!("Provisioning failed at step {}: {}", step.index(), e);
                    eprintln!(
                        "✗ Provisioning failed at step {} ({}): {}",
                        step.index(),
                        step,
                        e
                    );
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

/// Load a recipe from disk and validate it, exiting with a message on failure.
fn load_and_validate_recipe(path: &Path) -> Recipe {
    let recipe = match Recipe::load_from_file(path) {
        Ok(recipe) => recipe,
        Err(e) => {
            error!("Failed to load recipe file: {:#}", e);
            eprintln!("✗ Failed to load recipe file: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = recipe.validate() {
        error!("Recipe validation failed: {:#}", e);
        eprintln!("✗ Recipe validation failed: {:#}", e);
        std::process::exit(1);
    }

    recipe
}

/// Working directory for the source checkout, defaulting to the current directory.
fn resolve_workdir(workdir: Option<PathBuf>) -> PathBuf {
    match workdir {
        Some(dir) => dir,
        None => std::env::current_dir().unwrap_or_else(|e| {
            eprintln!("✗ Cannot determine current directory: {}", e);
            std::process::exit(1);
        }),
    }
}
