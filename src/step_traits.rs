//! Type-safe step command contracts.
//!
//! This module provides the `StepArgs` trait for ensuring compile-time correctness
//! of provisioning commands. Instead of raw string vectors, Rust structs implement
//! this trait to produce validated CLI arguments, environment variables, and
//! working directories for the external tools (`pip`, `git`).
//!
//! # Design Goals
//!
//! 1. **Compile-Time Safety**: Argument mismatches (e.g., `--user` vs `--target`)
//!    are caught at compile time, not runtime.
//! 2. **Single Source of Truth**: The struct definition IS the contract.
//! 3. **Explicit Working Directories**: Commands that must run inside the source
//!    checkout carry that directory with them; the provisioner process never
//!    changes its own working directory.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Global dry-run flag.
///
/// When enabled, the runner logs each command instead of spawning it.
/// Owned here so every step type and the runner share one switch.
static DRY_RUN: AtomicBool = AtomicBool::new(false);

/// Enable dry-run mode (commands are logged, not executed).
pub fn enable_dry_run() {
    DRY_RUN.store(true, Ordering::SeqCst);
}

/// Disable dry-run mode.
pub fn disable_dry_run() {
    DRY_RUN.store(false, Ordering::SeqCst);
}

/// Returns true if dry-run mode is enabled.
pub fn is_dry_run() -> bool {
    DRY_RUN.load(Ordering::SeqCst)
}

/// Trait for typed step command arguments.
///
/// Implementors define the mapping between Rust struct fields and the flags,
/// environment variables, and working directory of one external tool
/// invocation. This ensures the compiler catches flag mismatches.
///
/// # Contract
///
/// - `program()`: Returns the executable to invoke (e.g., `git`).
/// - `to_cli_args()`: Returns CLI arguments exactly as the tool expects them.
/// - `get_env_vars()`: Returns environment variables for the invocation.
/// - `working_dir()`: Returns the directory the command must run in, if any.
///
/// # Invariants
///
/// - The returned CLI args MUST match the external tool's argument parser.
/// - Commands with no `working_dir()` inherit the provisioner's directory
///   and must not depend on it.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use labstrap::steps::git::GitCloneArgs;
/// use labstrap::step_traits::StepArgs;
///
/// let args = GitCloneArgs {
///     url: "https://github.com/geo-fluid-dynamics/phaseflow-fenics".to_string(),
///     dest: PathBuf::from("/work/phaseflow-fenics"),
/// };
///
/// // Compiler enforces correct flag names
/// assert_eq!(args.program(), "git");
/// assert_eq!(
///     args.to_cli_args(),
///     vec!["clone", "https://github.com/geo-fluid-dynamics/phaseflow-fenics", "/work/phaseflow-fenics"]
/// );
/// ```
pub trait StepArgs {
    /// The executable to invoke.
    ///
    /// Either a bare name resolved via `PATH` (e.g., `git`) or an absolute
    /// path (e.g., the selected base environment's interpreter).
    fn program(&self) -> String;

    /// Convert struct fields to CLI arguments.
    ///
    /// Returns a vector of strings exactly as they should be passed to the tool.
    /// Example: `["clone", "<url>", "<dest>"]`
    fn to_cli_args(&self) -> Vec<String>;

    /// Get required environment variables.
    ///
    /// Returns key-value pairs for environment variables the invocation requires.
    /// Example: `[("PIP_NO_INPUT", "1")]`
    fn get_env_vars(&self) -> Vec<(String, String)>;

    /// Get the working directory for the invocation, if it matters.
    ///
    /// Defaults to `None` (inherit the provisioner's directory).
    fn working_dir(&self) -> Option<PathBuf> {
        None
    }

    /// Materialize this invocation as a `PlannedCommand`.
    fn to_command(&self) -> PlannedCommand {
        PlannedCommand {
            program: self.program(),
            args: self.to_cli_args(),
            env: self.get_env_vars(),
            cwd: self.working_dir(),
        }
    }
}

/// One concrete external-tool invocation, fully materialized.
///
/// This is what the planner emits and the runner consumes. It carries
/// everything needed to spawn the process, so planning stays pure and
/// execution stays dumb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCommand {
    /// Executable name (resolved via `PATH`).
    pub program: String,
    /// Arguments in order.
    pub args: Vec<String>,
    /// Environment variables set on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Working directory, or None to inherit.
    pub cwd: Option<PathBuf>,
}

impl PlannedCommand {
    /// Render the invocation as a single shell-like line for logs and plans.
    ///
    /// This is a display form only; nothing parses it back.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

impl std::fmt::Display for PlannedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command_line())
    }
}
