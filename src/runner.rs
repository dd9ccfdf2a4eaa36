//! Command execution for provisioning steps.
//!
//! This module provides the ONLY sanctioned way to run the external tools
//! (the base interpreter's `pip`, `git`). All spawning MUST go through
//! `run_command_safe` to ensure:
//!
//! - Process group isolation (death pact compliance)
//! - Proper PID registration for cleanup
//! - The global dry-run gate is honored
//!
//! # Architecture Rule
//!
//! `run_command_safe` is the execution gatekeeper. Building a raw
//! `Command` for a provisioning tool anywhere else violates the architecture.

use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use crate::step_traits::{is_dry_run, PlannedCommand};
use anyhow::{Context, Result};
use std::process::{Command, Stdio};
use tracing::info;

/// Execute one planned command and capture its output.
///
/// # Death Pact Compliance
///
/// - Spawns the child in a new process group via `.in_new_process_group()`
/// - Registers the child PID with `ChildRegistry::global()`
/// - Ensures cleanup if the parent process exits
///
/// # Dry-run
///
/// When the global dry-run flag is set, the command is logged and a
/// successful `CommandOutput` is returned without spawning anything.
///
/// # Returns
///
/// - `Ok(output)` - Child ran to completion (exit status may still be nonzero)
/// - `Err` - Tool not found, spawn failed, or waiting on the child failed
///
/// # Example
///
/// ```ignore
/// use labstrap::runner::run_command_safe;
/// use labstrap::step_traits::StepArgs;
/// use labstrap::steps::git::GitCloneArgs;
///
/// let args = GitCloneArgs {
///     url: "https://github.com/geo-fluid-dynamics/phaseflow-fenics".to_string(),
///     dest: PathBuf::from("/work/phaseflow-fenics"),
/// };
///
/// run_command_safe(&args.to_command())?.ensure_success("git clone")?;
/// ```
pub fn run_command_safe(command: &PlannedCommand) -> Result<CommandOutput> {
    // Log exact command, environment, and working directory for transparency
    info!(
        "run_command_safe: {} env={:?} cwd={:?}",
        command.command_line(),
        command.env,
        command.cwd
    );

    if is_dry_run() {
        info!("DRY RUN: skipped executing {}", command.command_line());
        return Ok(CommandOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
            dry_run: true,
        });
    }

    // Build command with process group isolation
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .in_new_process_group(); // CRITICAL: Enables death pact

    // Inject environment variables from the typed args
    for (key, value) in &command.env {
        cmd.env(key, value);
    }

    if let Some(cwd) = &command.cwd {
        cmd.current_dir(cwd);
    }

    // Spawn and register with global registry
    let child = cmd
        .spawn()
        .with_context(|| format!("Failed to spawn command: {}", command.program))?;
    let pid = child.id();

    // Register PID for cleanup on parent exit
    {
        let registry = ChildRegistry::global();
        // Lock is held briefly, panic is acceptable if poisoned
        let mut guard = registry.lock().expect("ChildRegistry mutex poisoned");
        guard.register(pid);
    }

    // Wait for completion
    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed waiting for command: {}", command.program))?;

    // Unregister PID after completion
    {
        let registry = ChildRegistry::global();
        let mut guard = registry.lock().expect("ChildRegistry mutex poisoned");
        guard.unregister(pid);
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code();

    if output.status.success() {
        info!("Command {} finished successfully", command.program);
    } else {
        info!(
            "Command {} failed with exit code {}",
            command.program,
            exit_code.unwrap_or(-1)
        );
    }

    Ok(CommandOutput {
        stdout,
        stderr,
        exit_code,
        success: output.status.success(),
        dry_run: false,
    })
}

/// Output from one command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output from the child.
    pub stdout: String,
    /// Standard error from the child.
    pub stderr: String,
    /// Exit code (None if terminated by signal).
    pub exit_code: Option<i32>,
    /// Whether the child exited successfully (exit code 0).
    pub success: bool,
    /// Whether the command was skipped by the dry-run gate.
    pub dry_run: bool,
}

impl CommandOutput {
    /// Check that the command succeeded and return an error if not.
    pub fn ensure_success(&self, context: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            let code = self.exit_code.unwrap_or(-1);
            anyhow::bail!(
                "{} failed (exit code {}): {}",
                context,
                code,
                self.stderr.trim()
            )
        }
    }
}
