//! Provision plan generation.
//!
//! Translates a validated `Recipe` plus a resolved base environment into the
//! ordered command sequence the runner executes. Step 1 (base selection) is
//! pure resolution and spawns nothing; the plan materializes steps 2-4.
//!
//! # Generated Commands
//!
//! | Step | Commands |
//! |------|----------|
//! | 2 InstallAux | `<python> -m pip install [--user] <spec>...` (one invocation for all specs) |
//! | 3 FetchSource | `git clone <url> <dest>`, then `git checkout --detach <rev>` when pinned |
//! | 4 InstallPackage | `<python> -m pip install [--user] .` with the checkout as working directory |
//!
//! # Design
//!
//! - **Pure logic**: no I/O, no side effects, only generates the plan
//! - **Typed output**: each command comes from a `StepArgs` struct
//! - **Testable**: recipe → plan assertions without touching pip or git

use crate::base::ResolvedBase;
use crate::recipe::Recipe;
use crate::step_traits::{PlannedCommand, StepArgs};
use crate::steps::git::{repo_dir_name, GitCheckoutArgs, GitCloneArgs};
use crate::steps::pip::{PipInstallArgs, PipTarget};
use crate::types::SourceRev;
use anyhow::{bail, Result};
use std::fmt;
use std::path::{Path, PathBuf};

// ============================================================================
// Step Identity
// ============================================================================

/// Identifies one of the four provisioning steps.
///
/// The pipeline is strictly ordered; `index()` gives the 1-based position
/// used in progress output and failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    /// Step 1: resolve the base environment reference.
    SelectBase,
    /// Step 2: install the auxiliary packages from the index.
    InstallAux,
    /// Step 3: clone the source repository (and check out a pinned rev).
    FetchSource,
    /// Step 4: install the fetched package from the checkout root.
    InstallPackage,
}

impl StepKind {
    /// 1-based position of this step in the pipeline.
    pub fn index(&self) -> u8 {
        match self {
            Self::SelectBase => 1,
            Self::InstallAux => 2,
            Self::FetchSource => 3,
            Self::InstallPackage => 4,
        }
    }

    /// Human-readable step name for reports and summaries.
    pub fn description(&self) -> &'static str {
        match self {
            Self::SelectBase => "select base environment",
            Self::InstallAux => "install auxiliary packages",
            Self::FetchSource => "fetch source checkout",
            Self::InstallPackage => "install fetched package",
        }
    }

    /// All steps in pipeline order.
    pub fn all_steps() -> Vec<StepKind> {
        vec![
            Self::SelectBase,
            Self::InstallAux,
            Self::FetchSource,
            Self::InstallPackage,
        ]
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

// ============================================================================
// Plan Types
// ============================================================================

/// One provisioning step together with the commands that realize it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub kind: StepKind,
    /// Commands in execution order; all must succeed for the step to succeed.
    pub commands: Vec<PlannedCommand>,
}

/// A complete provision plan: the resolved base plus the commands for
/// steps 2-4, in pipeline order.
#[derive(Debug, Clone)]
pub struct ProvisionPlan {
    /// Outcome of step 1.
    pub base: ResolvedBase,
    /// Where step 3 will place the checkout and step 4 will run from.
    pub checkout_dir: PathBuf,
    /// Steps 2-4 in order.
    pub steps: Vec<PlannedStep>,
}

impl ProvisionPlan {
    /// Returns a summary of the plan for logging/display.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Provision plan: base {}", self.base.reference),
            format!("  Interpreter: {}", self.base.python.display()),
            format!("  Checkout: {}", self.checkout_dir.display()),
            format!("  Steps ({}):", self.steps.len()),
        ];
        for step in &self.steps {
            lines.push(format!("    {}. {}", step.kind.index(), step.kind));
            for command in &step.commands {
                lines.push(format!("       $ {}", command.command_line()));
            }
        }
        lines.join("\n")
    }
}

// ============================================================================
// Plan Calculation
// ============================================================================

/// Calculate the command plan for a recipe against a resolved base.
///
/// # Errors
///
/// Returns an error if:
/// - The recipe has no auxiliary packages (step 2 would install nothing)
/// - No checkout directory name can be derived from the source URL
///
/// Both are normally caught by `Recipe::validate` first; the checks here keep
/// the generator total over arbitrary recipes.
pub fn plan_provision(
    recipe: &Recipe,
    base: &ResolvedBase,
    workdir: &Path,
) -> Result<ProvisionPlan> {
    if recipe.packages.is_empty() {
        bail!("Recipe has no auxiliary packages");
    }

    let url = recipe.source.url.trim();
    let repo_name = match repo_dir_name(url) {
        Some(name) => name,
        None => bail!("Cannot derive a checkout directory name from source URL '{}'", url),
    };
    let checkout_dir = workdir.join(repo_name);

    let mut steps = Vec::new();

    // Step 2: one pip invocation covering every auxiliary requirement
    let requirements: Vec<String> = recipe.packages.iter().map(|p| p.requirement()).collect();
    let aux = PipInstallArgs {
        python: base.python.clone(),
        scope: recipe.scope,
        target: PipTarget::Requirements(requirements),
    };
    steps.push(PlannedStep {
        kind: StepKind::InstallAux,
        commands: vec![aux.to_command()],
    });

    // Step 3: clone, plus a detached checkout when the rev is pinned
    let clone = GitCloneArgs {
        url: url.to_string(),
        dest: checkout_dir.clone(),
    };
    let mut fetch_commands = vec![clone.to_command()];
    if let SourceRev::Pinned(rev) = &recipe.source.rev {
        let checkout = GitCheckoutArgs {
            dest: checkout_dir.clone(),
            rev: rev.clone(),
        };
        fetch_commands.push(checkout.to_command());
    }
    steps.push(PlannedStep {
        kind: StepKind::FetchSource,
        commands: fetch_commands,
    });

    // Step 4: install the fetched package from inside the checkout
    let package = PipInstallArgs {
        python: base.python.clone(),
        scope: recipe.scope,
        target: PipTarget::Checkout(checkout_dir.clone()),
    };
    steps.push(PlannedStep {
        kind: StepKind::InstallPackage,
        commands: vec![package.to_command()],
    });

    Ok(ProvisionPlan {
        base: base.clone(),
        checkout_dir,
        steps,
    })
}

// ============================================================================
// Tests
// ============================================================================
