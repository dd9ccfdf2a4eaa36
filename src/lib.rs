//! labstrap Library
//!
//! This library provides the core functionality for the recipe-driven
//! environment provisioner: recipe parsing, base environment resolution,
//! step planning, and the fail-fast provisioning pipeline.

pub mod base;
pub mod cli;
pub mod error;
pub mod host;
pub mod plan;
pub mod process_guard;
pub mod provisioner;
pub mod recipe;
pub mod runner;
pub mod state;
pub mod step_traits;
pub mod steps;
pub mod types;

// Re-export main types for convenience
pub use error::LabstrapError;
pub use process_guard::{ChildRegistry, CommandProcessGroup, ProcessGuard};
pub use recipe::{PackageSpec, Recipe, SourceSpec};
pub use runner::{run_command_safe, CommandOutput};
pub use state::{PhaseTransitionError, ProvisionContext, ProvisionPhase};
pub use step_traits::{disable_dry_run, enable_dry_run, is_dry_run, PlannedCommand, StepArgs};
pub use steps::git::{repo_dir_name, GitCheckoutArgs, GitCloneArgs};
pub use steps::pip::{PipInstallArgs, PipTarget};
pub use types::{InstallScope, PackagePin, SourceRev};

// Host detection
pub use host::{HostInfo, NetworkState};

// Base resolution and step planning
pub use base::{BaseError, BaseRef, ResolvedBase};
pub use plan::{plan_provision, PlannedStep, ProvisionPlan, StepKind};

// Pipeline driver
pub use provisioner::{
    ProcessExecutor, ProvisionError, ProvisionReport, Provisioner, StepExecutor,
};
