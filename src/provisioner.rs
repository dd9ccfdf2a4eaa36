//! Provisioning pipeline orchestration.
//!
//! Drives the four-step pipeline to completion or first failure:
//!
//! 1. Resolve the base environment reference (pure lookup, spawns nothing)
//! 2. Install the auxiliary packages from the index
//! 3. Clone the source repository (and check out a pinned rev)
//! 4. Install the fetched package from inside the checkout
//!
//! Strictly sequential and fail-fast: each step must succeed before the next
//! starts, the first failure aborts the run, and nothing is retried or rolled
//! back. Effects of completed steps persist, so a failed run leaves a partial
//! environment behind.
//!
//! Steps 2-4 go through an injected [`StepExecutor`], which is how the
//! pipeline is tested without spawning `pip` or `git`.

use crate::base::{self, BaseError};
use crate::host::{HostInfo, NetworkState};
use crate::plan::{plan_provision, PlannedStep, ProvisionPlan, StepKind};
use crate::recipe::Recipe;
use crate::runner::run_command_safe;
use crate::state::ProvisionContext;
use crate::steps::git::clone_dest_occupied;
use crate::types::InstallScope;
use anyhow::Result;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

/// Errors from a provisioning run, grouped by the step that failed.
///
/// Steps 2 and 4 share the `PackageInstall` variant: both are installs, and
/// `step` records which one died.
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Step 1 failed: the base reference did not resolve to an environment.
    #[error("Base resolution failed: {0}")]
    BaseResolution(#[from] BaseError),

    /// Step 2 or 4 failed: an install did not complete.
    #[error("Package install failed ({}): {cause}", .step)]
    PackageInstall { step: StepKind, cause: String },

    /// Step 3 failed: the source checkout could not be produced.
    #[error("Source fetch failed: {cause}")]
    SourceFetch { cause: String },
}

impl ProvisionError {
    /// The pipeline step this error belongs to.
    pub fn step(&self) -> StepKind {
        match self {
            Self::BaseResolution(_) => StepKind::SelectBase,
            Self::PackageInstall { step, .. } => *step,
            Self::SourceFetch { .. } => StepKind::FetchSource,
        }
    }
}

/// Execution seam for the command-running steps (2-4).
///
/// The production implementation spawns real child processes through the
/// runner; tests substitute a recording mock to observe ordering and
/// short-circuiting without touching `pip` or `git`.
pub trait StepExecutor {
    /// Run every command of one planned step, failing on the first error.
    fn run_step(&mut self, step: &PlannedStep) -> Result<()>;
}

/// Executor backed by real child processes via `run_command_safe`.
#[derive(Debug, Default)]
pub struct ProcessExecutor;

impl StepExecutor for ProcessExecutor {
    fn run_step(&mut self, step: &PlannedStep) -> Result<()> {
        for command in &step.commands {
            let output = run_command_safe(command)?;
            output.ensure_success(step.kind.description())?;
        }
        Ok(())
    }
}

/// Summary of a successful provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    /// The resolved base environment (step 1 outcome).
    pub base: crate::base::ResolvedBase,
    /// Where the source checkout was placed (step 3 outcome).
    pub checkout_dir: PathBuf,
    /// Requirement specs installed in step 2.
    pub aux_requirements: Vec<String>,
    /// Install scope shared by steps 2 and 4.
    pub scope: InstallScope,
}

/// Drives one provisioning run over a recipe.
pub struct Provisioner<E: StepExecutor> {
    recipe: Recipe,
    workdir: PathBuf,
    base_roots: Vec<PathBuf>,
    executor: E,
    context: ProvisionContext,
}

impl Provisioner<ProcessExecutor> {
    /// Provisioner with the real process-spawning executor.
    pub fn new(recipe: Recipe, workdir: PathBuf, base_roots: Vec<PathBuf>) -> Self {
        Self::with_executor(recipe, workdir, base_roots, ProcessExecutor)
    }

    /// Provisioner with the real executor, seeded with detected host facts.
    pub fn with_host(
        recipe: Recipe,
        workdir: PathBuf,
        base_roots: Vec<PathBuf>,
        host: &HostInfo,
    ) -> Self {
        let mut provisioner = Self::new(recipe, workdir, base_roots);
        provisioner.context = ProvisionContext::with_host(host);
        provisioner
    }
}

impl<E: StepExecutor> Provisioner<E> {
    /// Provisioner over a custom executor (used by tests).
    pub fn with_executor(
        recipe: Recipe,
        workdir: PathBuf,
        base_roots: Vec<PathBuf>,
        executor: E,
    ) -> Self {
        Self {
            recipe,
            workdir,
            base_roots,
            executor,
            context: ProvisionContext::new(),
        }
    }

    /// Read access to the phase context (progress, failure position).
    pub fn context(&self) -> &ProvisionContext {
        &self.context
    }

    /// Run the pipeline: steps 1-4, in order, fail-fast.
    ///
    /// The recipe is expected to have passed `Recipe::validate` first; a
    /// recipe that cannot produce a plan surfaces as a step-2 error.
    ///
    /// Re-running against a working directory that already holds a non-empty
    /// checkout fails at step 3 with a "checkout path already exists" error,
    /// after step 2 has installed its packages again. This non-idempotence is
    /// deliberate: the checkout is created exactly once and never updated.
    ///
    /// Under the global dry-run flag, step 1 still resolves and the checkout
    /// guard still runs (both are read-only); only the child processes of
    /// steps 2-4 are skipped.
    ///
    /// # Errors
    ///
    /// One [`ProvisionError`] naming the failing step. Effects of steps that
    /// completed before the failure remain in place.
    pub fn provision(&mut self) -> Result<ProvisionReport, ProvisionError> {
        self.context.reset();

        if self.context.network_state() == NetworkState::Offline {
            tracing::warn!(
                "Package index looks unreachable; install steps may fail once they hit the network"
            );
        }

        info!(
            "Provisioning base '{}' into {}",
            self.recipe.base,
            self.workdir.display()
        );

        // Step 1: resolve the base environment
        let base = match base::resolve(&self.recipe.base, &self.base_roots) {
            Ok(base) => base,
            Err(e) => {
                self.record_failure();
                return Err(ProvisionError::BaseResolution(e));
            }
        };
        self.advance_phase();
        info!(
            "Step 1/4 complete: base {} at {}",
            base.reference,
            base.prefix.display()
        );

        // Materialize the commands for steps 2-4. Only reachable with an
        // unvalidated recipe; attributed to step 2, the first consumer.
        let plan = match plan_provision(&self.recipe, &base, &self.workdir) {
            Ok(plan) => plan,
            Err(e) => {
                self.record_failure();
                return Err(ProvisionError::PackageInstall {
                    step: StepKind::InstallAux,
                    cause: format!("{:#}", e),
                });
            }
        };

        for step in &plan.steps {
            self.run_one_step(step, &plan)?;
            let phase = self.advance_phase();
            info!(
                "Step {}/4 complete: {}",
                step.kind.index(),
                phase.description()
            );
        }

        let report = ProvisionReport {
            base: plan.base.clone(),
            checkout_dir: plan.checkout_dir.clone(),
            aux_requirements: self
                .recipe
                .packages
                .iter()
                .map(|p| p.requirement())
                .collect(),
            scope: self.recipe.scope,
        };
        info!(
            "Provisioning complete: checkout at {}, installs in {} scope",
            report.checkout_dir.display(),
            report.scope
        );
        Ok(report)
    }

    /// Run one planned step, mapping failures into the step's error variant.
    fn run_one_step(&mut self, step: &PlannedStep, plan: &ProvisionPlan) -> Result<(), ProvisionError> {
        // The checkout is created exactly once: a pre-existing non-empty
        // destination fails deterministically before git is spawned. An
        // existing empty directory is left to git, which accepts it.
        if step.kind == StepKind::FetchSource {
            match clone_dest_occupied(&plan.checkout_dir) {
                Ok(false) => {}
                Ok(true) => {
                    self.record_failure();
                    return Err(ProvisionError::SourceFetch {
                        cause: format!(
                            "checkout path already exists: {} (remove it or provision into a fresh working directory)",
                            plan.checkout_dir.display()
                        ),
                    });
                }
                Err(e) => {
                    self.record_failure();
                    return Err(ProvisionError::SourceFetch {
                        cause: format!(
                            "cannot inspect checkout path {}: {}",
                            plan.checkout_dir.display(),
                            e
                        ),
                    });
                }
            }
        }

        if let Err(e) = self.executor.run_step(step) {
            self.record_failure();
            let cause = format!("{:#}", e);
            return Err(match step.kind {
                StepKind::FetchSource => ProvisionError::SourceFetch { cause },
                kind => ProvisionError::PackageInstall { step: kind, cause },
            });
        }
        Ok(())
    }

    fn advance_phase(&mut self) -> crate::state::ProvisionPhase {
        // SAFETY: provision() only advances while the run is in flight
        self.context
            .advance()
            .expect("INTERNAL ERROR: pipeline advanced from a terminal phase - this is a bug")
    }

    fn record_failure(&mut self) {
        // SAFETY: failures are only recorded while the run is in flight
        self.context
            .fail()
            .expect("INTERNAL ERROR: failure recorded in a terminal phase - this is a bug")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_step_mapping() {
        let base = ProvisionError::BaseResolution(BaseError::InvalidReference("??".to_string()));
        assert_eq!(base.step(), StepKind::SelectBase);

        let aux = ProvisionError::PackageInstall {
            step: StepKind::InstallAux,
            cause: "exit code 1".to_string(),
        };
        assert_eq!(aux.step(), StepKind::InstallAux);

        let fetch = ProvisionError::SourceFetch {
            cause: "could not resolve host".to_string(),
        };
        assert_eq!(fetch.step(), StepKind::FetchSource);

        let package = ProvisionError::PackageInstall {
            step: StepKind::InstallPackage,
            cause: "exit code 2".to_string(),
        };
        assert_eq!(package.step(), StepKind::InstallPackage);
    }

    #[test]
    fn test_error_display_names_taxonomy() {
        let err = ProvisionError::PackageInstall {
            step: StepKind::InstallPackage,
            cause: "no setup.py found".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Package install failed"));
        assert!(msg.contains("install fetched package"));
        assert!(msg.contains("no setup.py found"));

        let err = ProvisionError::SourceFetch {
            cause: "checkout path already exists: /work/repo".to_string(),
        };
        assert!(err.to_string().contains("Source fetch failed"));
    }
}
