//! Type-safe arguments for pip invocations.
//!
//! This module provides the typed argument struct for both pip-driven steps:
//! the auxiliary package install (from the index) and the final package
//! install (from the fetched source checkout).
//!
//! # Why This Exists
//!
//! Both installs must run through the selected base environment's interpreter
//! (`<prefix>/bin/python3 -m pip`), not whatever `pip` is first on `PATH`, and
//! both must land in the same scope. Encoding that in one struct makes the
//! invariant unskippable.

use std::path::PathBuf;

use crate::step_traits::StepArgs;
use crate::types::InstallScope;

/// What a pip invocation installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipTarget {
    /// Requirement specs resolved against the package index
    /// (e.g., `["h5py==3.7.0"]`).
    Requirements(Vec<String>),

    /// The package rooted at this source checkout.
    ///
    /// The invocation runs from inside the checkout and installs `.`,
    /// so the checkout directory becomes the command's working directory.
    Checkout(PathBuf),
}

/// Type-safe arguments for a `pip install` step.
///
/// # Field to Flag Mapping
///
/// | Rust Field | CLI Flag / Arg            | Notes |
/// |------------|---------------------------|-------|
/// | `python`   | (program)                 | The base environment's interpreter; pip runs as `-m pip` |
/// | `scope`    | `--user` or nothing       | One scope for the whole recipe |
/// | `target`   | requirement specs or `.`  | `.` implies the checkout as working directory |
///
/// # Environment Contract
///
/// Every invocation sets `PIP_DISABLE_PIP_VERSION_CHECK=1` and
/// `PIP_NO_INPUT=1`: the provisioner is headless and must never block on a
/// prompt or spend time on self-update advice.
///
/// # Example
///
/// ```
/// use std::path::PathBuf;
/// use labstrap::steps::pip::{PipInstallArgs, PipTarget};
/// use labstrap::step_traits::StepArgs;
/// use labstrap::types::InstallScope;
///
/// let args = PipInstallArgs {
///     python: PathBuf::from("/opt/labstrap/bases/fenics-stable/bin/python3"),
///     scope: InstallScope::User,
///     target: PipTarget::Requirements(vec!["h5py==3.7.0".to_string()]),
/// };
///
/// assert_eq!(args.to_cli_args(), vec!["-m", "pip", "install", "--user", "h5py==3.7.0"]);
/// ```
#[derive(Debug, Clone)]
pub struct PipInstallArgs {
    /// Interpreter of the selected base environment.
    ///
    /// # CLI Mapping
    ///
    /// Used as the program itself; pip is always invoked as `-m pip` so the
    /// install targets this interpreter's site-packages.
    pub python: PathBuf,

    /// Installation scope.
    ///
    /// # CLI Mapping
    ///
    /// `User` maps to `--user`; `System` adds no flag.
    pub scope: InstallScope,

    /// What to install: index requirements or the source checkout.
    pub target: PipTarget,
}

impl StepArgs for PipInstallArgs {
    fn program(&self) -> String {
        self.python.display().to_string()
    }

    /// Convert to CLI arguments for the interpreter.
    ///
    /// # Output Format
    ///
    /// - Requirements: `["-m", "pip", "install", "--user", "<spec>", ...]`
    /// - Checkout: `["-m", "pip", "install", "--user", "."]`
    fn to_cli_args(&self) -> Vec<String> {
        let mut args = vec![
            "-m".to_string(),
            "pip".to_string(),
            "install".to_string(),
        ];

        if let Some(flag) = self.scope.pip_flag() {
            args.push(flag.to_string());
        }

        match &self.target {
            PipTarget::Requirements(specs) => {
                args.extend(specs.iter().cloned());
            }
            PipTarget::Checkout(_) => {
                // The checkout directory travels as working_dir(), not as an
                // argument, so the install runs from inside the checkout.
                args.push(".".to_string());
            }
        }

        args
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![
            ("PIP_DISABLE_PIP_VERSION_CHECK".to_string(), "1".to_string()),
            ("PIP_NO_INPUT".to_string(), "1".to_string()),
        ]
    }

    fn working_dir(&self) -> Option<PathBuf> {
        match &self.target {
            PipTarget::Requirements(_) => None,
            PipTarget::Checkout(dir) => Some(dir.clone()),
        }
    }
}
