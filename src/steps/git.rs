//! Type-safe arguments for git invocations.
//!
//! This module provides typed argument structs for the source-fetch step:
//! - `GitCloneArgs` for the clone itself
//! - `GitCheckoutArgs` for detaching onto a pinned revision
//!
//! plus the checkout-directory naming rule and the occupancy check that makes
//! a re-run fail loudly instead of cloning into an existing checkout.

use std::path::{Path, PathBuf};

use crate::step_traits::StepArgs;

/// Derive the checkout directory name from a repository URL.
///
/// Mirrors how git names a clone destination when none is given: trailing
/// slashes are dropped, a `.git` suffix is dropped, and the last path segment
/// (after `/`, or after `:` for scp-style URLs) is the name.
///
/// Returns `None` when no usable name remains (e.g., a bare host).
///
/// # Examples
///
/// ```
/// use labstrap::steps::git::repo_dir_name;
///
/// assert_eq!(
///     repo_dir_name("https://github.com/geo-fluid-dynamics/phaseflow-fenics.git"),
///     Some("phaseflow-fenics".to_string())
/// );
/// assert_eq!(
///     repo_dir_name("git@github.com:geo-fluid-dynamics/phaseflow-fenics.git"),
///     Some("phaseflow-fenics".to_string())
/// );
/// ```
pub fn repo_dir_name(url: &str) -> Option<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let without_suffix = trimmed.strip_suffix(".git").unwrap_or(trimmed);
    let without_suffix = without_suffix.trim_end_matches('/');

    let name = without_suffix
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(without_suffix);

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Check whether a clone destination is already occupied.
///
/// Git accepts an existing *empty* directory as a clone target, so only a
/// file or a non-empty directory counts as occupied. A missing path is free.
pub fn clone_dest_occupied(dest: &Path) -> std::io::Result<bool> {
    let metadata = match std::fs::metadata(dest) {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };

    if metadata.is_file() {
        return Ok(true);
    }

    let mut entries = std::fs::read_dir(dest)?;
    Ok(entries.next().is_some())
}

/// Type-safe arguments for `git clone`.
///
/// # Field to Arg Mapping
///
/// | Rust Field | CLI Arg        | Notes |
/// |------------|----------------|-------|
/// | `url`      | second arg     | Repository URL, passed through untouched |
/// | `dest`     | third arg      | Explicit destination so the checkout name never depends on git's guess |
///
/// # Environment Contract
///
/// Sets `GIT_TERMINAL_PROMPT=0`: the provisioner is headless, so a repository
/// that would ask for credentials must fail instead of hanging.
#[derive(Debug, Clone)]
pub struct GitCloneArgs {
    /// Repository URL (http, https, git, ssh, or scp-style).
    pub url: String,

    /// Destination directory for the checkout.
    ///
    /// # CLI Mapping
    ///
    /// Passed explicitly as the clone target; computed from the URL via
    /// `repo_dir_name` under the working directory.
    pub dest: PathBuf,
}

impl StepArgs for GitCloneArgs {
    fn program(&self) -> String {
        "git".to_string()
    }

    /// Convert to CLI arguments for git.
    ///
    /// # Output Format
    ///
    /// `["clone", "<url>", "<dest>"]`
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "clone".to_string(),
            self.url.clone(),
            self.dest.display().to_string(),
        ]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![("GIT_TERMINAL_PROMPT".to_string(), "0".to_string())]
    }
}

/// Type-safe arguments for `git checkout --detach` inside a fresh clone.
///
/// Only emitted for pinned revisions; a recipe tracking `HEAD` stays on
/// whatever the clone produced.
///
/// # Field to Arg Mapping
///
/// | Rust Field | CLI Arg       | Notes |
/// |------------|---------------|-------|
/// | `dest`     | (working dir) | The checkout the command runs inside |
/// | `rev`      | third arg     | Tag, branch, or commit hash |
#[derive(Debug, Clone)]
pub struct GitCheckoutArgs {
    /// The clone to operate on; becomes the command's working directory.
    pub dest: PathBuf,

    /// Revision to detach onto.
    ///
    /// # CLI Mapping
    ///
    /// Passed after `--detach`; `--detach` keeps branch names from creating
    /// a tracking branch, so tags, branches, and hashes behave alike.
    pub rev: String,
}

impl StepArgs for GitCheckoutArgs {
    fn program(&self) -> String {
        "git".to_string()
    }

    /// Convert to CLI arguments for git.
    ///
    /// # Output Format
    ///
    /// `["checkout", "--detach", "<rev>"]`
    fn to_cli_args(&self) -> Vec<String> {
        vec![
            "checkout".to_string(),
            "--detach".to_string(),
            self.rev.clone(),
        ]
    }

    fn get_env_vars(&self) -> Vec<(String, String)> {
        vec![]
    }

    fn working_dir(&self) -> Option<PathBuf> {
        Some(self.dest.clone())
    }
}
