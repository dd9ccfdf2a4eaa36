//! Base environment resolution (step 1)
//!
//! A base environment is an opaque on-disk prefix carrying the
//! scientific-computing stack (the PDE framework and its interpreter).
//! Recipes name one with a `name[:tag]` reference; resolution turns that
//! reference into a prefix directory and the interpreter inside it.
//!
//! Resolution checks only what the later steps need: the prefix exists and
//! carries `bin/python3` (or `bin/python`). What the base contains beyond
//! the interpreter is an assumed precondition, deliberately not verified.
//!
//! # On-disk layout
//!
//! ```text
//! <root>/<name>/<tag>/bin/python3
//! ```
//!
//! Roots are searched in order: any roots given on the command line first,
//! then the built-in default root.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default root directory for installed base environments.
pub const DEFAULT_BASE_ROOT: &str = "/opt/labstrap/bases";

/// Tag assumed when a reference omits one.
pub const DEFAULT_TAG: &str = "latest";

/// A parsed `name[:tag]` base reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRef {
    /// Base name (e.g., `fenics`).
    pub name: String,
    /// Tag (e.g., `stable`); defaults to `latest` when omitted.
    pub tag: String,
}

impl BaseRef {
    /// Parse a `name[:tag]` reference.
    ///
    /// Name and tag accept ASCII alphanumerics plus `.`, `_`, and `-`;
    /// anything else would not survive as a directory name.
    pub fn parse(reference: &str) -> Result<Self, BaseError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(BaseError::InvalidReference(reference.to_string()));
        }

        let (name, tag) = match trimmed.split_once(':') {
            None => (trimmed, DEFAULT_TAG),
            Some((name, tag)) => (name, tag),
        };

        if name.is_empty() || tag.is_empty() || tag.contains(':') {
            return Err(BaseError::InvalidReference(reference.to_string()));
        }

        let valid_part =
            |s: &str| s.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid_part(name) || !valid_part(tag) {
            return Err(BaseError::InvalidReference(reference.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Relative directory of this base under a base root.
    pub fn relative_dir(&self) -> PathBuf {
        Path::new(&self.name).join(&self.tag)
    }
}

impl std::fmt::Display for BaseRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.name, self.tag)
    }
}

/// A base reference resolved to its on-disk prefix and interpreter.
#[derive(Debug, Clone)]
pub struct ResolvedBase {
    /// The reference that was resolved.
    pub reference: BaseRef,
    /// Prefix directory of the base environment.
    pub prefix: PathBuf,
    /// Interpreter inside the prefix (`bin/python3`, falling back to `bin/python`).
    pub python: PathBuf,
}

/// Errors from base reference parsing and resolution.
#[derive(Error, Debug)]
pub enum BaseError {
    /// The reference string is not a valid `name[:tag]`.
    #[error("Invalid base reference '{0}' (expected name[:tag])")]
    InvalidReference(String),

    /// No searched root contains the referenced base.
    #[error("Base environment '{reference}' not found (searched {})", display_roots(.searched))]
    NotFound {
        reference: String,
        searched: Vec<PathBuf>,
    },

    /// The prefix exists but carries no usable interpreter.
    #[error("Base environment at {} has no bin/python3 or bin/python", .prefix.display())]
    NoInterpreter { prefix: PathBuf },
}

fn display_roots(roots: &[PathBuf]) -> String {
    roots
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Resolve a base reference against the search roots.
///
/// `extra_roots` are searched in order before the default root. The first
/// root containing the base's directory wins; a win with no interpreter is
/// an error, not a reason to keep searching.
pub fn resolve(reference: &str, extra_roots: &[PathBuf]) -> Result<ResolvedBase, BaseError> {
    let base_ref = BaseRef::parse(reference)?;

    let mut roots: Vec<PathBuf> = extra_roots.to_vec();
    roots.push(PathBuf::from(DEFAULT_BASE_ROOT));

    for root in &roots {
        let prefix = root.join(base_ref.relative_dir());
        tracing::debug!("Probing base candidate {}", prefix.display());

        if !prefix.is_dir() {
            continue;
        }

        let python = find_interpreter(&prefix)
            .ok_or_else(|| BaseError::NoInterpreter { prefix: prefix.clone() })?;

        tracing::info!(
            "Resolved base {} to {} (interpreter {})",
            base_ref,
            prefix.display(),
            python.display()
        );

        return Ok(ResolvedBase {
            reference: base_ref,
            prefix,
            python,
        });
    }

    Err(BaseError::NotFound {
        reference: base_ref.to_string(),
        searched: roots,
    })
}

/// Locate the interpreter inside a prefix: `bin/python3`, then `bin/python`.
fn find_interpreter(prefix: &Path) -> Option<PathBuf> {
    for candidate in ["bin/python3", "bin/python"] {
        let path = prefix.join(candidate);
        if path.is_file() {
            return Some(path);
        }
    }
    None
}
