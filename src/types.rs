//! Type-safe recipe value types for labstrap
//!
//! This module replaces stringly-typed recipe fields with proper Rust enums
//! that provide compile-time validation and exhaustive matching. Version and
//! revision pins are explicit: floating behavior must be spelled out with the
//! `latest` / `HEAD` sentinels, never implied by omission.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

/// Installation scope for pip installs.
///
/// One scope applies to the whole recipe, so the auxiliary install and the
/// final package install always land in the same place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[derive(Display, EnumString, EnumIter)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InstallScope {
    /// Per-user site-packages (`pip install --user`)
    #[default]
    #[strum(serialize = "user")]
    User,
    /// Interpreter-wide site-packages (no scope flag)
    #[strum(serialize = "system")]
    System,
}

impl InstallScope {
    /// The pip flag selecting this scope, if any.
    ///
    /// | Variant  | Flag       |
    /// |----------|------------|
    /// | `User`   | `--user`   |
    /// | `System` | (none)     |
    pub fn pip_flag(&self) -> Option<&'static str> {
        match self {
            InstallScope::User => Some("--user"),
            InstallScope::System => None,
        }
    }
}

/// Version pin for an auxiliary package.
///
/// The recipe must state a version for every package. `Latest` is the explicit
/// opt-in to floating behavior; there is no silent default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PackagePin {
    /// Track the newest release the index offers (non-reproducible).
    Latest,
    /// Install exactly this version (e.g., `3.7.0`).
    Exact(String),
}

impl PackagePin {
    /// Returns true if this pin floats with the index instead of naming a version.
    pub fn is_floating(&self) -> bool {
        matches!(self, PackagePin::Latest)
    }
}

impl std::fmt::Display for PackagePin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackagePin::Latest => write!(f, "latest"),
            PackagePin::Exact(v) => write!(f, "{}", v),
        }
    }
}

impl std::str::FromStr for PackagePin {
    type Err = PinParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PinParseError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(PinParseError::InvalidVersion(s.to_string()));
        }
        if trimmed.eq_ignore_ascii_case("latest") {
            Ok(PackagePin::Latest)
        } else {
            Ok(PackagePin::Exact(trimmed.to_string()))
        }
    }
}

impl TryFrom<String> for PackagePin {
    type Error = PinParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<PackagePin> for String {
    fn from(pin: PackagePin) -> Self {
        pin.to_string()
    }
}

/// Error for invalid package version strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PinParseError {
    /// The version string was empty.
    #[error("Package version must not be empty (use \"latest\" to track the newest release)")]
    Empty,

    /// The version string contains whitespace.
    #[error("Invalid package version '{0}' (must not contain whitespace)")]
    InvalidVersion(String),
}

/// Revision pin for the source checkout.
///
/// The recipe must state a revision. `Head` is the explicit opt-in to tracking
/// the remote default branch (non-reproducible).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceRev {
    /// Track the remote default branch as of clone time (non-reproducible).
    Head,
    /// Check out exactly this ref (tag, branch, or commit hash).
    Pinned(String),
}

impl SourceRev {
    /// Returns true if this rev floats with the remote instead of naming a ref.
    pub fn is_floating(&self) -> bool {
        matches!(self, SourceRev::Head)
    }
}

impl std::fmt::Display for SourceRev {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceRev::Head => write!(f, "HEAD"),
            SourceRev::Pinned(r) => write!(f, "{}", r),
        }
    }
}

impl std::str::FromStr for SourceRev {
    type Err = RevParseError;

    /// Parse a revision string.
    ///
    /// Only the literal `HEAD` maps to `Head`; the match is case-sensitive
    /// because `head` is a legal branch name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RevParseError::Empty);
        }
        if trimmed.chars().any(char::is_whitespace) {
            return Err(RevParseError::InvalidRev(s.to_string()));
        }
        if trimmed == "HEAD" {
            Ok(SourceRev::Head)
        } else {
            Ok(SourceRev::Pinned(trimmed.to_string()))
        }
    }
}

impl TryFrom<String> for SourceRev {
    type Error = RevParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SourceRev> for String {
    fn from(rev: SourceRev) -> Self {
        rev.to_string()
    }
}

/// Error for invalid source revision strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RevParseError {
    /// The revision string was empty.
    #[error("Source rev must not be empty (use \"HEAD\" to track the remote default branch)")]
    Empty,

    /// The revision string contains whitespace.
    #[error("Invalid source rev '{0}' (must not contain whitespace)")]
    InvalidRev(String),
}
