//! Error handling module for labstrap
//!
//! Centralized error types built on thiserror. Module-level errors convert
//! into `LabstrapError` via `From`, so library callers see one surface.

use thiserror::Error;

/// Main error type for labstrap
#[derive(Error, Debug)]
pub enum LabstrapError {
    /// IO errors (file operations, process spawning, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Recipe errors (loading, parsing, validation)
    #[error("Recipe error: {0}")]
    Recipe(String),

    /// Base environment resolution errors
    #[error("Base resolution error: {0}")]
    Base(String),

    /// Source fetch errors (clone, checkout)
    #[error("Source fetch error: {0}")]
    Fetch(String),

    /// Package installation errors
    #[error("Package install error: {0}")]
    Install(String),

    /// Command execution errors (spawn, wait, signal)
    #[error("Execution error: {0}")]
    Exec(String),

    /// Provisioning phase transition errors
    #[error("Phase transition error: {0}")]
    Transition(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General errors (catch-all for edge cases)
    #[error("{0}")]
    General(String),
}

/// Result type alias for labstrap operations
pub type Result<T> = std::result::Result<T, LabstrapError>;

// Convenient error constructors
impl LabstrapError {
    /// Create a recipe error
    pub fn recipe(msg: impl Into<String>) -> Self {
        Self::Recipe(msg.into())
    }

    /// Create a base resolution error
    pub fn base(msg: impl Into<String>) -> Self {
        Self::Base(msg.into())
    }

    /// Create a source fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a package install error
    pub fn install(msg: impl Into<String>) -> Self {
        Self::Install(msg.into())
    }

    /// Create an execution error
    pub fn exec(msg: impl Into<String>) -> Self {
        Self::Exec(msg.into())
    }

    /// Create a phase transition error
    pub fn transition(msg: impl Into<String>) -> Self {
        Self::Transition(msg.into())
    }

    /// Create a general error
    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }
}

impl From<crate::state::PhaseTransitionError> for LabstrapError {
    fn from(err: crate::state::PhaseTransitionError) -> Self {
        Self::Transition(err.to_string())
    }
}

impl From<crate::base::BaseError> for LabstrapError {
    fn from(err: crate::base::BaseError) -> Self {
        Self::Base(err.to_string())
    }
}

impl From<crate::provisioner::ProvisionError> for LabstrapError {
    fn from(err: crate::provisioner::ProvisionError) -> Self {
        use crate::provisioner::ProvisionError;
        match &err {
            ProvisionError::BaseResolution(_) => Self::Base(err.to_string()),
            ProvisionError::SourceFetch { .. } => Self::Fetch(err.to_string()),
            ProvisionError::PackageInstall { .. } => Self::Install(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LabstrapError::recipe("missing source url");
        assert_eq!(err.to_string(), "Recipe error: missing source url");

        let err = LabstrapError::base("no such base: fenics:2017.2");
        assert_eq!(
            err.to_string(),
            "Base resolution error: no such base: fenics:2017.2"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: LabstrapError = io_err.into();
        assert!(matches!(err, LabstrapError::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        let err = LabstrapError::fetch("clone failed");
        assert!(matches!(err, LabstrapError::Fetch(_)));

        let err = LabstrapError::install("pip exited with status 1");
        assert!(matches!(err, LabstrapError::Install(_)));
    }
}
