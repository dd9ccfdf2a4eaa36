//! Recipe loading, validation, and defaults.
//!
//! A recipe is the declarative input for one provisioning run: which base
//! environment to build on, which auxiliary packages to install, and which
//! source repository to fetch and install. Version and revision pins are
//! required fields: a recipe that wants floating behavior has to say so
//! with the explicit `"latest"` / `"HEAD"` sentinels.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::base::BaseRef;
use crate::steps::git::repo_dir_name;
use crate::types::{InstallScope, PackagePin, SourceRev};

/// One auxiliary package to install from the index before the source build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageSpec {
    pub name: String,
    /// Required: an exact version or the explicit `"latest"` sentinel.
    pub version: PackagePin,
}

impl PackageSpec {
    /// Render the pip requirement specifier for this package.
    pub fn requirement(&self) -> String {
        match &self.version {
            PackagePin::Latest => self.name.clone(),
            PackagePin::Exact(version) => format!("{}=={}", self.name, version),
        }
    }
}

/// The source repository to clone and install from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    pub url: String,
    /// Required: a concrete ref to check out or the explicit `"HEAD"` sentinel.
    pub rev: SourceRev,
}

/// A complete provisioning recipe that can be saved/loaded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    /// Base environment reference, `name[:tag]`.
    pub base: String,
    /// Install scope shared by both install steps.
    #[serde(default)]
    pub scope: InstallScope,
    /// Auxiliary packages installed from the index, in one pip invocation.
    pub packages: Vec<PackageSpec>,
    pub source: SourceSpec,
}

impl Recipe {
    /// Create a recipe with the stock defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Save the recipe to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize recipe to JSON")?;

        fs::write(&path, json)
            .with_context(|| format!("Failed to write recipe to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Load a recipe from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read recipe from {:?}", path.as_ref()))?;

        let recipe: Self = serde_json::from_str(&content).context("Failed to parse recipe JSON")?;

        Ok(recipe)
    }

    /// Validate the recipe
    pub fn validate(&self) -> Result<()> {
        // Validate the base reference
        if self.base.trim().is_empty() {
            anyhow::bail!("Base reference must be specified");
        }
        BaseRef::parse(&self.base)?;

        // Validate package names (pip requirement charset)
        if self.packages.is_empty() {
            anyhow::bail!("At least one auxiliary package must be specified");
        }
        for package in &self.packages {
            let name = package.name.trim();
            if name.is_empty() {
                anyhow::bail!("Package name must not be empty");
            }
            if !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
            {
                anyhow::bail!(
                    "Package name '{}' can only contain letters, numbers, '-', '_', and '.'",
                    name
                );
            }
        }

        // Validate the source URL format
        let url = self.source.url.trim();
        if url.is_empty() {
            anyhow::bail!("Source URL must be specified");
        }
        let has_scheme = url.starts_with("http://")
            || url.starts_with("https://")
            || url.starts_with("git://")
            || url.starts_with("ssh://");
        let scp_like = !url.contains("://")
            && url
                .split_once(':')
                .is_some_and(|(host, _)| host.contains('@'));
        if !has_scheme && !scp_like {
            anyhow::bail!(
                "Source URL must start with http://, https://, git://, or ssh:// \
                 (or use scp-style user@host:path)"
            );
        }
        if repo_dir_name(url).is_none() {
            anyhow::bail!("Cannot derive a checkout directory name from source URL '{}'", url);
        }

        // Floating pins are legal but worth flagging every time
        for package in &self.packages {
            if package.version.is_floating() {
                tracing::warn!(
                    "Package '{}' tracks the latest release; pin an exact version for \
                     reproducible builds",
                    package.name
                );
            }
        }
        if self.source.rev.is_floating() {
            tracing::warn!(
                "Source rev tracks the remote default branch; pin a concrete ref for \
                 reproducible builds"
            );
        }

        Ok(())
    }
}

impl Default for Recipe {
    fn default() -> Self {
        Self {
            base: "fenics:stable".to_string(),
            scope: InstallScope::User,
            packages: vec![PackageSpec {
                name: "h5py".to_string(),
                version: PackagePin::Latest,
            }],
            source: SourceSpec {
                url: "https://github.com/geo-fluid-dynamics/phaseflow-fenics".to_string(),
                rev: SourceRev::Head,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_recipe() -> Recipe {
        Recipe {
            base: "fenics:2017.2".to_string(),
            scope: InstallScope::User,
            packages: vec![PackageSpec {
                name: "h5py".to_string(),
                version: PackagePin::Exact("3.7.0".to_string()),
            }],
            source: SourceSpec {
                url: "https://github.com/geo-fluid-dynamics/phaseflow-fenics".to_string(),
                rev: SourceRev::Pinned("v0.5.0".to_string()),
            },
        }
    }

    #[test]
    fn test_recipe_default() {
        let recipe = Recipe::default();
        assert_eq!(recipe.base, "fenics:stable");
        assert_eq!(recipe.scope, InstallScope::User);
        assert_eq!(recipe.packages.len(), 1);
        assert_eq!(recipe.packages[0].name, "h5py");
        assert_eq!(recipe.packages[0].version, PackagePin::Latest);
        assert_eq!(recipe.source.rev, SourceRev::Head);
    }

    #[test]
    fn test_recipe_new_equals_default() {
        let recipe = Recipe::new();
        assert_eq!(recipe.base, Recipe::default().base);
        assert_eq!(recipe.source.url, Recipe::default().source.url);
    }

    #[test]
    fn test_requirement_latest_is_bare_name() {
        let package = PackageSpec {
            name: "h5py".to_string(),
            version: PackagePin::Latest,
        };
        assert_eq!(package.requirement(), "h5py");
    }

    #[test]
    fn test_requirement_exact_pins_version() {
        let package = PackageSpec {
            name: "h5py".to_string(),
            version: PackagePin::Exact("3.7.0".to_string()),
        };
        assert_eq!(package.requirement(), "h5py==3.7.0");
    }

    // =========================================================================
    // Serialization
    // =========================================================================

    #[test]
    fn test_save_and_load_roundtrip() {
        let recipe = create_test_recipe();
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        recipe.save_to_file(&path).unwrap();
        let loaded = Recipe::load_from_file(&path).unwrap();

        assert_eq!(loaded.base, recipe.base);
        assert_eq!(loaded.scope, recipe.scope);
        assert_eq!(loaded.packages.len(), recipe.packages.len());
        assert_eq!(loaded.packages[0].name, recipe.packages[0].name);
        assert_eq!(loaded.packages[0].version, recipe.packages[0].version);
        assert_eq!(loaded.source.url, recipe.source.url);
        assert_eq!(loaded.source.rev, recipe.source.rev);
    }

    #[test]
    fn test_save_to_file_creates_valid_json() {
        let recipe = create_test_recipe();
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_path_buf();

        recipe.save_to_file(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert!(parsed.is_object(), "Output should be a JSON object");
        assert_eq!(parsed["packages"][0]["version"], "3.7.0");
        assert_eq!(parsed["source"]["rev"], "v0.5.0");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = Recipe::load_from_file(std::path::Path::new("/nonexistent/path"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_json() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"{ invalid json }").unwrap();
        temp_file.flush().unwrap();

        let result = Recipe::load_from_file(temp_file.path());
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_version_field_fails() {
        // version is required: a package without one must not parse
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(
                br#"{
                    "base": "fenics",
                    "packages": [{"name": "h5py"}],
                    "source": {"url": "https://example.com/repo", "rev": "HEAD"}
                }"#,
            )
            .unwrap();
        temp_file.flush().unwrap();

        let result = Recipe::load_from_file(temp_file.path());
        assert!(result.is_err(), "Missing package version should fail to parse");
    }

    #[test]
    fn test_load_missing_rev_field_fails() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(
                br#"{
                    "base": "fenics",
                    "packages": [{"name": "h5py", "version": "latest"}],
                    "source": {"url": "https://example.com/repo"}
                }"#,
            )
            .unwrap();
        temp_file.flush().unwrap();

        let result = Recipe::load_from_file(temp_file.path());
        assert!(result.is_err(), "Missing source rev should fail to parse");
    }

    #[test]
    fn test_load_scope_defaults_to_user() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file
            .write_all(
                br#"{
                    "base": "fenics",
                    "packages": [{"name": "h5py", "version": "latest"}],
                    "source": {"url": "https://example.com/repo", "rev": "HEAD"}
                }"#,
            )
            .unwrap();
        temp_file.flush().unwrap();

        let recipe = Recipe::load_from_file(temp_file.path()).unwrap();
        assert_eq!(recipe.scope, InstallScope::User);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn test_validation_valid_recipe() {
        let recipe = create_test_recipe();
        assert!(recipe.validate().is_ok());
    }

    #[test]
    fn test_validation_floating_pins_accepted() {
        // Floating pins warn but do not fail
        let recipe = Recipe::default();
        assert!(recipe.validate().is_ok());
    }

    #[test]
    fn test_validation_empty_base() {
        let mut recipe = create_test_recipe();
        recipe.base = "   ".to_string();
        let result = recipe.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Base reference"));
    }

    #[test]
    fn test_validation_malformed_base_reference() {
        let mut recipe = create_test_recipe();
        recipe.base = "fenics:stable:extra".to_string();
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_validation_no_packages() {
        let mut recipe = create_test_recipe();
        recipe.packages.clear();
        let result = recipe.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("At least one auxiliary package")
        );
    }

    #[test]
    fn test_validation_empty_package_name() {
        let mut recipe = create_test_recipe();
        recipe.packages[0].name = String::new();
        let result = recipe.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Package name"));
    }

    #[test]
    fn test_validation_package_name_special_chars() {
        let mut recipe = create_test_recipe();
        recipe.packages[0].name = "h5py; rm -rf /".to_string();
        assert!(recipe.validate().is_err());
    }

    #[test]
    fn test_validation_empty_url() {
        let mut recipe = create_test_recipe();
        recipe.source.url = String::new();
        let result = recipe.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("Source URL"));
    }

    #[test]
    fn test_validation_url_invalid_scheme() {
        let mut recipe = create_test_recipe();
        recipe.source.url = "ftp://example.com/repo.git".to_string();
        let result = recipe.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("http://"));
    }

    #[test]
    fn test_validation_url_valid_schemes() {
        let mut recipe = create_test_recipe();

        for scheme in &["https://", "http://", "git://", "ssh://"] {
            recipe.source.url = format!("{}example.com/repo.git", scheme);
            assert!(recipe.validate().is_ok(), "Should accept {} URLs", scheme);
        }
    }

    #[test]
    fn test_validation_scp_style_url_accepted() {
        let mut recipe = create_test_recipe();
        recipe.source.url = "git@github.com:geo-fluid-dynamics/phaseflow-fenics.git".to_string();
        assert!(recipe.validate().is_ok());
    }

    #[test]
    fn test_validation_underivable_checkout_name() {
        let mut recipe = create_test_recipe();
        // Scheme is fine but there is no path component to name the checkout after
        recipe.source.url = "https://".to_string();
        let result = recipe.validate();
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("checkout directory name")
        );
    }
}
