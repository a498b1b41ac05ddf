//! `trellis.toml`, the project manifest.
//!
//! ```toml
//! [project]
//! name = "shop"
//! version = "0.1.0"
//! root = "shop.core"
//!
//! [modules]
//! paths = ["dsl"]
//!
//! [compiler]
//! parallel = true
//! deny_warnings = false
//! archetype_surfaces = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::compile::CompileOptions;
use crate::error::TrellisError;
use crate::source::SourceProvider;

pub const MANIFEST_FILE: &str = "trellis.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub project: ProjectConfig,
    #[serde(default)]
    pub modules: ModulesConfig,
    #[serde(default)]
    pub compiler: CompileOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Root module; modules it does not reach through `use` are not compiled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
}

fn default_version() -> String {
    "0.1.0".into()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModulesConfig {
    /// Directories or files scanned for sources, relative to the manifest
    pub paths: Vec<PathBuf>,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        ModulesConfig {
            paths: vec![PathBuf::from("dsl")],
        }
    }
}

impl Manifest {
    /// Read and parse the manifest at `path`.
    pub fn load(provider: &dyn SourceProvider, path: &Path) -> Result<Self, TrellisError> {
        let text = provider.read_source(path).map_err(|source| TrellisError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text, path)
    }

    /// `path` is only used in error messages.
    pub fn from_toml(text: &str, path: &Path) -> Result<Self, TrellisError> {
        let manifest: Manifest = toml::from_str(text).map_err(|e| TrellisError::Manifest {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        manifest.check(path)?;
        Ok(manifest)
    }

    fn check(&self, path: &Path) -> Result<(), TrellisError> {
        let problem = if self.project.name.trim().is_empty() {
            Some("project name must not be empty")
        } else if self.modules.paths.is_empty() {
            Some("[modules] paths must list at least one directory")
        } else {
            None
        };
        match problem {
            Some(message) => Err(TrellisError::Manifest {
                path: path.display().to_string(),
                message: message.into(),
            }),
            None => Ok(()),
        }
    }

    /// Source roots resolved against the manifest's directory.
    pub fn source_roots(&self, project_dir: &Path) -> Vec<PathBuf> {
        self.modules
            .paths
            .iter()
            .map(|p| project_dir.join(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Manifest, TrellisError> {
        Manifest::from_toml(text, Path::new("trellis.toml"))
    }

    #[test]
    fn minimal_manifest_uses_defaults() {
        let manifest = parse("[project]\nname = \"shop\"\n").unwrap();
        assert_eq!(manifest.project.version, "0.1.0");
        assert_eq!(manifest.project.root, None);
        assert_eq!(manifest.modules.paths, vec![PathBuf::from("dsl")]);
        assert_eq!(manifest.compiler, CompileOptions::default());
    }

    #[test]
    fn full_manifest() {
        let manifest = parse(
            r#"
[project]
name = "shop"
version = "2.1.0"
root = "shop.app"

[modules]
paths = ["dsl", "shared/common.dsl"]

[compiler]
parallel = false
deny_warnings = true
"#,
        )
        .unwrap();
        assert_eq!(manifest.project.root.as_deref(), Some("shop.app"));
        assert!(!manifest.compiler.parallel);
        assert!(manifest.compiler.deny_warnings);
        assert!(manifest.compiler.archetype_surfaces);
        assert_eq!(
            manifest.source_roots(Path::new("/work")),
            vec![PathBuf::from("/work/dsl"), PathBuf::from("/work/shared/common.dsl")]
        );
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse("[project]\nname = \"shop\"\n\n[compiler]\nfast = true\n").unwrap_err();
        match err {
            TrellisError::Manifest { message, .. } => assert!(message.contains("fast"), "{message}"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_paths_are_rejected() {
        let err = parse("[project]\nname = \"shop\"\n\n[modules]\npaths = []\n").unwrap_err();
        assert!(err.to_string().contains("at least one"));
    }
}
