//! Parsed resource containers.
//!
//! A resource container is a repository tree holding translated source
//! content plus a `manifest.yaml` (or `manifest.json`) describing its
//! projects and layout. This module parses the manifest and exposes the lazy
//! accessors the preprocessors enumerate chapters and chunks through. The
//! chapter/chunk listings are plain sorted directory reads: ordering is
//! significant, it determines verse/frame order in reassembled text.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::file_utils::{read_file, sorted_dir_names, sorted_file_names};

/// Resource types rendered by the Bible preprocessor.
pub const BIBLE_RESOURCE_TYPES: [&str; 4] = ["bible", "reg", "ulb", "udb"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub resource: Resource,
    #[serde(default)]
    pub projects: Vec<Project>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub file_ext: String,
    #[serde(default)]
    pub language: Language,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Language {
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub direction: String,
}

/// One book/story-set/manual within a resource container.
/// Immutable after load; manifest ordering is significant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub identifier: String,
    pub path: String,
    #[serde(default)]
    pub title: String,
}

/// Table-of-contents tree for manual-type resources (`toc.yaml`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Toc {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: Vec<TocSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TocSection {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub sections: Vec<TocSection>,
}

/// Per-project `config.yaml`: slug -> prerequisites and follow-ups.
pub type ProjectConfig = BTreeMap<String, ConfigEntry>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigEntry {
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub recommended: Vec<String>,
}

#[derive(Debug)]
pub enum RcError {
    Io(io::Error),
    MissingManifest(PathBuf),
    Yaml(serde_yaml::Error),
    Json(serde_json::Error),
}

impl fmt::Display for RcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RcError::Io(e) => write!(f, "io error: {e}"),
            RcError::MissingManifest(dir) => {
                write!(f, "no manifest.yaml or manifest.json in {}", dir.display())
            }
            RcError::Yaml(e) => write!(f, "malformed manifest yaml: {e}"),
            RcError::Json(e) => write!(f, "malformed manifest json: {e}"),
        }
    }
}

impl std::error::Error for RcError {}

impl From<io::Error> for RcError {
    fn from(e: io::Error) -> Self {
        RcError::Io(e)
    }
}

/// A resource container rooted at a local directory.
#[derive(Debug, Clone)]
pub struct ResourceContainer {
    root: PathBuf,
    pub manifest: Manifest,
}

impl ResourceContainer {
    /// Loads the manifest from `root`, preferring `manifest.yaml` over
    /// `manifest.json`.
    pub fn from_dir(root: &Path) -> Result<Self, RcError> {
        let yaml_path = root.join("manifest.yaml");
        let json_path = root.join("manifest.json");
        let manifest: Manifest = if yaml_path.is_file() {
            serde_yaml::from_str(&read_file(&yaml_path)?).map_err(RcError::Yaml)?
        } else if json_path.is_file() {
            serde_json::from_str(&read_file(&json_path)?).map_err(RcError::Json)?
        } else {
            return Err(RcError::MissingManifest(root.to_path_buf()));
        };
        info!(
            root = %root.display(),
            resource = %manifest.resource.identifier,
            projects = manifest.projects.len(),
            "Loaded resource container"
        );
        Ok(Self {
            root: root.to_path_buf(),
            manifest,
        })
    }

    pub fn resource(&self) -> &Resource {
        &self.manifest.resource
    }

    pub fn projects(&self) -> &[Project] {
        &self.manifest.projects
    }

    pub fn project(&self, identifier: &str) -> Option<&Project> {
        self.manifest
            .projects
            .iter()
            .find(|p| p.identifier == identifier)
    }

    /// Absolute path of a project's content directory (or file).
    pub fn project_path(&self, project: &Project) -> PathBuf {
        self.root.join(&project.path)
    }

    /// Ordered chapter ids for a project: the sorted sub-directory names
    /// under its path. `.git` and the pre-chapter `00` directory never count
    /// as chapters.
    pub fn chapters(&self, project_identifier: &str) -> Vec<String> {
        let Some(project) = self.project(project_identifier) else {
            return Vec::new();
        };
        sorted_dir_names(&self.project_path(project))
            .into_iter()
            .filter(|name| !name.starts_with('.') && name != "00")
            .collect()
    }

    /// Ordered chunk filenames within a chapter: plain lexical filename
    /// ordering, preserved exactly.
    pub fn chunks(&self, project_identifier: &str, chapter: &str) -> Vec<String> {
        let Some(project) = self.project(project_identifier) else {
            return Vec::new();
        };
        sorted_file_names(&self.project_path(project).join(chapter))
    }

    /// Table-of-contents tree for a manual-type project, if present.
    pub fn toc(&self, project_identifier: &str) -> Option<Toc> {
        let project = self.project(project_identifier)?;
        let toc_path = self.project_path(project).join("toc.yaml");
        let content = read_file(&toc_path).ok()?;
        match serde_yaml::from_str(&content) {
            Ok(toc) => Some(toc),
            Err(e) => {
                debug!(error = ?e, path = %toc_path.display(), "Unreadable toc.yaml");
                None
            }
        }
    }

    /// Per-project config mapping. Missing or malformed files read as empty.
    pub fn project_config(&self, project: &Project) -> ProjectConfig {
        let config_path = self.project_path(project).join("config.yaml");
        let Ok(content) = read_file(&config_path) else {
            return ProjectConfig::new();
        };
        match serde_yaml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                debug!(error = ?e, path = %config_path.display(), "Unreadable config.yaml");
                ProjectConfig::new()
            }
        }
    }

    /// Serializes the manifest back out as YAML.
    pub fn manifest_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.manifest)
    }
}
