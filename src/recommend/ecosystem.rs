//! Packaging-level project metadata and framework detection.
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::OnceLock;

use crate::utils::config::{FrameworkRules, ProjectOverrides};

/// Declared name and standard entry points of the analysed project.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectMetadata {
    pub name: Option<String>,
    /// Entry points as FQNs (`pkg.cli:main` becomes `pkg.cli.main`).
    pub entrypoints: BTreeSet<String>,
    /// Modules whose source has an `if __name__ == "__main__"` block.
    pub main_block_modules: BTreeSet<String>,
}

#[derive(Deserialize, Default)]
struct PyProject {
    #[serde(default)]
    project: PyProjectTable,
}

#[derive(Deserialize, Default)]
struct PyProjectTable {
    name: Option<String>,
    #[serde(default)]
    scripts: BTreeMap<String, String>,
    #[serde(default, rename = "gui-scripts")]
    gui_scripts: BTreeMap<String, String>,
    #[serde(default, rename = "entry-points")]
    entry_points: BTreeMap<String, BTreeMap<String, String>>,
}

impl ProjectMetadata {
    /// Read `pyproject.toml` under `root`. A missing or malformed file yields
    /// empty metadata.
    #[must_use]
    pub fn load(root: &Path) -> Self {
        let path = root.join("pyproject.toml");
        let Ok(data) = std::fs::read_to_string(&path) else {
            tracing::debug!(path = %path.display(), "No pyproject.toml");
            return Self::default();
        };
        match toml::from_str::<PyProject>(&data) {
            Ok(py) => Self::from_pyproject(py),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot parse pyproject.toml");
                Self::default()
            }
        }
    }

    /// Parse metadata from the text of a `pyproject.toml`.
    ///
    /// # Errors
    /// Returns the TOML error for malformed input.
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<PyProject>(text).map(Self::from_pyproject)
    }

    fn from_pyproject(py: PyProject) -> Self {
        let table = py.project;
        let groups = table.entry_points.values();
        let entrypoints: BTreeSet<String> = table
            .scripts
            .values()
            .chain(table.gui_scripts.values())
            .chain(groups.flat_map(BTreeMap::values))
            .filter_map(|spec| entrypoint_fqn(spec))
            .collect();
        if !entrypoints.is_empty() {
            tracing::info!(count = entrypoints.len(), "Found declared entry points");
        }
        Self { name: table.name, entrypoints, main_block_modules: BTreeSet::new() }
    }

    /// Apply explicit overrides from configuration.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &ProjectOverrides) -> Self {
        if let Some(name) = &overrides.name {
            self.name = Some(name.clone());
        }
        self.entrypoints.extend(overrides.entrypoints.iter().cloned());
        self
    }
}

/// `module.path:object.attr [extras]` to `module.path.object.attr`.
#[must_use]
pub fn entrypoint_fqn(spec: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][\w.]*)\s*(?::\s*([A-Za-z_][\w.]*))?").expect("entry point pattern")
    });
    let caps = re.captures(spec)?;
    let module = caps.get(1)?.as_str();
    Some(match caps.get(2) {
        Some(obj) => format!("{module}.{}", obj.as_str()),
        None => module.to_string(),
    })
}

/// Framework id whose `project_name` equals the declared project name, or
/// failing that, appears among the top-level imported packages.
#[must_use]
pub fn identify_framework(
    metadata: &ProjectMetadata,
    module_imports: &BTreeMap<String, BTreeSet<String>>,
    frameworks: &BTreeMap<String, FrameworkRules>,
) -> Option<String> {
    if let Some(name) = &metadata.name {
        if let Some((id, _)) =
            frameworks.iter().find(|(_, r)| !r.project_name.is_empty() && r.project_name.eq_ignore_ascii_case(name))
        {
            tracing::info!(framework = %id, "Framework identified by project name");
            return Some(id.clone());
        }
    }
    let top_level: BTreeSet<String> = module_imports
        .values()
        .flatten()
        .map(|imp| imp.split('.').next().unwrap_or(imp).to_lowercase())
        .collect();
    let found = frameworks
        .iter()
        .find(|(_, r)| !r.project_name.is_empty() && top_level.contains(&r.project_name.to_lowercase()))
        .map(|(id, _)| id.clone());
    if let Some(id) = &found {
        tracing::info!(framework = %id, "Framework identified by imports");
    }
    found
}
