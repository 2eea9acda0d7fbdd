use crate::requirement::{normalize_name, Requirement};
use chrono::{DateTime, Utc};
use driftwatch_core::error::LockfileParsingError;
use driftwatch_core::lockfile;
use driftwatch_core::plugin::ParsedDependencies;
use driftwatch_core::types::{Dependency, DependencyCategory};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
pub struct PyProject {
    #[serde(default)]
    pub project: Option<ProjectTable>,
    #[serde(default, rename = "dependency-groups")]
    pub dependency_groups: BTreeMap<String, Vec<toml::Value>>,
    #[serde(default)]
    pub tool: Option<ToolTable>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProjectTable {
    pub name: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, rename = "optional-dependencies")]
    pub optional_dependencies: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolTable {
    #[serde(default)]
    pub uv: Option<UvTool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UvTool {
    #[serde(default, rename = "dev-dependencies")]
    pub dev_dependencies: Vec<String>,
}

/// A direct dependency as the manifest declares it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub requirement: Requirement,
    pub category: DependencyCategory,
}

impl PyProject {
    pub fn load(path: &Path) -> Result<Self, LockfileParsingError> {
        let content = lockfile::read_file(path)?;
        toml::from_str(&content).map_err(|e| LockfileParsingError::Toml {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn project_name(&self) -> Option<&str> {
        self.project.as_ref().and_then(|p| p.name.as_deref())
    }

    /// Runtime first, then optional extras, then development groups.
    /// `{ include-group = ".." }` entries are skipped; the included group is
    /// listed on its own.
    pub fn declarations(&self) -> Vec<Declaration> {
        let mut declarations = Vec::new();
        let mut push = |spec: &str, category: DependencyCategory| {
            match Requirement::parse(spec) {
                Some(requirement) => declarations.push(Declaration { requirement, category }),
                None => tracing::debug!(spec, "ignoring unparseable requirement"),
            }
        };

        if let Some(project) = &self.project {
            for spec in &project.dependencies {
                push(spec, DependencyCategory::Runtime);
            }
            for specs in project.optional_dependencies.values() {
                for spec in specs {
                    push(spec, DependencyCategory::Optional);
                }
            }
        }

        for entries in self.dependency_groups.values() {
            for spec in entries.iter().filter_map(|entry| entry.as_str()) {
                push(spec, DependencyCategory::Development);
            }
        }

        if let Some(uv) = self.tool.as_ref().and_then(|t| t.uv.as_ref()) {
            for spec in &uv.dev_dependencies {
                push(spec, DependencyCategory::Development);
            }
        }

        declarations
    }

    pub fn specifier_for(&self, name: &str) -> Option<String> {
        self.declarations()
            .into_iter()
            .find(|d| d.requirement.name == name)
            .and_then(|d| d.requirement.specifier)
    }
}

/// What the lockfile pins for one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pinned {
    pub version: String,
    pub uploaded: Option<DateTime<Utc>>,
}

/// Merges repeated declarations (first specifier wins, categories accumulate),
/// resolves each against the lockfile and splits production from development.
pub fn assemble(
    lockfile: &Path,
    project_name: Option<String>,
    declarations: Vec<Declaration>,
    resolve: impl Fn(&str) -> Option<Pinned>,
) -> ParsedDependencies {
    let own_name = project_name.as_deref().map(normalize_name);

    let mut merged: Vec<(Requirement, Vec<DependencyCategory>)> = Vec::new();
    for declaration in declarations {
        if own_name.as_deref() == Some(declaration.requirement.name.as_str()) {
            continue;
        }
        match merged
            .iter_mut()
            .find(|(existing, _)| existing.name == declaration.requirement.name)
        {
            Some((existing, categories)) => {
                if existing.specifier.is_none() {
                    existing.specifier = declaration.requirement.specifier;
                }
                categories.push(declaration.category);
            }
            None => merged.push((declaration.requirement, vec![declaration.category])),
        }
    }

    let mut parsed = ParsedDependencies {
        project_name,
        ..Default::default()
    };

    for (requirement, categories) in merged {
        let Some(pinned) = resolve(&requirement.name) else {
            tracing::warn!(
                lockfile = %lockfile.display(),
                package = %requirement.name,
                "declared dependency is not pinned in the lockfile, skipping"
            );
            continue;
        };

        let mut dependency = Dependency::new(requirement.name, pinned.version)
            .with_range(requirement.specifier)
            .with_upload_time(pinned.uploaded);
        for category in categories {
            dependency = dependency.with_category(category);
        }

        if dependency.is_production() {
            parsed.production.push(dependency);
        } else {
            parsed.development.push(dependency);
        }
    }

    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    const PYPROJECT: &str = r#"
[project]
name = "demo"
dependencies = ["requests>=2.31", "Click==8.1.7"]

[project.optional-dependencies]
socks = ["PySocks>=1.7"]

[dependency-groups]
dev = ["pytest>=8", { include-group = "lint" }]
lint = ["ruff"]

[tool.uv]
dev-dependencies = ["mypy"]
"#;

    #[test]
    fn test_declarations_in_manifest_order() {
        let pyproject: PyProject = toml::from_str(PYPROJECT).unwrap();
        assert_eq!(pyproject.project_name(), Some("demo"));

        let declarations = pyproject.declarations();
        let categories: Vec<DependencyCategory> = declarations.iter().map(|d| d.category).collect();
        assert_eq!(
            categories,
            vec![
                DependencyCategory::Runtime,
                DependencyCategory::Runtime,
                DependencyCategory::Optional,
                DependencyCategory::Development,
                DependencyCategory::Development,
                DependencyCategory::Development,
            ]
        );

        let names: Vec<String> = pyproject
            .declarations()
            .into_iter()
            .map(|d| d.requirement.name)
            .collect();
        assert_eq!(names, vec!["requests", "click", "pysocks", "pytest", "ruff", "mypy"]);
    }

    #[test]
    fn test_specifier_lookup_uses_normalized_names() {
        let pyproject: PyProject = toml::from_str(PYPROJECT).unwrap();
        assert_eq!(pyproject.specifier_for("click").as_deref(), Some("==8.1.7"));
        assert_eq!(pyproject.specifier_for("ruff"), None);
    }

    #[test]
    fn test_assemble_merges_and_skips_unpinned() {
        let pyproject: PyProject = toml::from_str(
            r#"
[project]
name = "Demo"
dependencies = ["requests>=2.31", "demo[extra]"]

[dependency-groups]
dev = ["requests", "pytest", "ghost"]
"#,
        )
        .unwrap();

        let parsed = assemble(
            Path::new("pylock.toml"),
            pyproject.project_name().map(str::to_string),
            pyproject.declarations(),
            |name| match name {
                "requests" => Some(Pinned { version: "2.31.0".to_string(), uploaded: None }),
                "pytest" => Some(Pinned { version: "8.1.1".to_string(), uploaded: None }),
                _ => None,
            },
        );

        assert_eq!(parsed.production.len(), 1);
        let requests = &parsed.production[0];
        assert_eq!(requests.declared_range.as_deref(), Some(">=2.31"));
        assert_eq!(
            requests.categories,
            vec![DependencyCategory::Runtime, DependencyCategory::Development]
        );
        assert_eq!(parsed.development.len(), 1);
        assert_eq!(parsed.development[0].name, "pytest");
    }

    #[test]
    fn test_empty_manifest() {
        let pyproject: PyProject = toml::from_str("").unwrap();
        assert!(pyproject.declarations().is_empty());
        assert!(pyproject.project_name().is_none());
    }
}
