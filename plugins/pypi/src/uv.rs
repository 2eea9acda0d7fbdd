use crate::pyproject::{assemble, Declaration, Pinned, PyProject};
use crate::requirement::{earliest_upload_time, normalize_name, Requirement};
use driftwatch_core::error::LockfileParsingError;
use driftwatch_core::lockfile::{self, LockfileHeader, SchemaRule};
use driftwatch_core::plugin::{EcosystemMatch, ParsedDependencies, Parser};
use driftwatch_core::types::{DependencyCategory, PackageManager};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
struct UvLock {
    version: Option<i64>,
    revision: Option<i64>,
    #[serde(default)]
    package: Vec<UvPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UvPackage {
    name: String,
    version: Option<String>,
    #[serde(default)]
    source: BTreeMap<String, toml::Value>,
    #[serde(default)]
    dependencies: Vec<UvEdge>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, Vec<UvEdge>>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, Vec<UvEdge>>,
    metadata: Option<UvMetadata>,
    sdist: Option<toml::Value>,
    #[serde(default)]
    wheels: Vec<toml::Value>,
}

#[derive(Debug, Deserialize)]
struct UvEdge {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct UvMetadata {
    #[serde(default)]
    requires_dist: Vec<UvSpecifier>,
    #[serde(default)]
    requires_dev: BTreeMap<String, Vec<UvSpecifier>>,
}

#[derive(Debug, Deserialize)]
struct UvSpecifier {
    name: String,
    specifier: Option<String>,
}

impl UvPackage {
    /// The project itself: `source = { editable = "." }` or `{ virtual = "." }`.
    fn is_local_root(&self) -> bool {
        ["editable", "virtual"]
            .iter()
            .any(|key| self.source.get(*key).and_then(|v| v.as_str()) == Some("."))
    }

    fn pinned(&self) -> Option<Pinned> {
        Some(Pinned {
            version: self.version.clone()?,
            uploaded: earliest_upload_time(self.sdist.iter().chain(self.wheels.iter())),
        })
    }
}

impl UvMetadata {
    fn specifier_for(&self, name: &str) -> Option<String> {
        self.requires_dist
            .iter()
            .chain(self.requires_dev.values().flatten())
            .find(|spec| normalize_name(&spec.name) == name)
            .and_then(|spec| spec.specifier.clone())
    }
}

struct UvDocument {
    lockfile: PathBuf,
    pyproject: PyProject,
    lock: UvLock,
}

impl UvDocument {
    fn root(&self) -> Result<&UvPackage, LockfileParsingError> {
        let project_name = self.pyproject.project_name().map(normalize_name);
        self.lock
            .package
            .iter()
            .find(|p| project_name.as_deref() == Some(normalize_name(&p.name).as_str()))
            .or_else(|| self.lock.package.iter().find(|p| p.is_local_root()))
            .ok_or_else(|| LockfileParsingError::MissingField {
                path: self.lockfile.clone(),
                field: "package (project root)".to_string(),
            })
    }

    fn package(&self, name: &str) -> Option<&UvPackage> {
        self.lock
            .package
            .iter()
            .filter(|p| p.version.is_some())
            .find(|p| normalize_name(&p.name) == name)
    }
}

fn root_declarations(
    root: &UvPackage,
    specifier: impl Fn(&str) -> Option<String>,
) -> Vec<Declaration> {
    let groups = std::iter::once((&root.dependencies, DependencyCategory::Runtime))
        .chain(
            root.optional_dependencies
                .values()
                .map(|edges| (edges, DependencyCategory::Optional)),
        )
        .chain(
            root.dev_dependencies
                .values()
                .map(|edges| (edges, DependencyCategory::Development)),
        );

    groups
        .flat_map(|(edges, category)| edges.iter().map(move |edge| (edge, category)))
        .map(|(edge, category)| {
            let name = normalize_name(&edge.name);
            let specifier = specifier(&name);
            Declaration {
                requirement: Requirement { name, specifier },
                category,
            }
        })
        .collect()
}

fn parse_root(
    document: &UvDocument,
    specifier: impl Fn(&str) -> Option<String>,
) -> Result<ParsedDependencies, LockfileParsingError> {
    let root = document.root()?;
    let project_name = document
        .pyproject
        .project_name()
        .map(str::to_string)
        .or_else(|| Some(root.name.clone()));

    let declarations = root_declarations(root, specifier);
    Ok(assemble(&document.lockfile, project_name, declarations, |name| {
        document.package(name).and_then(UvPackage::pinned)
    }))
}

/// Revision 3 and later record the root's declared specifiers in `[package.metadata]`.
fn parse_with_metadata(document: &UvDocument) -> Result<ParsedDependencies, LockfileParsingError> {
    let metadata = document.root()?.metadata.as_ref();
    parse_root(document, |name| {
        metadata
            .and_then(|m| m.specifier_for(name))
            .or_else(|| document.pyproject.specifier_for(name))
    })
}

fn parse_without_metadata(document: &UvDocument) -> Result<ParsedDependencies, LockfileParsingError> {
    parse_root(document, |name| document.pyproject.specifier_for(name))
}

fn is_v1_r3(header: &LockfileHeader) -> bool {
    header.int("version") == Some(1) && header.int("revision").unwrap_or(0) >= 3
}

fn is_v1(header: &LockfileHeader) -> bool {
    header.int("version") == Some(1)
}

const RULES: &[SchemaRule<UvDocument>] = &[
    SchemaRule {
        condition: "version == 1 && revision >= 3",
        matches: is_v1_r3,
        parse: parse_with_metadata,
    },
    SchemaRule {
        condition: "version == 1",
        matches: is_v1,
        parse: parse_without_metadata,
    },
];

pub struct UvParser;

impl UvParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for UvParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for UvParser {
    fn package_manager(&self) -> PackageManager {
        PackageManager::Uv
    }

    fn parse(&self, found: &EcosystemMatch) -> Result<ParsedDependencies, LockfileParsingError> {
        let pyproject = PyProject::load(&found.manifest)?;
        let content = lockfile::read_file(&found.lockfile)?;
        let lock: UvLock = toml::from_str(&content).map_err(|e| LockfileParsingError::Toml {
            path: found.lockfile.clone(),
            message: e.to_string(),
        })?;

        let header = LockfileHeader::new()
            .with_int("version", lock.version)
            .with_int("revision", lock.revision);
        let document = UvDocument {
            lockfile: found.lockfile.clone(),
            pyproject,
            lock,
        };

        lockfile::dispatch(RULES, &header, &found.lockfile, &document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::fs;
    use tempfile::TempDir;

    const PYPROJECT: &str = r#"
[project]
name = "demo-app"
version = "0.1.0"
dependencies = ["requests>=2.30", "click"]

[project.optional-dependencies]
socks = ["pysocks"]

[dependency-groups]
dev = ["pytest>=8"]
"#;

    const UV_LOCK_R3: &str = r#"
version = 1
revision = 3
requires-python = ">=3.12"

[[package]]
name = "click"
version = "8.1.7"
source = { registry = "https://pypi.org/simple" }
wheels = [
    { url = "https://files/click.whl", hash = "sha256:00", size = 1, upload-time = "2023-08-17T17:29:10.000Z" },
]

[[package]]
name = "demo-app"
version = "0.1.0"
source = { editable = "." }
dependencies = [
    { name = "requests" },
    { name = "click" },
]

[package.optional-dependencies]
socks = [
    { name = "pysocks" },
]

[package.dev-dependencies]
dev = [
    { name = "pytest" },
]

[package.metadata]
requires-dist = [
    { name = "click" },
    { name = "requests", specifier = ">=2.31" },
    { name = "pysocks", marker = "extra == 'socks'" },
]

[package.metadata.requires-dev]
dev = [{ name = "pytest", specifier = ">=8.1" }]

[[package]]
name = "pysocks"
version = "1.7.1"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "pytest"
version = "8.1.1"
source = { registry = "https://pypi.org/simple" }

[[package]]
name = "requests"
version = "2.31.0"
source = { registry = "https://pypi.org/simple" }
sdist = { url = "https://files/requests.tar.gz", hash = "sha256:01", size = 2, upload-time = "2023-05-22T15:12:44.175Z" }
"#;

    fn project(pyproject: &str, lock: &str) -> (TempDir, EcosystemMatch) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("pyproject.toml"), pyproject).unwrap();
        fs::write(temp_dir.path().join("uv.lock"), lock).unwrap();
        let found = EcosystemMatch::new(PackageManager::Uv, temp_dir.path());
        (temp_dir, found)
    }

    #[test]
    fn test_parse_revision_3() {
        let (_dir, found) = project(PYPROJECT, UV_LOCK_R3);
        let parsed = UvParser::new().parse(&found).unwrap();

        assert_eq!(parsed.project_name.as_deref(), Some("demo-app"));
        let production: Vec<&str> = parsed.production.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(production, vec!["requests", "click"]);
        let development: Vec<&str> = parsed.development.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(development, vec!["pysocks", "pytest"]);

        let requests = &parsed.production[0];
        assert_eq!(requests.installed_version, "2.31.0");
        assert_eq!(requests.declared_range.as_deref(), Some(">=2.31"));
        assert_eq!(
            requests.locked_upload_time,
            Some(Utc.with_ymd_and_hms(2023, 5, 22, 15, 12, 44).unwrap() + chrono::Duration::milliseconds(175))
        );

        assert_eq!(parsed.development[0].categories, vec![DependencyCategory::Optional]);
        assert_eq!(parsed.development[1].declared_range.as_deref(), Some(">=8.1"));
    }

    #[test]
    fn test_reparsing_is_deterministic() {
        let (_dir, found) = project(PYPROJECT, UV_LOCK_R3);
        let parser = UvParser::new();

        let first = parser.parse(&found).unwrap();
        let second = parser.parse(&found).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_older_revision_uses_pyproject_specifiers() {
        let lock = UV_LOCK_R3.replace("revision = 3", "revision = 2");
        let (_dir, found) = project(PYPROJECT, &lock);
        let parsed = UvParser::new().parse(&found).unwrap();

        let requests = &parsed.production[0];
        assert_eq!(requests.declared_range.as_deref(), Some(">=2.30"));
        assert_eq!(parsed.development[1].declared_range.as_deref(), Some(">=8"));
    }

    #[test]
    fn test_root_found_through_virtual_source() {
        let lock = r#"
version = 1
revision = 3

[[package]]
name = "workspace-root"
version = "0.0.0"
source = { virtual = "." }
dependencies = [{ name = "six" }]

[[package]]
name = "six"
version = "1.16.0"
source = { registry = "https://pypi.org/simple" }
"#;
        let (_dir, found) = project("[tool.uv]\npackage = false\n", lock);
        let parsed = UvParser::new().parse(&found).unwrap();

        assert_eq!(parsed.project_name.as_deref(), Some("workspace-root"));
        assert_eq!(parsed.production.len(), 1);
        assert_eq!(parsed.production[0].installed_version, "1.16.0");
    }

    #[test]
    fn test_unsupported_version() {
        let (_dir, found) = project(PYPROJECT, "version = 2\nrevision = 1\n");
        match UvParser::new().parse(&found).unwrap_err() {
            LockfileParsingError::UnsupportedSchema { header, .. } => {
                assert_eq!(header, "revision = 1, version = 2");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_root_package() {
        let lock = "version = 1\nrevision = 3\n\n[[package]]\nname = \"six\"\nversion = \"1.16.0\"\n";
        let (_dir, found) = project(PYPROJECT, lock);
        assert!(matches!(
            UvParser::new().parse(&found),
            Err(LockfileParsingError::MissingField { .. })
        ));
    }
}
