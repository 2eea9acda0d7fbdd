//! PEP 751 `pylock.toml`. The lock carries no project entry, so direct
//! dependencies come from `pyproject.toml`.

use crate::pyproject::{assemble, Pinned, PyProject};
use crate::requirement::{earliest_upload_time, normalize_name};
use driftwatch_core::error::LockfileParsingError;
use driftwatch_core::lockfile::{self, LockfileHeader, SchemaRule};
use driftwatch_core::plugin::{EcosystemMatch, ParsedDependencies, Parser};
use driftwatch_core::types::PackageManager;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PyLock {
    lock_version: Option<String>,
    #[serde(default)]
    packages: Vec<LockedPackage>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: String,
    /// Absent for directory and VCS entries such as the project itself.
    version: Option<String>,
    sdist: Option<toml::Value>,
    #[serde(default)]
    wheels: Vec<toml::Value>,
}

struct PyLockDocument {
    lockfile: PathBuf,
    pyproject: PyProject,
    lock: PyLock,
}

fn parse_v1(document: &PyLockDocument) -> Result<ParsedDependencies, LockfileParsingError> {
    let project_name = document.pyproject.project_name().map(str::to_string);
    Ok(assemble(
        &document.lockfile,
        project_name,
        document.pyproject.declarations(),
        |name| {
            let package = document
                .lock
                .packages
                .iter()
                .find(|p| p.version.is_some() && normalize_name(&p.name) == name)?;
            Some(Pinned {
                version: package.version.clone()?,
                uploaded: earliest_upload_time(package.sdist.iter().chain(package.wheels.iter())),
            })
        },
    ))
}

fn is_v1_0(header: &LockfileHeader) -> bool {
    header.str("lock-version") == Some("1.0")
}

const RULES: &[SchemaRule<PyLockDocument>] = &[SchemaRule {
    condition: "lock-version == \"1.0\"",
    matches: is_v1_0,
    parse: parse_v1,
}];

pub struct PyLockParser;

impl PyLockParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PyLockParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for PyLockParser {
    fn package_manager(&self) -> PackageManager {
        PackageManager::Pylock
    }

    fn parse(&self, found: &EcosystemMatch) -> Result<ParsedDependencies, LockfileParsingError> {
        let pyproject = PyProject::load(&found.manifest)?;
        let content = lockfile::read_file(&found.lockfile)?;
        let lock: PyLock = toml::from_str(&content).map_err(|e| LockfileParsingError::Toml {
            path: found.lockfile.clone(),
            message: e.to_string(),
        })?;

        let header = LockfileHeader::new().with_str("lock-version", lock.lock_version.as_deref());
        let document = PyLockDocument {
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
    use driftwatch_core::types::DependencyCategory;
    use std::fs;
    use tempfile::TempDir;

    const PYPROJECT: &str = r#"
[project]
name = "demo"
dependencies = ["Requests>=2.31", "charset_normalizer"]

[dependency-groups]
test = ["pytest"]
"#;

    const PYLOCK: &str = r#"
lock-version = "1.0"
created-by = "pip"
requires-python = ">=3.12"

[[packages]]
name = "demo"
directory = { path = ".", editable = true }

[[packages]]
name = "requests"
version = "2.31.0"

[packages.sdist]
url = "https://files/requests.tar.gz"
upload-time = 2023-05-22T15:12:44Z

[[packages.wheels]]
url = "https://files/requests.whl"
upload-time = 2023-05-22T15:12:42Z

[[packages]]
name = "charset-normalizer"
version = "3.3.2"

[[packages]]
name = "pytest"
version = "8.1.1"
"#;

    fn project(pyproject: &str, lock: &str) -> (TempDir, EcosystemMatch) {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("pyproject.toml"), pyproject).unwrap();
        fs::write(temp_dir.path().join("pylock.toml"), lock).unwrap();
        let found = EcosystemMatch::new(PackageManager::Pylock, temp_dir.path());
        (temp_dir, found)
    }

    #[test]
    fn test_parse_pylock() {
        let (_dir, found) = project(PYPROJECT, PYLOCK);
        let parsed = PyLockParser::new().parse(&found).unwrap();

        let production: Vec<&str> = parsed.production.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(production, vec!["requests", "charset-normalizer"]);
        assert_eq!(parsed.development.len(), 1);
        assert_eq!(parsed.development[0].categories, vec![DependencyCategory::Development]);

        let requests = &parsed.production[0];
        assert_eq!(requests.installed_version, "2.31.0");
        assert_eq!(requests.declared_range.as_deref(), Some(">=2.31"));
        assert_eq!(
            requests.locked_upload_time,
            Some(Utc.with_ymd_and_hms(2023, 5, 22, 15, 12, 42).unwrap())
        );
        assert_eq!(parsed.production[1].locked_upload_time, None);
    }

    #[test]
    fn test_unsupported_lock_version() {
        let (_dir, found) = project(PYPROJECT, "lock-version = \"2.0\"\n");
        match PyLockParser::new().parse(&found).unwrap_err() {
            LockfileParsingError::UnsupportedSchema { header, .. } => {
                assert_eq!(header, "lock-version = \"2.0\"");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_toml() {
        let (_dir, found) = project(PYPROJECT, "lock-version = ");
        assert!(matches!(
            PyLockParser::new().parse(&found),
            Err(LockfileParsingError::Toml { .. })
        ));
    }
}
