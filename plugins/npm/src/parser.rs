use driftwatch_core::error::LockfileParsingError;
use driftwatch_core::lockfile::{self, LockfileHeader, SchemaRule};
use driftwatch_core::plugin::{EcosystemMatch, ParsedDependencies, Parser};
use driftwatch_core::types::{Dependency, DependencyCategory, PackageManager};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeclarationTable {
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    peer_dependencies: BTreeMap<String, String>,
}

impl DeclarationTable {
    fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
            && self.dev_dependencies.is_empty()
            && self.optional_dependencies.is_empty()
            && self.peer_dependencies.is_empty()
    }

    fn groups(&self) -> [(&BTreeMap<String, String>, DependencyCategory); 4] {
        [
            (&self.dependencies, DependencyCategory::Runtime),
            (&self.dev_dependencies, DependencyCategory::Development),
            (&self.optional_dependencies, DependencyCategory::Optional),
            (&self.peer_dependencies, DependencyCategory::Peer),
        ]
    }
}

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    name: Option<String>,
    #[serde(flatten)]
    declared: DeclarationTable,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageLock {
    name: Option<String>,
    lockfile_version: Option<i64>,
    packages: Option<BTreeMap<String, LockedPackage>>,
    dependencies: Option<BTreeMap<String, LegacyDependency>>,
}

#[derive(Debug, Deserialize)]
struct LockedPackage {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    link: bool,
    #[serde(flatten)]
    declared: DeclarationTable,
}

#[derive(Debug, Deserialize)]
struct LegacyDependency {
    version: Option<String>,
}

struct NpmDocument {
    lockfile: PathBuf,
    manifest: PackageJson,
    lock: PackageLock,
}

fn is_v3(header: &LockfileHeader) -> bool {
    header.int("lockfileVersion") == Some(3)
}

fn is_v2(header: &LockfileHeader) -> bool {
    header.int("lockfileVersion") == Some(2)
}

fn is_v1(header: &LockfileHeader) -> bool {
    header.int("lockfileVersion") == Some(1)
}

const RULES: &[SchemaRule<NpmDocument>] = &[
    SchemaRule {
        condition: "lockfileVersion == 3",
        matches: is_v3,
        parse: parse_packages,
    },
    SchemaRule {
        condition: "lockfileVersion == 2",
        matches: is_v2,
        parse: parse_packages,
    },
    SchemaRule {
        condition: "lockfileVersion == 1",
        matches: is_v1,
        parse: parse_legacy,
    },
];

#[derive(Debug, Default)]
struct Declared {
    range: Option<String>,
    categories: Vec<DependencyCategory>,
}

fn collect_declarations(table: &DeclarationTable) -> BTreeMap<String, Declared> {
    let mut declared: BTreeMap<String, Declared> = BTreeMap::new();
    for (group, category) in table.groups() {
        for (name, range) in group {
            let entry = declared.entry(name.clone()).or_default();
            // runtime ranges win over dev/optional/peer ones
            if entry.range.is_none() {
                entry.range = Some(range.clone());
            }
            entry.categories.push(category);
        }
    }
    declared
}

fn assemble(
    document: &NpmDocument,
    project_name: Option<String>,
    declarations: &DeclarationTable,
    resolve: impl Fn(&str) -> Option<String>,
) -> ParsedDependencies {
    let mut parsed = ParsedDependencies {
        project_name,
        ..Default::default()
    };

    for (name, declared) in collect_declarations(declarations) {
        if parsed.project_name.as_deref() == Some(name.as_str()) {
            continue;
        }
        let Some(installed) = resolve(&name) else {
            tracing::warn!(
                lockfile = %document.lockfile.display(),
                package = %name,
                "declared dependency has no installed version in the lockfile, skipping"
            );
            continue;
        };

        let mut dependency = Dependency::new(&name, installed).with_range(declared.range);
        for category in declared.categories {
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

/// `packages` map keyed by install path; `""` is the project itself.
fn parse_packages(document: &NpmDocument) -> Result<ParsedDependencies, LockfileParsingError> {
    let packages = document
        .lock
        .packages
        .as_ref()
        .ok_or_else(|| LockfileParsingError::MissingField {
            path: document.lockfile.clone(),
            field: "packages".to_string(),
        })?;

    let root = packages.get("");
    let declarations = match root {
        Some(entry) if !entry.declared.is_empty() => &entry.declared,
        _ => &document.manifest.declared,
    };

    let project_name = document
        .manifest
        .name
        .clone()
        .or_else(|| root.and_then(|entry| entry.name.clone()))
        .or_else(|| document.lock.name.clone());

    Ok(assemble(document, project_name, declarations, |name| {
        let entry = packages.get(&format!("node_modules/{}", name))?;
        if entry.link {
            return None;
        }
        entry.version.clone()
    }))
}

/// Lockfile v1 keeps a nested `dependencies` tree; direct ones sit at the top level.
fn parse_legacy(document: &NpmDocument) -> Result<ParsedDependencies, LockfileParsingError> {
    let dependencies = document
        .lock
        .dependencies
        .as_ref()
        .ok_or_else(|| LockfileParsingError::MissingField {
            path: document.lockfile.clone(),
            field: "dependencies".to_string(),
        })?;

    let project_name = document
        .manifest
        .name
        .clone()
        .or_else(|| document.lock.name.clone());

    Ok(assemble(document, project_name, &document.manifest.declared, |name| {
        dependencies.get(name).and_then(|entry| entry.version.clone())
    }))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LockfileParsingError> {
    let content = lockfile::read_file(path)?;
    serde_json::from_str(&content).map_err(|source| LockfileParsingError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub struct NpmParser;

impl NpmParser {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NpmParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for NpmParser {
    fn package_manager(&self) -> PackageManager {
        PackageManager::Npm
    }

    fn parse(&self, found: &EcosystemMatch) -> Result<ParsedDependencies, LockfileParsingError> {
        let manifest: PackageJson = read_json(&found.manifest)?;
        let lock: PackageLock = read_json(&found.lockfile)?;

        let header = LockfileHeader::new().with_int("lockfileVersion", lock.lockfile_version);
        let document = NpmDocument {
            lockfile: found.lockfile.clone(),
            manifest,
            lock,
        };

        lockfile::dispatch(RULES, &header, &found.lockfile, &document)
    }
}
