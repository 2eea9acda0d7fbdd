use crate::error::{DetectionError, LockfileParsingError, MiningError, RegistryError, VulnerabilityFeedError};
use crate::types::{Dependency, Ecosystem, PackageManager, RepoRef, RepositoryId, DETECTION_ORDER};
use crate::version::Version;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Manifest/lockfile pair found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcosystemMatch {
    pub package_manager: PackageManager,
    pub root: PathBuf,
    pub manifest: PathBuf,
    pub lockfile: PathBuf,
}

impl EcosystemMatch {
    pub fn new(package_manager: PackageManager, root: &Path) -> Self {
        Self {
            package_manager,
            root: root.to_path_buf(),
            manifest: root.join(package_manager.manifest_file()),
            lockfile: root.join(package_manager.lockfile_file()),
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.package_manager.ecosystem()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDependencies {
    pub project_name: Option<String>,
    pub production: Vec<Dependency>,
    pub development: Vec<Dependency>,
}

/// Whether a registry field exists for this ecosystem at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FieldValue<T> {
    Present(T),
    /// The registry has the field but this package leaves it empty.
    Missing,
    /// The registry never publishes this field.
    NotSupported,
}

impl<T> FieldValue<T> {
    pub fn as_option(&self) -> Option<&T> {
        match self {
            FieldValue::Present(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PackageVersions {
    /// Ascending in the ecosystem's version order.
    pub versions: Vec<Version>,
    /// The registry's own notion of latest, when it declares one.
    pub latest: Option<String>,
    pub repository_url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackageMetadata {
    pub runtime_requirements: FieldValue<Vec<String>>,
    pub development_requirements: FieldValue<Vec<String>>,
    pub engines: FieldValue<Vec<String>>,
    pub repository_url: Option<String>,
}

pub trait Detector: Send + Sync {
    fn package_manager(&self) -> PackageManager;

    /// Existence checks only; nothing is read.
    fn detect(&self, root: &Path) -> Option<EcosystemMatch>;
}

pub trait Parser: Send + Sync {
    fn package_manager(&self) -> PackageManager;

    fn parse(&self, found: &EcosystemMatch) -> Result<ParsedDependencies, LockfileParsingError>;
}

#[async_trait]
pub trait RegistryClient: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    async fn versions(&self, name: &str) -> Result<PackageVersions, RegistryError>;

    async fn metadata(&self, name: &str) -> Result<PackageMetadata, RegistryError>;
}

#[async_trait]
pub trait AdvisorySource: Send + Sync {
    async fn advisories_for(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
    ) -> Result<BTreeSet<String>, VulnerabilityFeedError>;
}

/// Lazy cursor over a repository's releases and tags. Each call issues at most one request.
#[async_trait]
pub trait HistoryPages: Send {
    async fn next_page(&mut self) -> Result<Option<Vec<RepoRef>>, MiningError>;
}

pub trait RepositoryMiner: Send + Sync {
    fn is_authenticated(&self) -> bool;

    fn page_ceiling(&self) -> usize;

    fn releases_and_tags(&self, repo: &RepositoryId) -> Result<Box<dyn HistoryPages>, MiningError>;
}

pub trait Plugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn ecosystem(&self) -> Ecosystem;

    fn create_detectors(&self) -> Vec<Box<dyn Detector>> { Vec::new() }
    fn create_parsers(&self) -> Vec<Box<dyn Parser>> { Vec::new() }
    fn create_registry_client(&self) -> Option<Arc<dyn RegistryClient>> { None }
}

/// Outcome of a detection pass.
#[derive(Debug, Clone)]
pub struct Detection {
    pub selected: EcosystemMatch,
    /// Other pairs present on disk that lost on priority.
    pub shadowed: Vec<PackageManager>,
}

pub struct PluginRegistry {
    detectors: Vec<(PackageManager, Box<dyn Detector>)>,
    parsers: Vec<(PackageManager, Box<dyn Parser>)>,
    registry_clients: Vec<(Ecosystem, Arc<dyn RegistryClient>)>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            detectors: Vec::new(),
            parsers: Vec::new(),
            registry_clients: Vec::new(),
        }
    }

    pub fn register_detector(&mut self, detector: Box<dyn Detector>) {
        self.detectors.push((detector.package_manager(), detector));
    }

    pub fn register_parser(&mut self, parser: Box<dyn Parser>) {
        self.parsers.push((parser.package_manager(), parser));
    }

    pub fn register_registry_client(&mut self, client: Arc<dyn RegistryClient>) {
        self.registry_clients.push((client.ecosystem(), client));
    }

    pub fn register_plugin<P: Plugin + 'static>(&mut self, plugin: P) {
        tracing::debug!(plugin = plugin.name(), ecosystem = %plugin.ecosystem(), "registering plugin");
        for detector in plugin.create_detectors() {
            self.register_detector(detector);
        }
        for parser in plugin.create_parsers() {
            self.register_parser(parser);
        }
        if let Some(client) = plugin.create_registry_client() {
            self.register_registry_client(client);
        }
    }

    pub fn get_detector(&self, manager: PackageManager) -> Option<&dyn Detector> {
        self.detectors.iter()
            .find(|(m, _)| *m == manager)
            .map(|(_, d)| d.as_ref())
    }

    pub fn get_parser(&self, manager: PackageManager) -> Option<&dyn Parser> {
        self.parsers.iter()
            .find(|(m, _)| *m == manager)
            .map(|(_, p)| p.as_ref())
    }

    pub fn get_registry_client(&self, ecosystem: Ecosystem) -> Option<Arc<dyn RegistryClient>> {
        self.registry_clients.iter()
            .find(|(e, _)| *e == ecosystem)
            .map(|(_, c)| Arc::clone(c))
    }

    /// Probes detectors in `DETECTION_ORDER`, independent of registration order.
    pub fn detect(
        &self,
        root: &Path,
        requested: Option<PackageManager>,
    ) -> Result<Detection, DetectionError> {
        if let Some(manager) = requested {
            let selected = self
                .get_detector(manager)
                .and_then(|d| d.detect(root))
                .ok_or_else(|| DetectionError::OverrideNotPresent {
                    root: root.to_path_buf(),
                    manager,
                })?;
            return Ok(Detection {
                selected,
                shadowed: Vec::new(),
            });
        }

        let mut found = DETECTION_ORDER
            .iter()
            .filter_map(|manager| self.get_detector(*manager))
            .filter_map(|detector| detector.detect(root));

        if let Some(selected) = found.next() {
            let shadowed = found.map(|m| m.package_manager).collect();
            return Ok(Detection { selected, shadowed });
        }

        let orphan = DETECTION_ORDER
            .iter()
            .filter(|m| m.manifest_file() != m.lockfile_file())
            .map(|m| m.manifest_file())
            .find(|manifest| root.join(manifest).is_file());

        match orphan {
            Some(manifest) => Err(DetectionError::ManifestWithoutLockfile {
                root: root.to_path_buf(),
                manifest,
            }),
            None => Err(DetectionError::NoRecognizedEcosystem {
                root: root.to_path_buf(),
            }),
        }
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
