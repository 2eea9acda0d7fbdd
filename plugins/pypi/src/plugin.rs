use crate::detector::PairDetector;
use crate::pylock::PyLockParser;
use crate::registry::{PyPiClient, DEFAULT_REGISTRY_URL};
use crate::requirements::RequirementsParser;
use crate::uv::UvParser;
use driftwatch_core::http::HttpClient;
use driftwatch_core::plugin::{Detector, Parser, Plugin, RegistryClient};
use driftwatch_core::types::Ecosystem;
use std::sync::Arc;

/// uv, PEP 751 and `requirements.txt` adapters sharing one PyPI client.
pub struct PyPiPlugin {
    client: HttpClient,
    registry_url: String,
}

impl PyPiPlugin {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
        }
    }

    pub fn with_registry_url(mut self, registry_url: impl Into<String>) -> Self {
        self.registry_url = registry_url.into();
        self
    }
}

impl Plugin for PyPiPlugin {
    fn name(&self) -> &'static str {
        "pypi"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::PyPI
    }

    fn create_detectors(&self) -> Vec<Box<dyn Detector>> {
        vec![
            Box::new(PairDetector::uv()),
            Box::new(PairDetector::pylock()),
            Box::new(PairDetector::requirements()),
        ]
    }

    fn create_parsers(&self) -> Vec<Box<dyn Parser>> {
        vec![
            Box::new(UvParser::new()),
            Box::new(PyLockParser::new()),
            Box::new(RequirementsParser::new()),
        ]
    }

    fn create_registry_client(&self) -> Option<Arc<dyn RegistryClient>> {
        let client = PyPiClient::new(self.client.clone()).with_base_url(self.registry_url.as_str());
        Some(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::config::HttpConfig;
    use driftwatch_core::plugin::PluginRegistry;
    use driftwatch_core::types::PackageManager;
    use std::fs;
    use tempfile::TempDir;

    fn registry() -> PluginRegistry {
        let client = HttpClient::new(&HttpConfig::default()).unwrap();
        let mut registry = PluginRegistry::new();
        registry.register_plugin(PyPiPlugin::new(client));
        registry
    }

    #[test]
    fn test_registers_every_python_adapter() {
        let registry = registry();
        for manager in Ecosystem::PyPI.package_managers() {
            assert!(registry.get_detector(manager).is_some(), "{manager}");
            assert!(registry.get_parser(manager).is_some(), "{manager}");
        }
        assert!(registry.get_registry_client(Ecosystem::PyPI).is_some());
    }

    #[test]
    fn test_uv_wins_over_requirements() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("pyproject.toml"), "[project]\nname = \"demo\"\n").unwrap();
        fs::write(temp_dir.path().join("uv.lock"), "version = 1\n").unwrap();
        fs::write(temp_dir.path().join("requirements.txt"), "six==1.16.0\n").unwrap();

        let detection = registry().detect(temp_dir.path(), None).unwrap();
        assert_eq!(detection.selected.package_manager, PackageManager::Uv);
        assert_eq!(detection.shadowed, vec![PackageManager::PipRequirements]);
    }
}
