use crate::detector::NpmDetector;
use crate::parser::NpmParser;
use crate::registry::{NpmRegistryClient, DEFAULT_REGISTRY_URL};
use driftwatch_core::http::HttpClient;
use driftwatch_core::plugin::{Detector, Parser, Plugin, RegistryClient};
use driftwatch_core::types::Ecosystem;
use std::sync::Arc;

pub struct NpmPlugin {
    client: HttpClient,
    registry_url: String,
}

impl NpmPlugin {
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

impl Plugin for NpmPlugin {
    fn name(&self) -> &'static str {
        "npm"
    }

    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn create_detectors(&self) -> Vec<Box<dyn Detector>> {
        vec![Box::new(NpmDetector::new())]
    }

    fn create_parsers(&self) -> Vec<Box<dyn Parser>> {
        vec![Box::new(NpmParser::new())]
    }

    fn create_registry_client(&self) -> Option<Arc<dyn RegistryClient>> {
        let client = NpmRegistryClient::new(self.client.clone()).with_base_url(self.registry_url.as_str());
        Some(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::config::HttpConfig;
    use driftwatch_core::plugin::PluginRegistry;
    use driftwatch_core::types::PackageManager;

    #[test]
    fn test_registers_npm_components() {
        let client = HttpClient::new(&HttpConfig::default()).unwrap();
        let mut registry = PluginRegistry::new();
        registry.register_plugin(NpmPlugin::new(client));

        assert!(registry.get_detector(PackageManager::Npm).is_some());
        assert!(registry.get_parser(PackageManager::Npm).is_some());
        assert!(registry.get_registry_client(Ecosystem::Npm).is_some());
        assert!(registry.get_registry_client(Ecosystem::PyPI).is_none());
    }
}
