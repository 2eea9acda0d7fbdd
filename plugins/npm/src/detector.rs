use driftwatch_core::plugin::{Detector, EcosystemMatch};
use driftwatch_core::types::PackageManager;
use std::path::Path;

/// `package.json` next to `package-lock.json` in the project root.
pub struct NpmDetector;

impl NpmDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NpmDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for NpmDetector {
    fn package_manager(&self) -> PackageManager {
        PackageManager::Npm
    }

    fn detect(&self, root: &Path) -> Option<EcosystemMatch> {
        let found = EcosystemMatch::new(PackageManager::Npm, root);
        if found.manifest.is_file() && found.lockfile.is_file() {
            Some(found)
        } else {
            None
        }
    }
}
