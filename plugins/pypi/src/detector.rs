use driftwatch_core::plugin::{Detector, EcosystemMatch};
use driftwatch_core::types::PackageManager;
use std::path::Path;

/// Matches one fixed manifest/lockfile pairing in the project root.
pub struct PairDetector {
    package_manager: PackageManager,
}

impl PairDetector {
    pub fn new(package_manager: PackageManager) -> Self {
        Self { package_manager }
    }

    pub fn uv() -> Self {
        Self::new(PackageManager::Uv)
    }

    pub fn pylock() -> Self {
        Self::new(PackageManager::Pylock)
    }

    /// `requirements.txt` is its own manifest and lockfile.
    pub fn requirements() -> Self {
        Self::new(PackageManager::PipRequirements)
    }
}

impl Detector for PairDetector {
    fn package_manager(&self) -> PackageManager {
        self.package_manager
    }

    fn detect(&self, root: &Path) -> Option<EcosystemMatch> {
        let found = EcosystemMatch::new(self.package_manager, root);
        (found.manifest.is_file() && found.lockfile.is_file()).then_some(found)
    }
}
