use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Ord, PartialOrd)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    Npm,
    PyPI,
}

impl Ecosystem {
    pub fn scheme(&self) -> VersionScheme {
        match self {
            Ecosystem::Npm => VersionScheme::SemVer,
            Ecosystem::PyPI => VersionScheme::Pep440,
        }
    }

    /// Ecosystem name as the OSV database spells it.
    pub fn osv_name(&self) -> &'static str {
        match self {
            Ecosystem::Npm => "npm",
            Ecosystem::PyPI => "PyPI",
        }
    }

    pub fn package_managers(&self) -> Vec<PackageManager> {
        DETECTION_ORDER
            .iter()
            .copied()
            .filter(|pm| pm.ecosystem() == *self)
            .collect()
    }

    pub fn manifest_files(&self) -> Vec<&'static str> {
        let mut files: Vec<&'static str> = self
            .package_managers()
            .iter()
            .map(|pm| pm.manifest_file())
            .collect();
        files.dedup();
        files
    }

    pub fn lockfile_files(&self) -> Vec<&'static str> {
        self.package_managers()
            .iter()
            .map(|pm| pm.lockfile_file())
            .collect()
    }
}

impl std::fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ecosystem::Npm => write!(f, "npm"),
            Ecosystem::PyPI => write!(f, "pypi"),
        }
    }
}

/// A tool-specific manifest/lockfile pairing within an ecosystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash, Ord, PartialOrd)]
#[serde(rename_all = "kebab-case")]
pub enum PackageManager {
    Npm,
    Uv,
    Pylock,
    PipRequirements,
}

/// Fixed detection priority. The first pair present on disk wins.
pub const DETECTION_ORDER: [PackageManager; 4] = [
    PackageManager::Npm,
    PackageManager::Uv,
    PackageManager::Pylock,
    PackageManager::PipRequirements,
];

impl PackageManager {
    pub fn ecosystem(&self) -> Ecosystem {
        match self {
            PackageManager::Npm => Ecosystem::Npm,
            PackageManager::Uv | PackageManager::Pylock | PackageManager::PipRequirements => {
                Ecosystem::PyPI
            }
        }
    }

    pub fn manifest_file(&self) -> &'static str {
        match self {
            PackageManager::Npm => "package.json",
            PackageManager::Uv | PackageManager::Pylock => "pyproject.toml",
            PackageManager::PipRequirements => "requirements.txt",
        }
    }

    pub fn lockfile_file(&self) -> &'static str {
        match self {
            PackageManager::Npm => "package-lock.json",
            PackageManager::Uv => "uv.lock",
            PackageManager::Pylock => "pylock.toml",
            PackageManager::PipRequirements => "requirements.txt",
        }
    }

    pub fn priority(&self) -> usize {
        DETECTION_ORDER
            .iter()
            .position(|pm| pm == self)
            .unwrap_or(DETECTION_ORDER.len())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Npm => "npm",
            PackageManager::Uv => "uv",
            PackageManager::Pylock => "pylock",
            PackageManager::PipRequirements => "pip",
        }
    }
}

impl std::fmt::Display for PackageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DETECTION_ORDER
            .iter()
            .copied()
            .find(|pm| pm.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let supported: Vec<&str> = DETECTION_ORDER.iter().map(|pm| pm.as_str()).collect();
                format!(
                    "Unknown package manager '{}'. Supported: {}",
                    s,
                    supported.join(", ")
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "lowercase")]
pub enum VersionScheme {
    /// Strict `major.minor.patch[-pre][+build]`.
    SemVer,
    /// Epoch, arbitrary-length release, pre/post/dev and local segments.
    Pep440,
}

impl VersionScheme {
    /// Date from which the registry started rejecting versions outside the scheme.
    /// Anything published earlier is accepted but treated as low confidence.
    pub fn enforced_since(&self) -> Option<DateTime<Utc>> {
        match self {
            VersionScheme::SemVer => Utc.with_ymd_and_hms(2014, 2, 14, 0, 0, 0).single(),
            VersionScheme::Pep440 => Utc.with_ymd_and_hms(2014, 8, 22, 0, 0, 0).single(),
        }
    }
}

impl std::fmt::Display for VersionScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VersionScheme::SemVer => write!(f, "semver"),
            VersionScheme::Pep440 => write!(f, "PEP 440"),
        }
    }
}
