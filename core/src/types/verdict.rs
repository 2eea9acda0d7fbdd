use serde::Serialize;
use std::collections::BTreeSet;

use super::dependency::Dependency;
use super::repository::SourceHistory;
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftCategory {
    Latest,
    Patch,
    Minor,
    Major,
    Unknown,
}

impl DriftCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriftCategory::Latest => "latest",
            DriftCategory::Patch => "patch",
            DriftCategory::Minor => "minor",
            DriftCategory::Major => "major",
            DriftCategory::Unknown => "unknown",
        }
    }

    /// Report ordering, most urgent first.
    pub fn priority(&self) -> u8 {
        match self {
            DriftCategory::Major => 0,
            DriftCategory::Minor => 1,
            DriftCategory::Patch => 2,
            DriftCategory::Unknown => 3,
            DriftCategory::Latest => 4,
        }
    }
}

impl std::fmt::Display for DriftCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LookupSource {
    Version,
    Registry,
    Repository,
    Advisories,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupWarning {
    pub source: LookupSource,
    pub message: String,
}

impl LookupWarning {
    pub fn new(source: LookupSource, message: impl Into<String>) -> Self {
        Self {
            source,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for LookupWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let source = match self.source {
            LookupSource::Version => "version",
            LookupSource::Registry => "registry",
            LookupSource::Repository => "repository",
            LookupSource::Advisories => "advisories",
        };
        write!(f, "{}: {}", source, self.message)
    }
}

/// Computed drift for one dependency. Never mutated after assembly.
#[derive(Debug, Clone, Serialize)]
pub struct DriftVerdict {
    pub dependency: Dependency,
    /// `None` only when the lockfile string is not a valid version for the ecosystem.
    pub installed: Option<Version>,
    pub latest: Option<Version>,
    pub release_distance: Option<usize>,
    pub time_lag_days: Option<i64>,
    pub category: DriftCategory,
    pub advisories: BTreeSet<String>,
    /// Distinguishes "checked, none found" from "lookup failed".
    pub advisories_checked: bool,
    pub source_history: Option<SourceHistory>,
    pub warnings: Vec<LookupWarning>,
}

impl DriftVerdict {
    pub fn is_partial(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.dependency.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drift_category_as_str() {
        assert_eq!(DriftCategory::Latest.as_str(), "latest");
        assert_eq!(DriftCategory::Major.as_str(), "major");
        assert_eq!(DriftCategory::Unknown.as_str(), "unknown");
    }

    #[test]
    fn test_drift_category_priority() {
        assert!(DriftCategory::Major.priority() < DriftCategory::Minor.priority());
        assert!(DriftCategory::Minor.priority() < DriftCategory::Patch.priority());
        assert!(DriftCategory::Patch.priority() < DriftCategory::Unknown.priority());
        assert!(DriftCategory::Unknown.priority() < DriftCategory::Latest.priority());
    }
}
