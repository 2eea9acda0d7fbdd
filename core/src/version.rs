use crate::error::VersionError;
use crate::pep440::Pep440Version;
use crate::types::{DriftCategory, RepoRef, VersionScheme};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Deprecated,
    Yanked,
    Unpublished,
}

#[derive(Debug, Clone)]
enum Parsed {
    SemVer(semver::Version),
    Pep440(Pep440Version),
}

/// An ecosystem-scoped version. Comparable only with versions of the same scheme.
#[derive(Debug, Clone, Serialize)]
pub struct Version {
    pub raw: String,
    pub scheme: VersionScheme,
    #[serde(skip)]
    parsed: Parsed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation: Option<RepoRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
    pub low_confidence: bool,
}

impl Version {
    pub fn parse(raw: &str, scheme: VersionScheme) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        let invalid = || VersionError::Invalid {
            raw: raw.to_string(),
            scheme,
        };

        let parsed = match scheme {
            VersionScheme::SemVer => {
                Parsed::SemVer(semver::Version::parse(trimmed).map_err(|_| invalid())?)
            }
            VersionScheme::Pep440 => Parsed::Pep440(Pep440Version::parse(trimmed).ok_or_else(invalid)?),
        };

        Ok(Self {
            raw: trimmed.to_string(),
            scheme,
            parsed,
            published_at: None,
            correlation: None,
            availability: None,
            low_confidence: false,
        })
    }

    /// Records the publish time and flags versions that predate strict
    /// enforcement of the scheme.
    pub fn with_published_at(mut self, published_at: Option<DateTime<Utc>>) -> Self {
        self.published_at = published_at;
        self.low_confidence = match (published_at, self.scheme.enforced_since()) {
            (Some(published), Some(since)) => published < since,
            _ => false,
        };
        self
    }

    pub fn with_availability(mut self, availability: Availability) -> Self {
        self.availability = Some(availability);
        self
    }

    pub fn with_correlation(mut self, correlation: Option<RepoRef>) -> Self {
        self.correlation = correlation;
        self
    }

    pub fn is_prerelease(&self) -> bool {
        match &self.parsed {
            Parsed::SemVer(v) => !v.pre.is_empty(),
            Parsed::Pep440(v) => v.is_prerelease(),
        }
    }

    pub fn is_unpublished(&self) -> bool {
        self.availability == Some(Availability::Unpublished)
    }

    /// Canonical rendering. PEP 440 keeps trailing release zeros, so compare
    /// with [`VersionComparator::equal`] rather than by rendering.
    pub fn normalized(&self) -> String {
        match &self.parsed {
            Parsed::SemVer(v) => v.to_string(),
            Parsed::Pep440(v) => v.to_string(),
        }
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

pub struct VersionComparator;

impl VersionComparator {
    /// Total order within one scheme. Mixing schemes is an error, never a guess.
    pub fn compare(a: &Version, b: &Version) -> Result<Ordering, VersionError> {
        match (&a.parsed, &b.parsed) {
            (Parsed::SemVer(x), Parsed::SemVer(y)) => Ok(x.cmp(y)),
            (Parsed::Pep440(x), Parsed::Pep440(y)) => Ok(x.cmp(y)),
            _ => Err(VersionError::Incomparable {
                left: a.scheme,
                right: b.scheme,
            }),
        }
    }

    pub fn equal(a: &Version, b: &Version) -> Result<bool, VersionError> {
        Ok(Self::compare(a, b)? == Ordering::Equal)
    }

    /// Tier of the most significant differing segment.
    pub fn classify_drift(installed: &Version, latest: &Version) -> Result<DriftCategory, VersionError> {
        if Self::equal(installed, latest)? {
            return Ok(DriftCategory::Latest);
        }

        let category = match (&installed.parsed, &latest.parsed) {
            (Parsed::SemVer(i), Parsed::SemVer(l)) => {
                if i.major != l.major {
                    DriftCategory::Major
                } else if i.minor != l.minor {
                    DriftCategory::Minor
                } else {
                    DriftCategory::Patch
                }
            }
            (Parsed::Pep440(i), Parsed::Pep440(l)) => {
                if i.epoch != l.epoch {
                    DriftCategory::Major
                } else {
                    match i.first_release_difference(l) {
                        Some(0) => DriftCategory::Major,
                        Some(1) => DriftCategory::Minor,
                        _ => DriftCategory::Patch,
                    }
                }
            }
            _ => {
                return Err(VersionError::Incomparable {
                    left: installed.scheme,
                    right: latest.scheme,
                })
            }
        };

        Ok(category)
    }

    pub fn sort(versions: &mut [Version]) -> Result<(), VersionError> {
        if let Some(first) = versions.first() {
            let scheme = first.scheme;
            if let Some(other) = versions.iter().find(|v| v.scheme != scheme) {
                return Err(VersionError::Incomparable {
                    left: scheme,
                    right: other.scheme,
                });
            }
        }
        versions.sort_by(|a, b| Self::compare(a, b).unwrap_or(Ordering::Equal));
        Ok(())
    }
}
