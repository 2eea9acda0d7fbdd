//! Pure drift computation over a registry's version list.
//!
//! Release distance counts the known, still-published versions `v` with
//! `installed <= v <= latest`, both endpoints included, and is `0` when the
//! installed version is the latest.

use crate::plugin::PackageVersions;
use crate::types::{Dependency, DriftCategory, LookupSource, LookupWarning, VersionScheme};
use crate::version::{Availability, Version, VersionComparator};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct DriftComputation {
    pub installed: Option<Version>,
    pub latest: Option<Version>,
    pub release_distance: Option<usize>,
    pub time_lag_days: Option<i64>,
    pub category: DriftCategory,
    pub warnings: Vec<LookupWarning>,
}

fn is_listed(version: &Version) -> bool {
    !matches!(version.availability, Some(Availability::Unpublished))
}

fn is_installable(version: &Version) -> bool {
    !matches!(
        version.availability,
        Some(Availability::Unpublished) | Some(Availability::Yanked)
    )
}

fn max_by_order<'a>(candidates: impl Iterator<Item = &'a Version>) -> Option<&'a Version> {
    candidates.max_by(|a, b| VersionComparator::compare(a, b).unwrap_or(Ordering::Equal))
}

/// The registry's declared latest when it names a listed version, otherwise the
/// greatest installable stable release, otherwise the greatest listed version.
pub fn select_latest(known: &PackageVersions) -> Option<&Version> {
    if let Some(declared) = &known.latest {
        let parsed = known
            .versions
            .first()
            .and_then(|v| Version::parse(declared, v.scheme).ok());
        let declared_match = known.versions.iter().filter(|v| is_listed(v)).find(|v| {
            v.raw == *declared
                || parsed
                    .as_ref()
                    .is_some_and(|d| VersionComparator::equal(v, d).unwrap_or(false))
        });
        if declared_match.is_some() {
            return declared_match;
        }
    }

    max_by_order(known.versions.iter().filter(|v| is_installable(v) && !v.is_prerelease()))
        .or_else(|| max_by_order(known.versions.iter().filter(|v| is_listed(v))))
}

fn days_between(from: Option<DateTime<Utc>>, to: DateTime<Utc>) -> Option<i64> {
    from.map(|published| (to - published).num_days().max(0))
}

pub fn compute_drift(
    dependency: &Dependency,
    scheme: VersionScheme,
    known: &PackageVersions,
    reference_time: DateTime<Utc>,
) -> DriftComputation {
    let mut warnings = Vec::new();
    let latest = select_latest(known).cloned();

    let parsed = match Version::parse(&dependency.installed_version, scheme) {
        Ok(v) => v,
        Err(e) => {
            warnings.push(LookupWarning::new(LookupSource::Version, e.to_string()));
            return DriftComputation {
                installed: None,
                latest,
                release_distance: None,
                time_lag_days: days_between(dependency.locked_upload_time, reference_time),
                category: DriftCategory::Unknown,
                warnings,
            };
        }
    };

    let registry_entry = known
        .versions
        .iter()
        .find(|v| VersionComparator::equal(v, &parsed).unwrap_or(false));

    let Some(entry) = registry_entry else {
        warnings.push(LookupWarning::new(
            LookupSource::Registry,
            format!("installed version {} is not among the registry's known versions", parsed.raw),
        ));
        let installed = parsed.with_published_at(dependency.locked_upload_time);
        return DriftComputation {
            time_lag_days: days_between(installed.published_at, reference_time),
            installed: Some(installed),
            latest,
            release_distance: None,
            category: DriftCategory::Unknown,
            warnings,
        };
    };

    let mut installed = entry.clone();
    installed.raw = parsed.raw.clone();
    if installed.published_at.is_none() {
        installed = installed.with_published_at(dependency.locked_upload_time);
    }
    let time_lag_days = days_between(installed.published_at, reference_time);

    if installed.is_unpublished() {
        warnings.push(LookupWarning::new(
            LookupSource::Registry,
            format!("installed version {} was unpublished", installed.raw),
        ));
        return DriftComputation {
            installed: Some(installed),
            latest: None,
            release_distance: None,
            time_lag_days,
            category: DriftCategory::Unknown,
            warnings,
        };
    }

    let Some(latest) = latest else {
        warnings.push(LookupWarning::new(
            LookupSource::Registry,
            "registry lists no usable latest version",
        ));
        return DriftComputation {
            installed: Some(installed),
            latest: None,
            release_distance: None,
            time_lag_days,
            category: DriftCategory::Unknown,
            warnings,
        };
    };

    let (category, release_distance) = match VersionComparator::compare(&installed, &latest) {
        Ok(Ordering::Less) => {
            let distance = known
                .versions
                .iter()
                .filter(|v| is_listed(v))
                .filter(|v| {
                    matches!(
                        VersionComparator::compare(v, &installed),
                        Ok(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        VersionComparator::compare(v, &latest),
                        Ok(Ordering::Less | Ordering::Equal)
                    )
                })
                .count();
            let category = VersionComparator::classify_drift(&installed, &latest)
                .unwrap_or(DriftCategory::Unknown);
            (category, Some(distance))
        }
        Ok(Ordering::Equal) => (DriftCategory::Latest, Some(0)),
        Ok(Ordering::Greater) => {
            tracing::debug!(
                package = %dependency.name,
                installed = %installed.raw,
                latest = %latest.raw,
                "installed version is ahead of the registry's latest"
            );
            (DriftCategory::Latest, Some(0))
        }
        Err(e) => {
            warnings.push(LookupWarning::new(LookupSource::Version, e.to_string()));
            (DriftCategory::Unknown, None)
        }
    };

    DriftComputation {
        installed: Some(installed),
        latest: Some(latest),
        release_distance,
        time_lag_days,
        category,
        warnings,
    }
}
