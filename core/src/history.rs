//! Correlates registry versions with source-repository releases and tags.
//!
//! Pages are pulled only until both endpoints of the installed→latest range
//! are located with a commit, history runs out, or the page ceiling is hit.
//! Releases carry no commit of their own; a matching tag fills it in. Matching
//! is exact after normalization; anything else stays unresolved.

use crate::error::MiningError;
use crate::plugin::HistoryPages;
use crate::types::{Coverage, PartialReason, RefKind, RepoRef, VersionScheme};
use crate::version::{Version, VersionComparator};

#[derive(Debug, Clone)]
pub struct CorrelationRequest<'a> {
    pub package: &'a str,
    pub scheme: VersionScheme,
    pub installed: &'a str,
    pub latest: Option<&'a str>,
    pub page_ceiling: usize,
    pub authenticated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryOutcome {
    pub installed: Option<RepoRef>,
    pub latest: Option<RepoRef>,
    pub coverage: Coverage,
    pub pages_fetched: usize,
}

/// Higher is better: exact raw spelling, then release over tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct MatchRank {
    exact: bool,
    release: bool,
}

#[derive(Default)]
struct Endpoint {
    best: Option<(MatchRank, RepoRef)>,
    /// Best-ranked matching ref that names a commit.
    commit: Option<(MatchRank, String)>,
}

impl Endpoint {
    fn offer(&mut self, rank: MatchRank, candidate: &RepoRef) {
        let better = match &self.best {
            Some((current, _)) => rank > *current,
            None => true,
        };
        if better {
            self.best = Some((rank, candidate.clone()));
        }

        if let Some(sha) = &candidate.commit {
            let better_commit = match &self.commit {
                Some((current, _)) => rank > *current,
                None => true,
            };
            if better_commit {
                self.commit = Some((rank, sha.clone()));
            }
        }
    }

    fn found(&self) -> bool {
        self.best.is_some()
    }

    fn has_commit(&self) -> bool {
        self.commit.is_some()
    }

    fn into_ref(self) -> Option<RepoRef> {
        let (_, mut chosen) = self.best?;
        if chosen.commit.is_none() {
            chosen.commit = self.commit.map(|(_, sha)| sha);
        }
        Some(chosen)
    }
}

/// Strips `<package>@`, `<package>-` and a leading `v` from a tag name.
pub fn normalize_tag<'t>(tag: &'t str, package: &str) -> &'t str {
    let mut candidate = tag.trim();

    let short_name = package.rsplit('/').next().unwrap_or(package);
    for name in [package, short_name] {
        for separator in ['@', '-', '_'] {
            if let Some(rest) = candidate
                .strip_prefix(name)
                .and_then(|rest| rest.strip_prefix(separator))
            {
                candidate = rest;
                break;
            }
        }
    }

    candidate
        .strip_prefix('v')
        .or_else(|| candidate.strip_prefix('V'))
        .unwrap_or(candidate)
}

/// Returns `Some(exact)` when the tag names `target`; `exact` is true when the
/// tag spells the version byte-for-byte.
fn tag_matches(tag: &str, package: &str, target: &Version) -> Option<bool> {
    if tag == target.raw {
        return Some(true);
    }
    let normalized = normalize_tag(tag, package);
    let candidate = Version::parse(normalized, target.scheme).ok()?;
    match VersionComparator::equal(&candidate, target) {
        Ok(true) => Some(false),
        _ => None,
    }
}

pub async fn correlate(
    pages: &mut dyn HistoryPages,
    request: &CorrelationRequest<'_>,
) -> Result<HistoryOutcome, MiningError> {
    let installed_target = Version::parse(request.installed, request.scheme).ok();
    let latest_target = request
        .latest
        .and_then(|raw| Version::parse(raw, request.scheme).ok());

    let mut installed = Endpoint::default();
    let mut latest = Endpoint::default();
    let mut pages_fetched = 0;

    let coverage = loop {
        let installed_found = installed_target.is_none() || installed.found();
        let latest_found = latest_target.is_none() || latest.found();
        let both_found = installed_found && latest_found;
        let installed_settled = installed_target.is_none() || installed.has_commit();
        let latest_settled = latest_target.is_none() || latest.has_commit();
        if installed_settled && latest_settled {
            break Coverage::Complete;
        }

        if pages_fetched >= request.page_ceiling {
            if both_found {
                break Coverage::Complete;
            }
            let reason = if request.authenticated {
                PartialReason::PageCeiling
            } else {
                PartialReason::Unauthenticated
            };
            break Coverage::Partial(reason);
        }

        match pages.next_page().await {
            Ok(Some(refs)) => {
                pages_fetched += 1;
                for candidate in &refs {
                    let release = candidate.kind == RefKind::Release;
                    if let Some(target) = &installed_target {
                        if let Some(exact) = tag_matches(&candidate.name, request.package, target) {
                            installed.offer(MatchRank { exact, release }, candidate);
                        }
                    }
                    if let Some(target) = &latest_target {
                        if let Some(exact) = tag_matches(&candidate.name, request.package, target) {
                            latest.offer(MatchRank { exact, release }, candidate);
                        }
                    }
                }
            }
            Ok(None) => break Coverage::Complete,
            Err(MiningError::RateLimited { .. }) if both_found => {
                tracing::debug!(
                    package = request.package,
                    pages_fetched,
                    "rate limited while looking for tag commits"
                );
                break Coverage::Complete;
            }
            Err(MiningError::RateLimited { remaining, limit, reset }) if pages_fetched > 0 => {
                tracing::warn!(
                    package = request.package,
                    pages_fetched,
                    %remaining,
                    %limit,
                    %reset,
                    "source host rate limit hit, history is partial"
                );
                break Coverage::Partial(PartialReason::RateLimited);
            }
            Err(e) => return Err(e),
        }
    };

    tracing::debug!(
        package = request.package,
        pages_fetched,
        installed_resolved = installed.found(),
        latest_resolved = latest.found(),
        ?coverage,
        "history correlation finished"
    );

    Ok(HistoryOutcome {
        installed: installed.into_ref(),
        latest: latest.into_ref(),
        coverage,
        pages_fetched,
    })
}
