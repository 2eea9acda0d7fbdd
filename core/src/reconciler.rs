use crate::config::DriftConfig;
use crate::drift::compute_drift;
use crate::error::{DriftError, MiningError, RegistryError, Result};
use crate::github::GithubMiner;
use crate::history::{correlate, CorrelationRequest, HistoryOutcome};
use crate::http::HttpClient;
use crate::osv::OsvClient;
use crate::plugin::{AdvisorySource, HistoryPages, PackageVersions, PluginRegistry, RegistryClient, RepositoryMiner};
use crate::report::{sort_verdicts, AnalysisSummary, ProjectAnalysis, RunState};
use crate::types::{
    Coverage, Dependency, DriftCategory, DriftVerdict, Ecosystem, LookupSource, LookupWarning,
    PackageManager, Project, RepositoryId, SourceHistory,
};
use crate::version::Version;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Semaphore, SemaphorePermit};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub root: PathBuf,
    /// Skips priority-based detection and analyses this pair only.
    pub package_manager: Option<PackageManager>,
    /// Time-lag reference; defaults to now.
    pub reference_time: Option<DateTime<Utc>>,
}

impl AnalysisRequest {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            package_manager: None,
            reference_time: None,
        }
    }

    pub fn with_package_manager(mut self, manager: Option<PackageManager>) -> Self {
        self.package_manager = manager;
        self
    }

    pub fn with_reference_time(mut self, at: DateTime<Utc>) -> Self {
        self.reference_time = Some(at);
        self
    }
}

pub struct Reconciler {
    plugins: PluginRegistry,
    advisories: Arc<dyn AdvisorySource>,
    miner: Option<Arc<dyn RepositoryMiner>>,
    max_in_flight: usize,
    include_development: bool,
    cancel: CancellationToken,
}

impl Reconciler {
    pub fn new(plugins: PluginRegistry, advisories: Arc<dyn AdvisorySource>, config: &DriftConfig) -> Self {
        Self {
            plugins,
            advisories,
            miner: None,
            max_in_flight: config.concurrency.max_in_flight.max(1),
            include_development: config.include_development,
            cancel: CancellationToken::new(),
        }
    }

    /// Wires the OSV matcher and the GitHub miner from `config`, sharing `http`.
    pub fn from_config(plugins: PluginRegistry, config: &DriftConfig, http: &HttpClient) -> Self {
        let advisories = Arc::new(OsvClient::new(http.clone(), &config.osv.url));
        let miner = Arc::new(GithubMiner::new(http.clone(), &config.github));
        Self::new(plugins, advisories, config).with_miner(miner)
    }

    pub fn with_miner(mut self, miner: Arc<dyn RepositoryMiner>) -> Self {
        self.miner = Some(miner);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn enter(states: &mut Vec<RunState>, state: RunState) {
        debug!(?state, "analysis state");
        states.push(state);
    }

    #[instrument(skip(self, request), fields(root = %request.root.display()))]
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<ProjectAnalysis> {
        let started_at = Utc::now();
        let start = Instant::now();
        let reference_time = request.reference_time.unwrap_or(started_at);
        let mut states = Vec::new();
        Self::enter(&mut states, RunState::Detecting);

        match self.run(&request, reference_time, &mut states).await {
            Ok((project, production, development, warnings)) => {
                Self::enter(&mut states, RunState::Assembled);
                let summary = AnalysisSummary::from_verdicts(production.iter().chain(development.iter()));
                info!(
                    dependencies = summary.dependencies,
                    outdated = summary.outdated(),
                    partial = summary.partial,
                    "analysis assembled"
                );
                Ok(ProjectAnalysis {
                    project,
                    production,
                    development,
                    warnings,
                    summary,
                    states,
                    started_at,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
            Err(e) => {
                Self::enter(&mut states, RunState::Failed);
                warn!(error = %e, "analysis failed");
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        reference_time: DateTime<Utc>,
        states: &mut Vec<RunState>,
    ) -> Result<(Project, Vec<DriftVerdict>, Vec<DriftVerdict>, Vec<String>)> {
        let root = &request.root;
        if !root.is_dir() {
            return Err(DriftError::InvalidDirectory {
                path: root.display().to_string(),
                reason: "not a directory".to_string(),
            });
        }

        let detection = self.plugins.detect(root, request.package_manager)?;
        let selected = detection.selected;
        let manager = selected.package_manager;

        let mut warnings: Vec<String> = detection
            .shadowed
            .iter()
            .map(|other| {
                format!(
                    "{} + {} also present; analysed {} by detection priority",
                    other.manifest_file(),
                    other.lockfile_file(),
                    manager
                )
            })
            .collect();
        for warning in &warnings {
            warn!("{}", warning);
        }

        let parser = self
            .plugins
            .get_parser(manager)
            .ok_or(DriftError::MissingPlugin { manager })?;
        let parsed = parser.parse(&selected)?;
        Self::enter(states, RunState::Parsed);

        let name = parsed.project_name.clone().unwrap_or_else(|| {
            root.canonicalize()
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .unwrap_or_else(|| root.display().to_string())
        });
        let project = Project {
            name,
            root: root.clone(),
            ecosystem: manager.ecosystem(),
            package_manager: manager,
            production: parsed.production,
            development: parsed.development,
        };
        info!(
            project = %project.name,
            package_manager = %manager,
            production = project.production.len(),
            development = project.development.len(),
            "parsed dependencies"
        );

        let registry = self
            .plugins
            .get_registry_client(project.ecosystem)
            .ok_or(DriftError::MissingPlugin { manager })?;

        Self::enter(states, RunState::PerDependencyLookup);

        let development = if self.include_development {
            project.development.clone()
        } else {
            if !project.development.is_empty() {
                warnings.push(format!(
                    "{} development dependencies skipped",
                    project.development.len()
                ));
            }
            Vec::new()
        };

        let (production, development) = self
            .lookup_all(registry, project.ecosystem, project.production.clone(), development, reference_time)
            .await?;

        Ok((project, production, development, warnings))
    }

    async fn lookup_all(
        &self,
        registry: Arc<dyn RegistryClient>,
        ecosystem: Ecosystem,
        production: Vec<Dependency>,
        development: Vec<Dependency>,
        reference_time: DateTime<Utc>,
    ) -> Result<(Vec<DriftVerdict>, Vec<DriftVerdict>)> {
        let context = Arc::new(LookupContext {
            registry,
            advisories: Arc::clone(&self.advisories),
            miner: self.miner.clone(),
            permits: Arc::new(Semaphore::new(self.max_in_flight)),
            ecosystem,
            reference_time,
            cancel: self.cancel.clone(),
        });

        let entries: Vec<(bool, Dependency)> = production
            .into_iter()
            .map(|d| (true, d))
            .chain(development.into_iter().map(|d| (false, d)))
            .collect();

        let mut slots: Vec<Option<DriftVerdict>> = vec![None; entries.len()];
        let mut tasks = JoinSet::new();

        for (index, (_, dependency)) in entries.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(DriftError::Cancelled);
            }
            let context = Arc::clone(&context);
            let dependency = dependency.clone();
            tasks.spawn(async move { (index, context.lookup(dependency).await) });
        }

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(DriftError::Cancelled);
                }
                next = tasks.join_next() => match next {
                    None => break,
                    Some(Ok((index, verdict))) => slots[index] = Some(verdict),
                    Some(Err(e)) => warn!(error = %e, "dependency lookup task failed"),
                },
            }
        }

        let mut production = Vec::new();
        let mut development = Vec::new();
        for (slot, (is_production, dependency)) in slots.into_iter().zip(entries) {
            let verdict = slot.unwrap_or_else(|| failed_verdict(dependency, ecosystem));
            if is_production {
                production.push(verdict);
            } else {
                development.push(verdict);
            }
        }

        sort_verdicts(&mut production);
        sort_verdicts(&mut development);
        Ok((production, development))
    }
}

fn failed_verdict(dependency: Dependency, ecosystem: Ecosystem) -> DriftVerdict {
    DriftVerdict {
        installed: Version::parse(&dependency.installed_version, ecosystem.scheme()).ok(),
        dependency,
        latest: None,
        release_distance: None,
        time_lag_days: None,
        category: DriftCategory::Unknown,
        advisories: BTreeSet::new(),
        advisories_checked: false,
        source_history: None,
        warnings: vec![LookupWarning::new(LookupSource::Registry, "lookup task aborted")],
    }
}

struct LookupContext {
    registry: Arc<dyn RegistryClient>,
    advisories: Arc<dyn AdvisorySource>,
    miner: Option<Arc<dyn RepositoryMiner>>,
    permits: Arc<Semaphore>,
    ecosystem: Ecosystem,
    reference_time: DateTime<Utc>,
    cancel: CancellationToken,
}

impl LookupContext {
    /// `None` once the run is cancelled; queues while the bound is reached.
    async fn permit(&self) -> Option<SemaphorePermit<'_>> {
        if self.cancel.is_cancelled() {
            return None;
        }
        self.permits.acquire().await.ok()
    }

    async fn fetch_versions(&self, name: &str) -> std::result::Result<PackageVersions, RegistryError> {
        let _permit = self.permit().await.ok_or_else(|| RegistryError::Transient {
            package: name.to_string(),
            message: "run cancelled".to_string(),
        })?;
        self.registry.versions(name).await
    }

    async fn fetch_advisories(
        &self,
        dependency: &Dependency,
    ) -> std::result::Result<BTreeSet<String>, crate::error::VulnerabilityFeedError> {
        let _permit = self.permit().await.ok_or_else(|| {
            crate::error::VulnerabilityFeedError::Unavailable {
                message: "run cancelled".to_string(),
            }
        })?;
        self.advisories
            .advisories_for(self.ecosystem, &dependency.name, &dependency.installed_version)
            .await
    }

    async fn mine(
        &self,
        miner: &dyn RepositoryMiner,
        repository: &RepositoryId,
        dependency: &Dependency,
        latest: Option<&str>,
    ) -> std::result::Result<HistoryOutcome, MiningError> {
        let pages = miner.releases_and_tags(repository)?;
        let mut throttled = ThrottledPages {
            inner: pages,
            permits: Arc::clone(&self.permits),
        };
        let request = CorrelationRequest {
            package: &dependency.name,
            scheme: self.ecosystem.scheme(),
            installed: &dependency.installed_version,
            latest,
            page_ceiling: miner.page_ceiling(),
            authenticated: miner.is_authenticated(),
        };
        correlate(&mut throttled, &request).await
    }

    #[instrument(skip(self, dependency), fields(package = %dependency.name, version = %dependency.installed_version))]
    async fn lookup(&self, dependency: Dependency) -> DriftVerdict {
        let (versions, advisories) = tokio::join!(
            self.fetch_versions(&dependency.name),
            self.fetch_advisories(&dependency)
        );

        let mut warnings = Vec::new();

        let (advisories, advisories_checked) = match advisories {
            Ok(ids) => (ids, true),
            Err(e) => {
                warn!(error = %e, "advisory lookup failed");
                warnings.push(LookupWarning::new(LookupSource::Advisories, e.to_string()));
                (BTreeSet::new(), false)
            }
        };

        let known = match versions {
            Ok(known) => known,
            Err(e) => {
                warn!(error = %e, "registry lookup failed");
                warnings.push(LookupWarning::new(LookupSource::Registry, e.to_string()));
                return DriftVerdict {
                    installed: Version::parse(&dependency.installed_version, self.ecosystem.scheme()).ok(),
                    dependency,
                    latest: None,
                    release_distance: None,
                    time_lag_days: None,
                    category: DriftCategory::Unknown,
                    advisories,
                    advisories_checked,
                    source_history: None,
                    warnings,
                };
            }
        };

        let drift = compute_drift(&dependency, self.ecosystem.scheme(), &known, self.reference_time);
        warnings.extend(drift.warnings);
        let mut installed = drift.installed;
        let mut latest = drift.latest;

        let source_history = match (&self.miner, known.repository_url.as_deref()) {
            (Some(miner), Some(url)) => match RepositoryId::parse(url) {
                Some(repository) => {
                    let latest_raw = latest.as_ref().map(|v| v.raw.clone());
                    match self.mine(miner.as_ref(), &repository, &dependency, latest_raw.as_deref()).await {
                        Ok(outcome) => {
                            if let Coverage::Partial(reason) = outcome.coverage {
                                warnings.push(LookupWarning::new(
                                    LookupSource::Repository,
                                    format!("history coverage of {} is partial ({:?})", repository, reason),
                                ));
                            }
                            if outcome.installed.is_none() {
                                warnings.push(LookupWarning::new(
                                    LookupSource::Repository,
                                    format!("no tag in {} matches {}", repository, dependency.installed_version),
                                ));
                            }
                            let history = SourceHistory {
                                repository,
                                coverage: outcome.coverage,
                                pages_fetched: outcome.pages_fetched,
                                installed_resolved: outcome.installed.is_some(),
                                latest_resolved: outcome.latest.is_some(),
                            };
                            installed = installed.map(|v| v.with_correlation(outcome.installed));
                            latest = latest.map(|v| v.with_correlation(outcome.latest));
                            Some(history)
                        }
                        Err(e) => {
                            warn!(error = %e, "repository mining failed");
                            warnings.push(LookupWarning::new(LookupSource::Repository, e.to_string()));
                            None
                        }
                    }
                }
                None => {
                    let e = MiningError::UnsupportedRepository { url: url.to_string() };
                    debug!(error = %e, "skipping repository mining");
                    warnings.push(LookupWarning::new(LookupSource::Repository, e.to_string()));
                    None
                }
            },
            (Some(_), None) => {
                debug!("registry declares no repository, skipping history");
                warnings.push(LookupWarning::new(
                    LookupSource::Repository,
                    "registry declares no repository",
                ));
                None
            }
            (None, _) => None,
        };

        DriftVerdict {
            dependency,
            installed,
            latest,
            release_distance: drift.release_distance,
            time_lag_days: drift.time_lag_days,
            category: drift.category,
            advisories,
            advisories_checked,
            source_history,
            warnings,
        }
    }
}

/// Takes a concurrency permit for every page request.
struct ThrottledPages {
    inner: Box<dyn HistoryPages>,
    permits: Arc<Semaphore>,
}

#[async_trait]
impl HistoryPages for ThrottledPages {
    async fn next_page(&mut self) -> std::result::Result<Option<Vec<crate::types::RepoRef>>, MiningError> {
        let _permit = self.permits.acquire().await.map_err(|e| MiningError::Request {
            message: format!("semaphore closed: {}", e),
        })?;
        self.inner.next_page().await
    }
}
