//! Driftwatch Core Library
//!
//! Version model, plugin seams, remote clients and the reconciliation engine
//! behind the driftwatch dependency drift analyzer.

pub mod types;
pub mod plugin;
pub mod error;
pub mod http;
pub mod cache;
pub mod config;
pub mod pep440;
pub mod version;
pub mod lockfile;
pub mod drift;
pub mod history;
pub mod github;
pub mod osv;
pub mod report;
pub mod reconciler;

pub use types::*;
pub use error::{
    DetectionError, DriftError, HttpError, LockfileParsingError, MiningError, RegistryError, Result,
    VersionError, VulnerabilityFeedError,
};
pub use plugin::{
    AdvisorySource, Detector, EcosystemMatch, FieldValue, HistoryPages, PackageMetadata, PackageVersions,
    ParsedDependencies, Parser, Plugin, PluginRegistry, RegistryClient, RepositoryMiner,
};
pub use report::{AnalysisSummary, ProjectAnalysis, RunState};
pub use reconciler::{AnalysisRequest, Reconciler};
pub use http::HttpClient;
pub use cache::ResponseCache;
pub use config::DriftConfig;
pub use version::{Availability, Version, VersionComparator};
pub use github::GithubMiner;
pub use osv::OsvClient;
