use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// `owner/name` on the source host.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryId {
    pub owner: String,
    pub name: String,
}

fn github_url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"github\.com[:/](?P<owner>[^/\s]+)/(?P<name>[^/\s#?]+)").expect("valid regex")
    })
}

impl RepositoryId {
    /// Accepts the shapes registries put in repository fields: full https/git/ssh
    /// URLs, `git+` prefixed URLs, `github:owner/repo` and bare `owner/repo`.
    pub fn parse(url: &str) -> Option<Self> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Some(short) = trimmed.strip_prefix("github:") {
            return Self::from_shorthand(short);
        }

        if !trimmed.contains("://") && !trimmed.contains('@') && !trimmed.contains(':') {
            return Self::from_shorthand(trimmed);
        }

        let caps = github_url_pattern().captures(trimmed)?;
        let owner = caps.name("owner")?.as_str();
        let name = caps.name("name")?.as_str();
        let name = name.strip_suffix(".git").unwrap_or(name);
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    fn from_shorthand(short: &str) -> Option<Self> {
        let mut parts = short.trim().splitn(2, '/');
        let owner = parts.next()?.trim();
        let name = parts.next()?.trim();
        let name = name.strip_suffix(".git").unwrap_or(name);
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }
}

impl std::fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefKind {
    Release,
    Tag,
}

/// One release or tag from the source host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub name: String,
    pub kind: RefKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialReason {
    /// Stopped at the configured page ceiling.
    PageCeiling,
    /// No credential; the unauthenticated ceiling applied.
    Unauthenticated,
    /// The host refused further pages.
    RateLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Coverage {
    Complete,
    Partial(PartialReason),
}

impl Coverage {
    pub fn is_complete(&self) -> bool {
        matches!(self, Coverage::Complete)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceHistory {
    pub repository: RepositoryId,
    pub coverage: Coverage,
    pub pages_fetched: usize,
    pub installed_resolved: bool,
    pub latest_resolved: bool,
}
