use crate::types::{DriftCategory, DriftVerdict, Project};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Detecting,
    Parsed,
    PerDependencyLookup,
    Assembled,
    Failed,
}

/// Result aggregate for one project. Presentation code reads this and nothing else.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectAnalysis {
    pub project: Project,

    pub production: Vec<DriftVerdict>,

    pub development: Vec<DriftVerdict>,

    /// Project-level notes, e.g. marker files that lost on detection priority.
    pub warnings: Vec<String>,

    pub summary: AnalysisSummary,

    pub states: Vec<RunState>,

    pub started_at: DateTime<Utc>,

    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisSummary {
    pub dependencies: usize,
    pub latest: usize,
    pub patch: usize,
    pub minor: usize,
    pub major: usize,
    pub unknown: usize,
    pub with_advisories: usize,
    pub advisories: usize,
    pub advisories_unchecked: usize,
    pub partial: usize,
}

impl AnalysisSummary {
    pub fn from_verdicts<'a>(verdicts: impl IntoIterator<Item = &'a DriftVerdict>) -> Self {
        let mut summary = Self::default();
        for verdict in verdicts {
            summary.dependencies += 1;
            match verdict.category {
                DriftCategory::Latest => summary.latest += 1,
                DriftCategory::Patch => summary.patch += 1,
                DriftCategory::Minor => summary.minor += 1,
                DriftCategory::Major => summary.major += 1,
                DriftCategory::Unknown => summary.unknown += 1,
            }
            if !verdict.advisories.is_empty() {
                summary.with_advisories += 1;
                summary.advisories += verdict.advisories.len();
            }
            if !verdict.advisories_checked {
                summary.advisories_unchecked += 1;
            }
            if verdict.is_partial() {
                summary.partial += 1;
            }
        }
        summary
    }

    pub fn outdated(&self) -> usize {
        self.patch + self.minor + self.major
    }
}

/// Category rank (major first), then advisory count descending, then name.
pub fn sort_verdicts(verdicts: &mut [DriftVerdict]) {
    verdicts.sort_by(|a, b| {
        a.category
            .priority()
            .cmp(&b.category.priority())
            .then_with(|| b.advisories.len().cmp(&a.advisories.len()))
            .then_with(|| a.dependency.name.cmp(&b.dependency.name))
    });
}

impl ProjectAnalysis {
    pub fn verdicts(&self) -> impl Iterator<Item = &DriftVerdict> {
        self.production.iter().chain(self.development.iter())
    }

    pub fn partial_verdicts(&self) -> impl Iterator<Item = &DriftVerdict> {
        self.verdicts().filter(|v| v.is_partial())
    }

    pub fn has_advisories(&self) -> bool {
        self.summary.with_advisories > 0
    }

    pub fn has_drift(&self) -> bool {
        self.summary.outdated() > 0
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
