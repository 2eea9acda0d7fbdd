use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyCategory {
    Runtime,
    Development,
    Optional,
    Peer,
}

impl DependencyCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyCategory::Runtime => "runtime",
            DependencyCategory::Development => "development",
            DependencyCategory::Optional => "optional",
            DependencyCategory::Peer => "peer",
        }
    }
}

/// A direct dependency as pinned by the lockfile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    /// Raw version string exactly as the lockfile records it.
    pub installed_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declared_range: Option<String>,
    pub categories: Vec<DependencyCategory>,
    /// Upload time recorded in the lockfile itself, when the format has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_upload_time: Option<DateTime<Utc>>,
}

impl Dependency {
    pub fn new(name: impl Into<String>, installed_version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            installed_version: installed_version.into(),
            declared_range: None,
            categories: Vec::new(),
            locked_upload_time: None,
        }
    }

    pub fn with_range(mut self, range: Option<String>) -> Self {
        self.declared_range = range.filter(|r| !r.trim().is_empty());
        self
    }

    pub fn with_category(mut self, category: DependencyCategory) -> Self {
        if !self.categories.contains(&category) {
            self.categories.push(category);
            self.categories.sort();
        }
        self
    }

    pub fn with_upload_time(mut self, uploaded: Option<DateTime<Utc>>) -> Self {
        self.locked_upload_time = uploaded;
        self
    }

    /// Anything that is not tagged runtime belongs to the development list.
    pub fn is_production(&self) -> bool {
        self.categories.is_empty() || self.categories.contains(&DependencyCategory::Runtime)
    }
}
