use crate::error::VulnerabilityFeedError;
use crate::plugin::AdvisorySource;
use crate::types::Ecosystem;
use crate::HttpClient;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upper bound on OSV result pages per query; a longer walk is reported as unavailable.
const MAX_QUERY_PAGES: usize = 20;

#[derive(Debug, Clone)]
pub struct OsvClient {
    client: HttpClient,
    base_url: String,
}

impl OsvClient {
    pub fn new(client: HttpClient, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn query(&self, query: &OsvQuery) -> Result<OsvResponse, VulnerabilityFeedError> {
        let url = format!("{}/v1/query", self.base_url);
        Ok(self.client.post_json(&url, query).await?)
    }
}

#[async_trait]
impl AdvisorySource for OsvClient {
    async fn advisories_for(
        &self,
        ecosystem: Ecosystem,
        name: &str,
        version: &str,
    ) -> Result<BTreeSet<String>, VulnerabilityFeedError> {
        let mut query = OsvQuery {
            package: OsvPackage {
                name: name.to_string(),
                ecosystem: ecosystem.osv_name().to_string(),
            },
            version: version.to_string(),
            page_token: None,
        };

        let mut ids = BTreeSet::new();
        for _ in 0..MAX_QUERY_PAGES {
            let response = self.query(&query).await?;
            ids.extend(response.vulns.into_iter().map(|v| v.id));

            match response.next_page_token {
                Some(token) if !token.is_empty() => query.page_token = Some(token),
                _ => return Ok(ids),
            }
        }

        tracing::warn!(
            package = name,
            version,
            collected = ids.len(),
            "OSV kept paging, discarding incomplete results"
        );
        Err(VulnerabilityFeedError::Unavailable {
            message: format!(
                "advisory results for {}@{} exceeded {} pages",
                name, version, MAX_QUERY_PAGES
            ),
        })
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct OsvQuery {
    pub package: OsvPackage,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<String>,
}

#[derive(Serialize, Debug, Clone, Deserialize)]
pub struct OsvPackage {
    pub name: String,
    pub ecosystem: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OsvResponse {
    #[serde(default)]
    pub vulns: Vec<OsvVulnerability>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsvVulnerability {
    pub id: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub summary: Option<String>,
}
