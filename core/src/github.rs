use crate::config::GithubConfig;
use crate::error::{HttpError, MiningError};
use crate::http::HttpClient;
use crate::plugin::{HistoryPages, RepositoryMiner};
use crate::types::{RefKind, RepoRef, RepositoryId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct GithubMiner {
    client: HttpClient,
    api_url: String,
    per_page: usize,
    page_ceiling: usize,
    authenticated: bool,
    require_token: bool,
}

impl GithubMiner {
    pub fn new(client: HttpClient, config: &GithubConfig) -> Self {
        let token = config.token.clone().filter(|_| config.is_authenticated());
        Self {
            client: client.with_bearer_token(token).without_rate_limit_retries(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            per_page: config.per_page,
            page_ceiling: config.page_ceiling(),
            authenticated: config.is_authenticated(),
            require_token: config.require_token,
        }
    }

    fn listing_url(&self, repo: &RepositoryId, listing: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}?per_page={}&page=1",
            self.api_url, repo.owner, repo.name, listing, self.per_page
        )
    }
}

impl RepositoryMiner for GithubMiner {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    fn page_ceiling(&self) -> usize {
        self.page_ceiling
    }

    fn releases_and_tags(&self, repo: &RepositoryId) -> Result<Box<dyn HistoryPages>, MiningError> {
        if self.require_token && !self.authenticated {
            return Err(MiningError::MissingCredential);
        }
        Ok(Box::new(GithubHistory {
            client: self.client.clone(),
            repository: repo.to_string(),
            phase: Phase::Releases,
            next: Some(self.listing_url(repo, "releases")),
            tags_url: self.listing_url(repo, "tags"),
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Releases,
    Tags,
    Done,
}

/// Releases first, then tags, each following `Link: rel="next"`.
struct GithubHistory {
    client: HttpClient,
    repository: String,
    phase: Phase,
    next: Option<String>,
    tags_url: String,
}

/// `target_commitish` names the branch a release was cut from, not the tagged
/// commit, so releases carry no commit; the matching tag supplies it.
#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    draft: bool,
}

#[derive(Debug, Deserialize)]
struct GithubTag {
    name: String,
    commit: GithubCommit,
}

#[derive(Debug, Deserialize)]
struct GithubCommit {
    sha: String,
}

impl GithubHistory {
    fn advance(&mut self, next: Option<String>) {
        self.next = next;
        if self.next.is_none() {
            match self.phase {
                Phase::Releases => {
                    self.phase = Phase::Tags;
                    self.next = Some(self.tags_url.clone());
                }
                _ => self.phase = Phase::Done,
            }
        }
    }

    fn not_found(&self) -> MiningError {
        MiningError::Request {
            message: format!("repository '{}' not found", self.repository),
        }
    }
}

#[async_trait]
impl HistoryPages for GithubHistory {
    async fn next_page(&mut self) -> Result<Option<Vec<RepoRef>>, MiningError> {
        let url = match (&self.phase, self.next.take()) {
            (Phase::Done, _) | (_, None) => return Ok(None),
            (_, Some(url)) => url,
        };

        tracing::trace!(repository = %self.repository, phase = ?self.phase, %url, "fetching history page");

        let refs = match self.phase {
            Phase::Releases => {
                let page = self
                    .client
                    .get_json_paged::<Vec<GithubRelease>>(&url)
                    .await
                    .map_err(|e| match e {
                        HttpError::NotFound { .. } => self.not_found(),
                        other => other.into(),
                    })?;
                self.advance(page.next);
                page.body
                    .into_iter()
                    .filter(|release| !release.draft)
                    .map(|release| RepoRef {
                        name: release.tag_name,
                        kind: RefKind::Release,
                        commit: None,
                        timestamp: release.published_at,
                    })
                    .collect()
            }
            Phase::Tags => {
                let page = self
                    .client
                    .get_json_paged::<Vec<GithubTag>>(&url)
                    .await
                    .map_err(|e| match e {
                        HttpError::NotFound { .. } => self.not_found(),
                        other => other.into(),
                    })?;
                self.advance(page.next);
                page.body
                    .into_iter()
                    .map(|tag| RepoRef {
                        name: tag.name,
                        kind: RefKind::Tag,
                        commit: Some(tag.commit.sha),
                        timestamp: None,
                    })
                    .collect()
            }
            Phase::Done => return Ok(None),
        };

        Ok(Some(refs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpConfig;
    use crate::history::{correlate, CorrelationRequest};
    use crate::types::{Coverage, VersionScheme};
    use mockito::Matcher;
    use serde_json::json;

    fn config(server: &mockito::Server, token: Option<&str>) -> GithubConfig {
        GithubConfig {
            api_url: server.url(),
            token: token.map(|t| t.to_string()),
            per_page: 2,
            ..GithubConfig::default()
        }
    }

    fn http() -> HttpClient {
        let config = HttpConfig {
            retries: 0,
            ..HttpConfig::default()
        };
        HttpClient::new(&config).unwrap()
    }

    fn repo() -> RepositoryId {
        RepositoryId::parse("https://github.com/acme/alpha").unwrap()
    }

    fn page_query(page: &str) -> Matcher {
        Matcher::AllOf(vec![
            Matcher::UrlEncoded("per_page".into(), "2".into()),
            Matcher::UrlEncoded("page".into(), page.into()),
        ])
    }

    #[tokio::test]
    async fn test_walks_releases_then_tags() {
        let mut server = mockito::Server::new_async().await;
        let releases = server
            .mock("GET", "/repos/acme/alpha/releases")
            .match_query(page_query("1"))
            .match_header("authorization", "Bearer ghp_test")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"tag_name": "v4.2.0", "target_commitish": "main", "published_at": "2024-03-01T00:00:00Z", "draft": false},
                    {"tag_name": "v5.0.0-draft", "draft": true}
                ])
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;
        let tags = server
            .mock("GET", "/repos/acme/alpha/tags")
            .match_query(page_query("1"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{"name": "v2.2.0", "commit": {"sha": "abc123"}}]).to_string())
            .expect(1)
            .create_async()
            .await;

        let miner = GithubMiner::new(http(), &config(&server, Some("ghp_test")));
        let mut pages = miner.releases_and_tags(&repo()).unwrap();

        let first = pages.next_page().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].name, "v4.2.0");
        assert_eq!(first[0].kind, RefKind::Release);
        assert_eq!(first[0].commit, None);

        let second = pages.next_page().await.unwrap().unwrap();
        assert_eq!(second[0].commit.as_deref(), Some("abc123"));
        assert_eq!(second[0].kind, RefKind::Tag);

        assert!(pages.next_page().await.unwrap().is_none());
        releases.assert_async().await;
        tags.assert_async().await;
    }

    #[tokio::test]
    async fn test_release_commits_come_from_tags() {
        let mut server = mockito::Server::new_async().await;
        let _releases = server
            .mock("GET", "/repos/acme/alpha/releases")
            .match_query(page_query("1"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"tag_name": "v4.2.0", "target_commitish": "main"},
                    {"tag_name": "v2.2.0", "target_commitish": "main"}
                ])
                .to_string(),
            )
            .create_async()
            .await;
        let tags = server
            .mock("GET", "/repos/acme/alpha/tags")
            .match_query(page_query("1"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!([
                    {"name": "v4.2.0", "commit": {"sha": "4444aaaa"}},
                    {"name": "v2.2.0", "commit": {"sha": "2222bbbb"}}
                ])
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let miner = GithubMiner::new(http(), &config(&server, Some("ghp_test")));
        let mut pages = miner.releases_and_tags(&repo()).unwrap();
        let request = CorrelationRequest {
            package: "alpha",
            scheme: VersionScheme::SemVer,
            installed: "2.2.0",
            latest: Some("4.2.0"),
            page_ceiling: miner.page_ceiling(),
            authenticated: miner.is_authenticated(),
        };
        let outcome = correlate(pages.as_mut(), &request).await.unwrap();

        let installed = outcome.installed.unwrap();
        assert_eq!(installed.kind, RefKind::Release);
        assert_eq!(installed.commit.as_deref(), Some("2222bbbb"));
        assert_eq!(outcome.latest.unwrap().commit.as_deref(), Some("4444aaaa"));
        assert_eq!(outcome.coverage, Coverage::Complete);
        assert_eq!(outcome.pages_fetched, 2);
        tags.assert_async().await;
    }

    #[tokio::test]
    async fn test_follows_link_header() {
        let mut server = mockito::Server::new_async().await;
        let next = format!("{}/repos/acme/alpha/releases?per_page=2&page=2", server.url());
        let _page1 = server
            .mock("GET", "/repos/acme/alpha/releases")
            .match_query(page_query("1"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header("link", &format!(r#"<{}>; rel="next""#, next))
            .with_body(json!([{"tag_name": "v3.0.0"}]).to_string())
            .create_async()
            .await;
        let page2 = server
            .mock("GET", "/repos/acme/alpha/releases")
            .match_query(page_query("2"))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(json!([{"tag_name": "v2.0.0"}]).to_string())
            .expect(1)
            .create_async()
            .await;

        let miner = GithubMiner::new(http(), &config(&server, None));
        let mut pages = miner.releases_and_tags(&repo()).unwrap();
        pages.next_page().await.unwrap();
        let second = pages.next_page().await.unwrap().unwrap();
        assert_eq!(second[0].name, "v2.0.0");
        page2.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_as_mining_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/repos/acme/alpha/releases")
            .match_query(Matcher::Any)
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-limit", "60")
            .create_async()
            .await;

        let miner = GithubMiner::new(http(), &config(&server, None));
        let mut pages = miner.releases_and_tags(&repo()).unwrap();
        let err = pages.next_page().await.unwrap_err();
        match err {
            MiningError::RateLimited { remaining, limit, reset } => {
                assert_eq!(remaining, "0");
                assert_eq!(limit, "60");
                assert_eq!(reset, "N/A");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rate_limit_is_not_retried_by_miner() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repos/acme/alpha/releases")
            .match_query(Matcher::Any)
            .with_status(429)
            .with_header("x-ratelimit-remaining", "0")
            .expect(1)
            .create_async()
            .await;

        let retrying = HttpClient::new(&HttpConfig {
            retries: 3,
            backoff_base_ms: 1,
            ..HttpConfig::default()
        })
        .unwrap();
        let miner = GithubMiner::new(retrying, &config(&server, None));
        let mut pages = miner.releases_and_tags(&repo()).unwrap();

        assert!(matches!(
            pages.next_page().await,
            Err(MiningError::RateLimited { .. })
        ));
        mock.assert_async().await;
    }

    #[test]
    fn test_full_scan_requires_token() {
        let config = GithubConfig {
            require_token: true,
            ..GithubConfig::default()
        };
        let miner = GithubMiner::new(http(), &config);
        assert!(matches!(
            miner.releases_and_tags(&repo()),
            Err(MiningError::MissingCredential)
        ));
        assert_eq!(miner.page_ceiling(), 2);
    }
}
