use crate::requirement::normalize_name;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use driftwatch_core::error::RegistryError;
use driftwatch_core::http::HttpClient;
use driftwatch_core::plugin::{FieldValue, PackageMetadata, PackageVersions, RegistryClient};
use driftwatch_core::types::{Ecosystem, VersionScheme};
use driftwatch_core::version::{Availability, Version, VersionComparator};
use serde::Deserialize;
use std::collections::BTreeMap;

pub const DEFAULT_REGISTRY_URL: &str = "https://pypi.org";

/// `project_urls` keys checked for a source repository, in order.
const REPOSITORY_URL_KEYS: [&str; 7] = [
    "Source",
    "Source Code",
    "Repository",
    "Code",
    "GitHub",
    "Homepage",
    "Home",
];

#[derive(Debug, Deserialize)]
struct ProjectResponse {
    info: ProjectInfo,
    #[serde(default)]
    releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Deserialize)]
struct ProjectInfo {
    version: Option<String>,
    #[serde(default)]
    requires_dist: Option<Vec<String>>,
    #[serde(default)]
    requires_python: Option<String>,
    #[serde(default)]
    project_urls: Option<BTreeMap<String, String>>,
    #[serde(default)]
    home_page: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseFile {
    #[serde(default)]
    upload_time_iso_8601: Option<DateTime<Utc>>,
    #[serde(default)]
    yanked: bool,
}

fn is_github(url: &str) -> bool {
    url.contains("github.com")
}

impl ProjectInfo {
    fn repository_url(&self) -> Option<String> {
        let from_project_urls = self.project_urls.as_ref().and_then(|urls| {
            REPOSITORY_URL_KEYS
                .iter()
                .find_map(|key| {
                    urls.iter()
                        .find(|(label, url)| label.eq_ignore_ascii_case(key) && is_github(url))
                        .map(|(_, url)| url.clone())
                })
                .or_else(|| urls.values().find(|url| is_github(url)).cloned())
        });

        from_project_urls.or_else(|| self.home_page.clone().filter(|url| is_github(url)))
    }

    /// Requirements gated behind an extra are not runtime requirements.
    fn runtime_requirements(&self) -> FieldValue<Vec<String>> {
        match &self.requires_dist {
            Some(requirements) => {
                let runtime: Vec<String> = requirements
                    .iter()
                    .filter(|req| !req.replace(' ', "").contains("extra=="))
                    .cloned()
                    .collect();
                if runtime.is_empty() {
                    FieldValue::Missing
                } else {
                    FieldValue::Present(runtime)
                }
            }
            None => FieldValue::Missing,
        }
    }
}

pub struct PyPiClient {
    client: HttpClient,
    base_url: String,
}

impl PyPiClient {
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            base_url: DEFAULT_REGISTRY_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn project(&self, name: &str) -> Result<ProjectResponse, RegistryError> {
        let url = format!("{}/pypi/{}/json", self.base_url, normalize_name(name));
        tracing::debug!(package = name, %url, "fetching PyPI project");
        self.client
            .get_json(&url)
            .await
            .map_err(|e| RegistryError::from_http(name, e))
    }
}

#[async_trait]
impl RegistryClient for PyPiClient {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::PyPI
    }

    async fn versions(&self, name: &str) -> Result<PackageVersions, RegistryError> {
        let project = self.project(name).await?;

        let mut versions = Vec::with_capacity(project.releases.len());
        for (raw, files) in &project.releases {
            if files.is_empty() {
                tracing::trace!(package = name, version = %raw, "skipping release without files");
                continue;
            }
            let Ok(version) = Version::parse(raw, VersionScheme::Pep440) else {
                tracing::debug!(package = name, version = %raw, "skipping non-PEP 440 release");
                continue;
            };

            let availability = if files.iter().all(|f| f.yanked) {
                Availability::Yanked
            } else {
                Availability::Available
            };
            let published_at = files.iter().filter_map(|f| f.upload_time_iso_8601).min();

            versions.push(
                version
                    .with_published_at(published_at)
                    .with_availability(availability),
            );
        }

        VersionComparator::sort(&mut versions).map_err(|e| RegistryError::Malformed {
            package: name.to_string(),
            message: e.to_string(),
        })?;

        Ok(PackageVersions {
            versions,
            latest: project.info.version.clone(),
            repository_url: project.info.repository_url(),
        })
    }

    async fn metadata(&self, name: &str) -> Result<PackageMetadata, RegistryError> {
        let project = self.project(name).await?;
        let info = &project.info;

        Ok(PackageMetadata {
            runtime_requirements: info.runtime_requirements(),
            development_requirements: FieldValue::NotSupported,
            engines: match &info.requires_python {
                Some(python) if !python.trim().is_empty() => {
                    FieldValue::Present(vec![format!("python {}", python)])
                }
                _ => FieldValue::Missing,
            },
            repository_url: info.repository_url(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::config::HttpConfig;
    use serde_json::json;

    fn client(server: &mockito::Server) -> PyPiClient {
        let config = HttpConfig {
            retries: 0,
            ..HttpConfig::default()
        };
        PyPiClient::new(HttpClient::new(&config).unwrap()).with_base_url(server.url())
    }

    fn file(uploaded: &str, yanked: bool) -> serde_json::Value {
        json!({ "upload_time_iso_8601": uploaded, "yanked": yanked })
    }

    fn project_body() -> String {
        json!({
            "info": {
                "version": "2.31.0",
                "requires_dist": [
                    "charset-normalizer<4,>=2",
                    "PySocks!=1.5.7,>=1.5.6; extra == \"socks\""
                ],
                "requires_python": ">=3.7",
                "project_urls": {
                    "Documentation": "https://requests.readthedocs.io",
                    "Source": "https://github.com/psf/requests"
                },
                "home_page": "https://requests.readthedocs.io"
            },
            "releases": {
                "2.9.0": [file("2015-12-15T20:00:00.000000Z", false)],
                "2.10.0": [
                    file("2016-04-29T10:00:00.000000Z", false),
                    file("2016-04-29T09:00:00.000000Z", false)
                ],
                "2.30.0": [file("2023-05-03T15:00:00.000000Z", true)],
                "2.31.0": [file("2023-05-22T15:12:42.000000Z", false)],
                "2.32.0rc1": [],
                "not-a-version!": [file("2010-01-01T00:00:00.000000Z", false)]
            }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_versions_from_releases() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pypi/requests/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(project_body())
            .create_async()
            .await;

        let known = client(&server).versions("Requests").await.unwrap();
        let raws: Vec<&str> = known.versions.iter().map(|v| v.raw.as_str()).collect();
        assert_eq!(raws, vec!["2.9.0", "2.10.0", "2.30.0", "2.31.0"]);
        assert_eq!(known.latest.as_deref(), Some("2.31.0"));
        assert_eq!(known.repository_url.as_deref(), Some("https://github.com/psf/requests"));

        assert_eq!(known.versions[2].availability, Some(Availability::Yanked));
        assert_eq!(
            known.versions[1].published_at.unwrap().to_rfc3339(),
            "2016-04-29T09:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_metadata_marks_dev_requirements_unsupported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pypi/requests/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(project_body())
            .create_async()
            .await;

        let metadata = client(&server).metadata("requests").await.unwrap();
        assert_eq!(
            metadata.runtime_requirements,
            FieldValue::Present(vec!["charset-normalizer<4,>=2".to_string()])
        );
        assert_eq!(metadata.development_requirements, FieldValue::NotSupported);
        assert_eq!(metadata.engines, FieldValue::Present(vec!["python >=3.7".to_string()]));
    }

    #[tokio::test]
    async fn test_home_page_fallback_and_missing_requirements() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pypi/tiny-lib/json")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "info": {
                        "version": "0.1.0",
                        "requires_dist": null,
                        "project_urls": null,
                        "home_page": "https://github.com/acme/tiny-lib"
                    },
                    "releases": { "0.1.0": [file("2024-01-01T00:00:00Z", false)] }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let metadata = client(&server).metadata("tiny_lib").await.unwrap();
        assert_eq!(metadata.repository_url.as_deref(), Some("https://github.com/acme/tiny-lib"));
        assert_eq!(metadata.runtime_requirements, FieldValue::Missing);
        assert_eq!(metadata.engines, FieldValue::Missing);
    }

    #[tokio::test]
    async fn test_unknown_project_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/pypi/nope/json")
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server).versions("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
