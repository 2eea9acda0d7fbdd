use async_trait::async_trait;
use chrono::{DateTime, Utc};
use driftwatch_core::error::RegistryError;
use driftwatch_core::http::HttpClient;
use driftwatch_core::plugin::{FieldValue, PackageMetadata, PackageVersions, RegistryClient};
use driftwatch_core::types::{Ecosystem, VersionScheme};
use driftwatch_core::version::{Availability, Version, VersionComparator};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Full packument (`GET /<name>`), trimmed to what drift analysis reads.
#[derive(Debug, Deserialize)]
struct Packument {
    #[serde(default, rename = "dist-tags")]
    dist_tags: BTreeMap<String, String>,
    #[serde(default)]
    versions: BTreeMap<String, VersionManifest>,
    #[serde(default)]
    time: BTreeMap<String, Value>,
    #[serde(default)]
    repository: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionManifest {
    #[serde(default)]
    deprecated: Option<Value>,
    dependencies: Option<BTreeMap<String, String>>,
    dev_dependencies: Option<BTreeMap<String, String>>,
    engines: Option<BTreeMap<String, String>>,
    #[serde(default)]
    repository: Option<Value>,
}

impl VersionManifest {
    /// npm stores `deprecated` as a message; an empty string means un-deprecated.
    fn is_deprecated(&self) -> bool {
        match &self.deprecated {
            Some(Value::String(message)) => !message.is_empty(),
            Some(Value::Bool(flag)) => *flag,
            _ => false,
        }
    }
}

const TIME_BOOKKEEPING_KEYS: [&str; 3] = ["created", "modified", "unpublished"];

impl Packument {
    fn published_at(&self, version: &str) -> Option<DateTime<Utc>> {
        self.time
            .get(version)
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// Versions the registry once served but no longer lists.
    fn unpublished_versions(&self) -> Vec<String> {
        let mut unpublished: Vec<String> = self
            .time
            .keys()
            .filter(|k| !TIME_BOOKKEEPING_KEYS.contains(&k.as_str()))
            .filter(|k| !self.versions.contains_key(*k))
            .cloned()
            .collect();

        if let Some(listed) = self
            .time
            .get("unpublished")
            .and_then(|u| u.get("versions"))
            .and_then(|v| v.as_array())
        {
            for version in listed.iter().filter_map(|v| v.as_str()) {
                if !unpublished.iter().any(|u| u == version) {
                    unpublished.push(version.to_string());
                }
            }
        }

        unpublished
    }

    fn repository_url(&self) -> Option<String> {
        self.repository
            .as_ref()
            .and_then(repository_field_url)
            .or_else(|| {
                let latest = self.dist_tags.get("latest")?;
                self.versions
                    .get(latest)?
                    .repository
                    .as_ref()
                    .and_then(repository_field_url)
            })
    }
}

/// `repository` is either a shorthand string or `{ "type": "git", "url": ... }`.
fn repository_field_url(value: &Value) -> Option<String> {
    match value {
        Value::String(url) => Some(url.clone()),
        Value::Object(map) => map.get("url").and_then(|u| u.as_str()).map(|u| u.to_string()),
        _ => None,
    }
    .filter(|url| !url.trim().is_empty())
}

fn requirement_list(table: &Option<BTreeMap<String, String>>) -> FieldValue<Vec<String>> {
    match table {
        Some(entries) if !entries.is_empty() => FieldValue::Present(
            entries
                .iter()
                .map(|(name, range)| format!("{}@{}", name, range))
                .collect(),
        ),
        _ => FieldValue::Missing,
    }
}

fn engine_list(table: &Option<BTreeMap<String, String>>) -> FieldValue<Vec<String>> {
    match table {
        Some(entries) if !entries.is_empty() => FieldValue::Present(
            entries
                .iter()
                .map(|(engine, range)| format!("{} {}", engine, range))
                .collect(),
        ),
        _ => FieldValue::Missing,
    }
}

/// Scoped names keep their `@` but the slash must be escaped.
fn encode_name(name: &str) -> String {
    name.replace('/', "%2F")
}

pub struct NpmRegistryClient {
    client: HttpClient,
    base_url: String,
}

impl NpmRegistryClient {
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

    async fn packument(&self, name: &str) -> Result<Packument, RegistryError> {
        let url = format!("{}/{}", self.base_url, encode_name(name));
        tracing::debug!(package = name, %url, "fetching npm packument");
        self.client
            .get_json(&url)
            .await
            .map_err(|e| RegistryError::from_http(name, e))
    }
}

#[async_trait]
impl RegistryClient for NpmRegistryClient {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    async fn versions(&self, name: &str) -> Result<PackageVersions, RegistryError> {
        let packument = self.packument(name).await?;

        let mut versions = Vec::with_capacity(packument.versions.len());
        for (raw, manifest) in &packument.versions {
            let Ok(version) = Version::parse(raw, VersionScheme::SemVer) else {
                tracing::debug!(package = name, version = %raw, "skipping unparseable registry version");
                continue;
            };
            let availability = if manifest.is_deprecated() {
                Availability::Deprecated
            } else {
                Availability::Available
            };
            versions.push(
                version
                    .with_published_at(packument.published_at(raw))
                    .with_availability(availability),
            );
        }

        for raw in packument.unpublished_versions() {
            if let Ok(version) = Version::parse(&raw, VersionScheme::SemVer) {
                versions.push(
                    version
                        .with_published_at(packument.published_at(&raw))
                        .with_availability(Availability::Unpublished),
                );
            }
        }

        VersionComparator::sort(&mut versions).map_err(|e| RegistryError::Malformed {
            package: name.to_string(),
            message: e.to_string(),
        })?;

        Ok(PackageVersions {
            versions,
            latest: packument.dist_tags.get("latest").cloned(),
            repository_url: packument.repository_url(),
        })
    }

    async fn metadata(&self, name: &str) -> Result<PackageMetadata, RegistryError> {
        let packument = self.packument(name).await?;
        let repository_url = packument.repository_url();

        let latest = packument
            .dist_tags
            .get("latest")
            .and_then(|tag| packument.versions.get(tag));

        Ok(match latest {
            Some(manifest) => PackageMetadata {
                runtime_requirements: requirement_list(&manifest.dependencies),
                development_requirements: requirement_list(&manifest.dev_dependencies),
                engines: engine_list(&manifest.engines),
                repository_url,
            },
            None => PackageMetadata {
                runtime_requirements: FieldValue::Missing,
                development_requirements: FieldValue::Missing,
                engines: FieldValue::Missing,
                repository_url,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use driftwatch_core::config::HttpConfig;
    use serde_json::json;

    fn client(server: &mockito::Server) -> NpmRegistryClient {
        let config = HttpConfig {
            retries: 0,
            ..HttpConfig::default()
        };
        NpmRegistryClient::new(HttpClient::new(&config).unwrap()).with_base_url(server.url())
    }

    fn packument() -> Value {
        json!({
            "name": "alpha",
            "dist-tags": { "latest": "4.2.0", "next": "5.0.0-beta.1" },
            "versions": {
                "1.0.0": {},
                "2.2.0": { "deprecated": "" },
                "3.0.0": { "deprecated": "use 4.x" },
                "4.2.0": {
                    "dependencies": { "left-pad": "^1.3.0" },
                    "engines": { "node": ">=18" }
                },
                "5.0.0-beta.1": {}
            },
            "time": {
                "created": "2019-01-01T00:00:00.000Z",
                "modified": "2024-03-01T00:00:00.000Z",
                "1.0.0": "2019-01-01T00:00:00.000Z",
                "2.2.0": "2020-03-01T00:00:00.000Z",
                "2.3.0": "2020-06-01T00:00:00.000Z",
                "3.0.0": "2021-01-01T00:00:00.000Z",
                "4.2.0": "2024-03-01T00:00:00.000Z",
                "5.0.0-beta.1": "2024-04-01T00:00:00.000Z"
            },
            "repository": { "type": "git", "url": "git+https://github.com/acme/alpha.git" }
        })
    }

    #[tokio::test]
    async fn test_versions_reads_packument() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/alpha")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(packument().to_string())
            .create_async()
            .await;

        let known = client(&server).versions("alpha").await.unwrap();
        let raws: Vec<&str> = known.versions.iter().map(|v| v.raw.as_str()).collect();
        assert_eq!(raws, vec!["1.0.0", "2.2.0", "2.3.0", "3.0.0", "4.2.0", "5.0.0-beta.1"]);
        assert_eq!(known.latest.as_deref(), Some("4.2.0"));
        assert_eq!(
            known.repository_url.as_deref(),
            Some("git+https://github.com/acme/alpha.git")
        );

        assert_eq!(known.versions[1].availability, Some(Availability::Available));
        assert_eq!(known.versions[2].availability, Some(Availability::Unpublished));
        assert_eq!(known.versions[3].availability, Some(Availability::Deprecated));
        assert_eq!(
            known.versions[4].published_at.unwrap().to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
    }

    #[tokio::test]
    async fn test_scoped_name_is_escaped() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", mockito::Matcher::Regex(r"^/@scope%2[Ff]beta$".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "dist-tags": { "latest": "5.3.8" },
                    "versions": { "5.3.8": { "repository": "github:acme/beta" } },
                    "time": { "5.3.8": "2023-01-01T00:00:00.000Z" }
                })
                .to_string(),
            )
            .expect(1)
            .create_async()
            .await;

        let known = client(&server).versions("@scope/beta").await.unwrap();
        assert_eq!(known.versions.len(), 1);
        assert_eq!(known.repository_url.as_deref(), Some("github:acme/beta"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fully_unpublished_package() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/gone")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "name": "gone",
                    "time": {
                        "created": "2019-01-01T00:00:00.000Z",
                        "1.0.0": "2019-01-01T00:00:00.000Z",
                        "unpublished": { "time": "2022-01-01T00:00:00.000Z", "versions": ["1.0.0", "1.1.0"] }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let known = client(&server).versions("gone").await.unwrap();
        assert_eq!(known.versions.len(), 2);
        assert!(known.versions.iter().all(|v| v.is_unpublished()));
        assert!(known.latest.is_none());
    }

    #[tokio::test]
    async fn test_missing_package_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/nope")
            .with_status(404)
            .create_async()
            .await;

        let err = client(&server).versions("nope").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_metadata_from_latest_manifest() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/alpha")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(packument().to_string())
            .create_async()
            .await;

        let metadata = client(&server).metadata("alpha").await.unwrap();
        assert_eq!(
            metadata.runtime_requirements,
            FieldValue::Present(vec!["left-pad@^1.3.0".to_string()])
        );
        assert_eq!(metadata.development_requirements, FieldValue::Missing);
        assert_eq!(metadata.engines, FieldValue::Present(vec!["node >=18".to_string()]));
    }
}
