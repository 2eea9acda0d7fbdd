//! Run configuration.
//!
//! Every remote client receives the section it needs through its constructor.
//! Nothing here is read from the environment; the CLI injects the source-host
//! credential with [`DriftConfig::with_github_token`].

use crate::error::{DriftError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const MAX_RETRIES: u32 = 10;
const MAX_IN_FLIGHT: usize = 256;
const MAX_PAGES: usize = 100;
const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftConfig {
    pub registries: RegistryConfig,
    pub osv: OsvConfig,
    pub github: GithubConfig,
    pub http: HttpConfig,
    pub concurrency: ConcurrencyConfig,
    pub cache: CacheConfig,
    /// Analyse development dependencies as well as production ones.
    pub include_development: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub npm_url: String,
    pub pypi_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OsvConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_url: String,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Page ceiling per repository when authenticated.
    pub max_pages: usize,
    /// Page ceiling per repository without a token.
    pub unauthenticated_max_pages: usize,
    pub per_page: usize,
    /// Full-scan mode: a missing token is an error instead of partial coverage.
    pub require_token: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub retries: u32,
    pub backoff_base_ms: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Upper bound on simultaneous remote calls for the whole run.
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            registries: RegistryConfig::default(),
            osv: OsvConfig::default(),
            github: GithubConfig::default(),
            http: HttpConfig::default(),
            concurrency: ConcurrencyConfig::default(),
            cache: CacheConfig::default(),
            include_development: true,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            npm_url: "https://registry.npmjs.org".to_string(),
            pypi_url: "https://pypi.org".to_string(),
        }
    }
}

impl Default for OsvConfig {
    fn default() -> Self {
        Self {
            url: "https://api.osv.dev".to_string(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            max_pages: 10,
            unauthenticated_max_pages: 2,
            per_page: 100,
            require_token: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            retries: 3,
            backoff_base_ms: 1000,
            user_agent: format!("driftwatch/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self { max_in_flight: 16 }
    }
}

impl GithubConfig {
    pub fn is_authenticated(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn page_ceiling(&self) -> usize {
        if self.is_authenticated() {
            self.max_pages
        } else {
            self.unauthenticated_max_pages.min(self.max_pages)
        }
    }
}

impl DriftConfig {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(DriftError::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse_yaml(&content, path)?;
        config.validate_for(path)?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config = Self::parse_yaml(content, Path::new("<inline>"))?;
        config.validate()?;
        Ok(config)
    }

    fn parse_yaml(content: &str, path: &Path) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| {
            let (line, column) = e
                .location()
                .map(|loc| (loc.line(), loc.column()))
                .unwrap_or((0, 0));
            DriftError::YamlSyntax {
                file: path.to_path_buf(),
                line,
                column,
                message: e.to_string(),
            }
        })
    }

    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github.token = token.filter(|t| !t.trim().is_empty());
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_for(Path::new("<inline>"))
    }

    /// Collects every violation instead of stopping at the first one.
    fn validate_for(&self, file: &Path) -> Result<()> {
        let mut errors = Vec::new();

        for (field, url) in [
            ("registries.npm_url", &self.registries.npm_url),
            ("registries.pypi_url", &self.registries.pypi_url),
            ("osv.url", &self.osv.url),
            ("github.api_url", &self.github.api_url),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                errors.push(format!("{}: '{}' must be an http(s) URL", field, url));
            }
        }

        if self.http.retries > MAX_RETRIES {
            errors.push(format!("http.retries: must be 0-{}", MAX_RETRIES));
        }
        if self.http.timeout_secs == 0 {
            errors.push("http.timeout_secs: must be greater than 0".to_string());
        }
        if self.http.user_agent.trim().is_empty() {
            errors.push("http.user_agent: must not be empty".to_string());
        }
        if self.concurrency.max_in_flight == 0 || self.concurrency.max_in_flight > MAX_IN_FLIGHT {
            errors.push(format!("concurrency.max_in_flight: must be 1-{}", MAX_IN_FLIGHT));
        }
        if self.github.max_pages == 0 || self.github.max_pages > MAX_PAGES {
            errors.push(format!("github.max_pages: must be 1-{}", MAX_PAGES));
        }
        if self.github.unauthenticated_max_pages > self.github.max_pages {
            errors.push("github.unauthenticated_max_pages: must not exceed github.max_pages".to_string());
        }
        if self.github.per_page == 0 || self.github.per_page > MAX_PER_PAGE {
            errors.push(format!("github.per_page: must be 1-{}", MAX_PER_PAGE));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DriftError::Validation {
                file: PathBuf::from(file),
                errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_is_valid() {
        DriftConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = DriftConfig::from_yaml_str(
            r#"
github:
  max_pages: 4
concurrency:
  max_in_flight: 2
"#,
        )
        .unwrap();
        assert_eq!(config.github.max_pages, 4);
        assert_eq!(config.github.per_page, 100);
        assert_eq!(config.concurrency.max_in_flight, 2);
        assert_eq!(config.registries.npm_url, "https://registry.npmjs.org");
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_validation_reports_every_violation() {
        let err = DriftConfig::from_yaml_str(
            r#"
osv:
  url: "ftp://osv"
concurrency:
  max_in_flight: 0
"#,
        )
        .unwrap_err();
        match err {
            DriftError::Validation { errors, .. } => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].starts_with("osv.url"));
                assert!(errors[1].starts_with("concurrency.max_in_flight"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_yaml_is_syntax_error() {
        let err = DriftConfig::from_yaml_str("github: [unclosed").unwrap_err();
        assert!(matches!(err, DriftError::YamlSyntax { .. }));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = DriftConfig::load(&temp_dir.path().join("driftwatch.yaml")).unwrap_err();
        assert!(matches!(err, DriftError::ConfigNotFound(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("driftwatch.yaml");
        fs::write(&path, "include_development: false\ncache:\n  enabled: true\n").unwrap();

        let config = DriftConfig::load(&path).unwrap();
        assert!(!config.include_development);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_page_ceiling_depends_on_token() {
        let config = DriftConfig::default();
        assert_eq!(config.github.page_ceiling(), 2);

        let config = config.with_github_token(Some("ghp_example".to_string()));
        assert_eq!(config.github.page_ceiling(), 10);

        let config = DriftConfig::default().with_github_token(Some("  ".to_string()));
        assert!(!config.github.is_authenticated());
    }
}
