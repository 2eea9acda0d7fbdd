use crate::types::{PackageManager, VersionScheme};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriftError {
    #[error(transparent)]
    Detection(#[from] DetectionError),

    #[error(transparent)]
    LockfileParsing(#[from] LockfileParsingError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error in config '{file}':\n{}", .errors.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation { file: PathBuf, errors: Vec<String> },

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid YAML syntax in '{file}' at {line}:{column}: {message}")]
    YamlSyntax {
        file: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Invalid directory path '{path}': {reason}")]
    InvalidDirectory { path: String, reason: String },

    #[error("No plugin registered for package manager '{manager}'")]
    MissingPlugin { manager: PackageManager },

    #[error("HTTP client could not be built: {message}")]
    HttpSetup { message: String },

    #[error("Analysis cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, DriftError>;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("No recognized ecosystem in '{root}'")]
    NoRecognizedEcosystem { root: PathBuf },

    #[error("Found '{manifest}' in '{root}' but no supported lockfile next to it")]
    ManifestWithoutLockfile {
        root: PathBuf,
        manifest: &'static str,
    },

    #[error("Requested package manager '{manager}' has no manifest/lockfile pair in '{root}'")]
    OverrideNotPresent {
        root: PathBuf,
        manager: PackageManager,
    },
}

#[derive(Debug, Error)]
pub enum LockfileParsingError {
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid TOML in '{path}': {message}")]
    Toml { path: PathBuf, message: String },

    #[error("Unsupported lockfile schema in '{path}' ({header})")]
    UnsupportedSchema { path: PathBuf, header: String },

    #[error("Missing field '{field}' in '{path}'")]
    MissingField { path: PathBuf, field: String },

    #[error("Invalid content in '{path}': {message}")]
    Invalid { path: PathBuf, message: String },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Package '{package}' not found in registry")]
    NotFound { package: String },

    #[error("Registry unavailable for '{package}': {message}")]
    Transient { package: String, message: String },

    #[error("Malformed registry response for '{package}': {message}")]
    Malformed { package: String, message: String },
}

impl RegistryError {
    pub fn from_http(package: &str, err: HttpError) -> Self {
        match err {
            HttpError::NotFound { .. } => RegistryError::NotFound {
                package: package.to_string(),
            },
            HttpError::Decode { .. } => RegistryError::Malformed {
                package: package.to_string(),
                message: err.to_string(),
            },
            other => RegistryError::Transient {
                package: package.to_string(),
                message: other.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RegistryError::NotFound { .. })
    }
}

#[derive(Debug, Error)]
pub enum MiningError {
    #[error("Source repository credential required for a full scan (set GITHUB_TOKEN)")]
    MissingCredential,

    #[error("Repository '{url}' is not hosted on a supported source host")]
    UnsupportedRepository { url: String },

    #[error("Source host rate limit exceeded (remaining: {remaining}, limit: {limit}, reset: {reset})")]
    RateLimited {
        remaining: String,
        limit: String,
        reset: String,
    },

    #[error("Source host request failed: {message}")]
    Request { message: String },

    #[error("Malformed source host response: {message}")]
    Malformed { message: String },
}

impl From<HttpError> for MiningError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::RateLimited {
                remaining,
                limit,
                reset,
                ..
            } => MiningError::RateLimited {
                remaining,
                limit,
                reset,
            },
            HttpError::Decode { .. } => MiningError::Malformed {
                message: err.to_string(),
            },
            other => MiningError::Request {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum VulnerabilityFeedError {
    #[error("Vulnerability feed unavailable: {message}")]
    Unavailable { message: String },

    #[error("Malformed vulnerability feed response: {message}")]
    Malformed { message: String },
}

impl From<HttpError> for VulnerabilityFeedError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Decode { .. } => VulnerabilityFeedError::Malformed {
                message: err.to_string(),
            },
            other => VulnerabilityFeedError::Unavailable {
                message: other.to_string(),
            },
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("'{raw}' is not a valid {scheme} version")]
    Invalid { raw: String, scheme: VersionScheme },

    #[error("Cannot compare a {left} version with a {right} version")]
    Incomparable {
        left: VersionScheme,
        right: VersionScheme,
    },
}

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("{url} returned 404")]
    NotFound { url: String },

    #[error("{url} is rate limited (remaining: {remaining}, limit: {limit}, reset: {reset})")]
    RateLimited {
        url: String,
        status: u16,
        remaining: String,
        limit: String,
        reset: String,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl HttpError {
    /// Transport failures, 429 and 5xx are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Transport { .. } => true,
            HttpError::RateLimited { status, .. } => *status == 429,
            HttpError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
