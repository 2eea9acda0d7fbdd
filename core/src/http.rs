use crate::cache::{CachedResponse, ResponseCache};
use crate::config::HttpConfig;
use crate::error::{DriftError, HttpError};
use regex::Regex;
use reqwest::header::{HeaderMap, LINK};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;
use std::time::Duration;

/// A decoded body together with the `rel="next"` URL from the `Link` header.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub body: T,
    pub next: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    retries: u32,
    backoff_base: Duration,
    bearer_token: Option<String>,
    cache: Option<ResponseCache>,
    retry_rate_limits: bool,
}

impl HttpClient {
    pub fn new(config: &HttpConfig) -> Result<Self, DriftError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DriftError::HttpSetup {
                message: e.to_string(),
            })?;

        Ok(Self {
            client,
            retries: config.retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            bearer_token: None,
            cache: None,
            retry_rate_limits: true,
        })
    }

    pub fn with_cache(mut self, cache: ResponseCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_bearer_token(mut self, token: Option<String>) -> Self {
        self.bearer_token = token;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Rate-limit responses fail immediately instead of being retried.
    pub fn without_rate_limit_retries(mut self) -> Self {
        self.retry_rate_limits = false;
        self
    }

    fn should_retry(&self, err: &HttpError) -> bool {
        match err {
            HttpError::RateLimited { .. } => self.retry_rate_limits && err.is_retryable(),
            other => other.is_retryable(),
        }
    }

    pub fn has_token(&self) -> bool {
        self.bearer_token.is_some()
    }

    pub async fn get_json<T>(&self, url: &str) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
    {
        let page = self.get_json_paged(url).await?;
        Ok(page.body)
    }

    pub async fn get_json_paged<T>(&self, url: &str) -> Result<Page<T>, HttpError>
    where
        T: DeserializeOwned,
    {
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(url)) {
            tracing::trace!(url, "response cache hit");
            return Ok(Page {
                body: decode(url, hit.body)?,
                next: hit.next,
            });
        }

        let response = self.send(url, || self.client.get(url)).await?;
        let next = next_link(response.headers());
        let body = read_value(url, response).await?;

        if let Some(cache) = &self.cache {
            cache.insert(
                url,
                CachedResponse {
                    body: body.clone(),
                    next: next.clone(),
                },
            );
        }

        Ok(Page {
            body: decode(url, body)?,
            next,
        })
    }

    pub async fn post_json<T, B>(&self, url: &str, body: &B) -> Result<T, HttpError>
    where
        T: DeserializeOwned,
        B: Serialize,
    {
        let key = match serde_json::to_string(body) {
            Ok(encoded) => format!("POST {} {}", url, encoded),
            Err(e) => {
                return Err(HttpError::Decode {
                    url: url.to_string(),
                    message: e.to_string(),
                })
            }
        };

        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key)) {
            return decode(url, hit.body);
        }

        let response = self.send(url, || self.client.post(url).json(body)).await?;
        let value = read_value(url, response).await?;

        if let Some(cache) = &self.cache {
            cache.insert(
                key,
                CachedResponse {
                    body: value.clone(),
                    next: None,
                },
            );
        }

        decode(url, value)
    }

    async fn send<F>(&self, url: &str, build: F) -> Result<reqwest::Response, HttpError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0;
        loop {
            let mut request = build();
            if let Some(token) = &self.bearer_token {
                request = request.bearer_auth(token);
            }

            let result = match request.send().await {
                Ok(response) => check_status(url, response),
                Err(source) => Err(HttpError::Transport {
                    url: url.to_string(),
                    source,
                }),
            };

            match result {
                Ok(response) => return Ok(response),
                Err(err) if self.should_retry(&err) && attempt < self.retries => {
                    let delay = self.backoff_base * 2u32.pow(attempt);
                    tracing::debug!(
                        url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying request"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn check_status(url: &str, response: reqwest::Response) -> Result<reqwest::Response, HttpError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::NOT_FOUND {
        return Err(HttpError::NotFound {
            url: url.to_string(),
        });
    }

    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        let headers = response.headers();
        let remaining = header_or_na(headers, "x-ratelimit-remaining");
        if remaining == "0" {
            return Err(HttpError::RateLimited {
                url: url.to_string(),
                status: status.as_u16(),
                remaining,
                limit: header_or_na(headers, "x-ratelimit-limit"),
                reset: header_or_na(headers, "x-ratelimit-reset"),
            });
        }
    }

    Err(HttpError::Status {
        url: url.to_string(),
        status: status.as_u16(),
    })
}

fn header_or_na(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("N/A")
        .to_string()
}

fn next_link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"<([^>]*)>\s*;\s*rel="next""#).expect("valid regex"))
}

fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    next_link_pattern()
        .captures(link)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

async fn read_value(url: &str, response: reqwest::Response) -> Result<Value, HttpError> {
    let bytes = response.bytes().await.map_err(|source| HttpError::Transport {
        url: url.to_string(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|e| HttpError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(url: &str, value: Value) -> Result<T, HttpError> {
    serde_json::from_value(value).map_err(|e| HttpError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_client() -> HttpClient {
        let config = HttpConfig {
            backoff_base_ms: 1,
            retries: 2,
            ..HttpConfig::default()
        };
        HttpClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let err = test_client()
            .get_json::<Value>(&format!("{}/missing", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::NotFound { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_server_errors_are_retried_until_exhausted() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/flaky")
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let err = test_client()
            .get_json::<Value>(&format!("{}/flaky", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Status { status: 503, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_malformed_body_is_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/garbled")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body("{not json")
            .expect(1)
            .create_async()
            .await;

        let err = test_client()
            .get_json::<Value>(&format!("{}/garbled", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::Decode { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_headers_are_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/limited")
            .with_status(403)
            .with_header("x-ratelimit-remaining", "0")
            .with_header("x-ratelimit-limit", "60")
            .with_header("x-ratelimit-reset", "1700000000")
            .expect(1)
            .create_async()
            .await;

        let err = test_client()
            .get_json::<Value>(&format!("{}/limited", server.url()))
            .await
            .unwrap_err();

        match err {
            HttpError::RateLimited { remaining, limit, reset, .. } => {
                assert_eq!(remaining, "0");
                assert_eq!(limit, "60");
                assert_eq!(reset, "1700000000");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_registry_rate_limits_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("x-ratelimit-remaining", "0")
            .expect(3)
            .create_async()
            .await;

        let err = test_client()
            .get_json::<Value>(&format!("{}/busy", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::RateLimited { status: 429, .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_retries_can_be_disabled() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/busy")
            .with_status(429)
            .with_header("x-ratelimit-remaining", "0")
            .expect(1)
            .create_async()
            .await;

        let err = test_client()
            .without_rate_limit_retries()
            .get_json::<Value>(&format!("{}/busy", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, HttpError::RateLimited { .. }));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_next_link_is_extracted() {
        let mut server = mockito::Server::new_async().await;
        let next = format!("{}/items?page=2", server.url());
        let _mock = server
            .mock("GET", "/items")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_header(
                "link",
                &format!(r#"<{}>; rel="next", <{}/items?page=9>; rel="last""#, next, server.url()),
            )
            .with_body(json!([1, 2]).to_string())
            .create_async()
            .await;

        let page: Page<Vec<u32>> = test_client()
            .get_json_paged(&format!("{}/items", server.url()))
            .await
            .unwrap();

        assert_eq!(page.body, vec![1, 2]);
        assert_eq!(page.next.as_deref(), Some(next.as_str()));
    }

    #[tokio::test]
    async fn test_cache_deduplicates_identical_requests() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/pkg")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name":"pkg"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_client().with_cache(ResponseCache::new());
        let url = format!("{}/pkg", server.url());
        let first: Value = client.get_json(&url).await.unwrap();
        let second: Value = client.get_json(&url).await.unwrap();

        assert_eq!(first, second);
        mock.assert_async().await;
    }
}
