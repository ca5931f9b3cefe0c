//! Outbound HTTP fetches with normalized transport errors.
//!
//! Transport failures (connect, timeout, TLS) surface as [`FetchError`];
//! HTTP responses are returned whole with their real status code, leaving
//! classification to the caller. TLS certificate verification is disabled
//! by default: rule-set hosts are routinely self-signed, and the tool is
//! useless if it cannot reach them. The trade-off is configurable.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::header::{HeaderMap, CONTENT_TYPE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Method, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::config::FetchConfig;

// ---------------------------------------------------------------------------
// Request / response / error types
// ---------------------------------------------------------------------------

/// One outbound fetch. Construct with [`FetchRequest::get`] and override
/// fields as needed.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Per-request timeout; `None` uses the configured default.
    pub timeout: Option<Duration>,
    pub follow_redirects: bool,
}

impl FetchRequest {
    /// A plain GET of `url` with default settings.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            follow_redirects: true,
        }
    }
}

/// A completed fetch. Any HTTP status lands here, including 4xx/5xx.
#[derive(Debug)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Transport-level fetch failure. The message carries the underlying error
/// text verbatim so callers can surface it to the operator.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid target URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),
}

// ---------------------------------------------------------------------------
// RemoteFetcher
// ---------------------------------------------------------------------------

/// Shared outbound HTTP client pair.
///
/// reqwest fixes the redirect policy at client construction, so one client
/// follows up to the configured hop limit and a second follows none;
/// [`FetchRequest::follow_redirects`] selects between them.
#[derive(Debug, Clone)]
pub struct RemoteFetcher {
    client: reqwest::Client,
    no_redirect_client: reqwest::Client,
    config: FetchConfig,
}

impl RemoteFetcher {
    /// Build the client pair from the fetch configuration.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = builder_from(config)
            .redirect(Policy::limited(config.max_redirects))
            .build()
            .context("failed to build HTTP client")?;
        let no_redirect_client = builder_from(config)
            .redirect(Policy::none())
            .build()
            .context("failed to build non-redirecting HTTP client")?;

        Ok(Self {
            client,
            no_redirect_client,
            config: config.clone(),
        })
    }

    /// Perform one fetch, normalizing transport failures into [`FetchError`].
    pub async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, FetchError> {
        let url: reqwest::Url =
            request
                .url
                .parse()
                .map_err(|e: url::ParseError| FetchError::InvalidUrl {
                    url: request.url.clone(),
                    reason: e.to_string(),
                })?;

        let client = if request.follow_redirects {
            &self.client
        } else {
            &self.no_redirect_client
        };

        let mut headers = request.headers;
        ensure_user_agent(&mut headers, &self.config.user_agent);

        let timeout = request
            .timeout
            .unwrap_or(Duration::from_secs(self.config.timeout_secs));

        let mut builder = client
            .request(request.method, url)
            .headers(headers)
            .timeout(timeout);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(FetchError::Transport)?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await.map_err(FetchError::Transport)?;

        debug!(url = %request.url, %status, bytes = body.len(), "fetch complete");

        Ok(FetchResponse {
            status,
            content_type,
            body,
        })
    }
}

fn builder_from(config: &FetchConfig) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(config.danger_accept_invalid_certs)
        .timeout(Duration::from_secs(config.timeout_secs))
}

/// Inject the configured desktop User-Agent unless the caller already set
/// one. Header names are matched case-insensitively by `HeaderMap`.
fn ensure_user_agent(headers: &mut HeaderMap, user_agent: &str) {
    if headers.contains_key(USER_AGENT) {
        return;
    }
    if let Ok(value) = user_agent.parse() {
        headers.insert(USER_AGENT, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_request_defaults() {
        let req = FetchRequest::get("http://example.com/x.json");
        assert_eq!(req.method, Method::GET);
        assert!(req.headers.is_empty());
        assert!(req.body.is_none());
        assert!(req.timeout.is_none());
        assert!(req.follow_redirects);
    }

    #[test]
    fn user_agent_injected_when_absent() {
        let mut headers = HeaderMap::new();
        ensure_user_agent(&mut headers, "test-agent/1.0");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "test-agent/1.0");
    }

    #[test]
    fn user_agent_preserved_when_present() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, "caller-agent".parse().unwrap());
        ensure_user_agent(&mut headers, "test-agent/1.0");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "caller-agent");
    }

    #[test]
    fn invalid_url_is_a_modeled_error() {
        let fetcher = RemoteFetcher::new(&FetchConfig::default()).unwrap();
        let err = futures_executor(fetcher.fetch(FetchRequest::get("not a url")));
        assert!(matches!(err, Err(FetchError::InvalidUrl { .. })));
    }

    // Minimal block_on so the invalid-URL path (which never touches the
    // network) can be exercised without a full runtime.
    fn futures_executor<F: std::future::Future>(fut: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(fut)
    }
}
