// src/loader/client.rs
use crate::loader::instrument;
use crate::utils::error::{FetchAttemptError, LoadError};
use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub javascript_enabled: bool,
    pub timeout_ms: u64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            javascript_enabled: true,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

/// Anything that can turn a URL into instrumented markup.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch(&self, url: &str, options: &LoadOptions) -> Result<String, LoadError>;
}

// --- Wire formats ---
#[derive(Debug, Serialize)]
struct ProxyRequest<'a> {
    url: &'a str,
    options: ProxyOptions,
}

#[derive(Debug, Serialize)]
struct ProxyOptions {
    javascript: bool,
    timeout: u64,
}

#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    success: bool,
    #[serde(default)]
    data: Option<ProxyData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProxyData {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RelayEnvelope {
    contents: Option<String>,
}

/// Fetches rendered markup through the first-party proxy, falling back to a public relay.
#[derive(Debug, Clone)]
pub struct ContentLoader {
    client: reqwest::Client,
    proxy_endpoint: String,
    relay_endpoint: String,
}

impl ContentLoader {
    pub fn new(proxy_endpoint: &str, relay_endpoint: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("selector_scraper/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            proxy_endpoint: proxy_endpoint.to_string(),
            relay_endpoint: relay_endpoint.to_string(),
        })
    }

    /// Loads `url` and returns instrumented markup. No retries: a failure is final
    /// until the caller asks again.
    pub async fn load(&self, url: &str, options: &LoadOptions) -> Result<String, LoadError> {
        let target = validate_target(url)?;
        tracing::info!("Loading {}", target);

        let primary = match self.fetch_via_proxy(target.as_str(), options).await {
            Ok(content) => {
                tracing::debug!("Proxy returned {} bytes for {}", content.len(), target);
                return Ok(instrument::instrument(&content));
            }
            Err(e) => {
                tracing::warn!("Proxy load failed for {}: {}. Trying relay.", target, e);
                e
            }
        };

        match self.fetch_via_relay(target.as_str(), options).await {
            Ok(content) => {
                tracing::debug!("Relay returned {} bytes for {}", content.len(), target);
                Ok(instrument::instrument(&content))
            }
            Err(fallback) => {
                tracing::error!("Relay load failed for {}: {}", target, fallback);
                Err(LoadError::Exhausted {
                    url: url.to_string(),
                    primary: primary.to_string(),
                    fallback: fallback.to_string(),
                })
            }
        }
    }

    async fn fetch_via_proxy(&self, url: &str, options: &LoadOptions) -> Result<String, FetchAttemptError> {
        let request = ProxyRequest {
            url,
            options: ProxyOptions {
                javascript: options.javascript_enabled,
                timeout: options.timeout_ms,
            },
        };
        let response = self
            .client
            .post(&self.proxy_endpoint)
            .timeout(Duration::from_millis(options.timeout_ms))
            .header(header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await
            .map_err(FetchAttemptError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchAttemptError::Http(status));
        }

        let envelope: ProxyEnvelope = response
            .json()
            .await
            .map_err(|e| FetchAttemptError::Malformed(e.to_string()))?;
        if !envelope.success {
            return Err(FetchAttemptError::Malformed(
                envelope.error.unwrap_or_else(|| "proxy reported failure".to_string()),
            ));
        }
        envelope
            .data
            .and_then(|d| d.content)
            .ok_or_else(|| FetchAttemptError::Malformed("missing data.content".to_string()))
    }

    async fn fetch_via_relay(&self, url: &str, options: &LoadOptions) -> Result<String, FetchAttemptError> {
        let relay_url = reqwest::Url::parse_with_params(&self.relay_endpoint, &[("url", url)])
            .map_err(|e| FetchAttemptError::Malformed(format!("bad relay endpoint: {}", e)))?;
        let response = self
            .client
            .get(relay_url)
            .timeout(Duration::from_millis(options.timeout_ms))
            .send()
            .await
            .map_err(FetchAttemptError::from_request)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchAttemptError::Http(status));
        }

        let envelope: RelayEnvelope = response
            .json()
            .await
            .map_err(|e| FetchAttemptError::Malformed(e.to_string()))?;
        envelope
            .contents
            .ok_or_else(|| FetchAttemptError::Malformed("missing contents".to_string()))
    }
}

#[async_trait]
impl PageSource for ContentLoader {
    async fn fetch(&self, url: &str, options: &LoadOptions) -> Result<String, LoadError> {
        self.load(url, options).await
    }
}

/// Only absolute http(s) URLs are loadable.
pub fn validate_target(url: &str) -> Result<url::Url, LoadError> {
    let parsed = url::Url::parse(url.trim()).map_err(|e| LoadError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(LoadError::InvalidUrl {
            url: url.to_string(),
            reason: format!("unsupported scheme '{}'", other),
        }),
    }
}
