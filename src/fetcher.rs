//! HTTP client for the APIBAN banned-address feed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::validation::validate_ip;

/// Default feed endpoint
pub const DEFAULT_BASE_URL: &str = "https://apiban.org/api";

const TIMEOUT_SECS: u64 = 30;

/// ID the feed reports when nothing is newer than the requested cursor
const NO_NEW_BANS_ID: &str = "none";

/// Maximum response body accepted from the feed (4 MB)
const MAX_RESPONSE_SIZE: usize = 4 * 1024 * 1024;

/// One page of the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedPage {
    /// Cursor for the next request; equals the request cursor when there is no new data
    pub next_cursor: String,
    /// Banned addresses in feed order
    pub addresses: Vec<String>,
}

#[derive(Error, Debug)]
pub enum FetchError {
    /// Worth retrying later in the same run
    #[error("transient feed error: {0}")]
    Transient(String),

    /// Retrying cannot help (bad key, rejected request)
    #[error("permanent feed error: {0}")]
    Permanent(String),
}

/// Source of banned-address pages
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, api_key: &str, cursor: &str, dataset: &str)
        -> Result<FeedPage, FetchError>;
}

/// Feed client settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub base_url: String,
    /// Verify the server's TLS certificate
    pub verify_tls: bool,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            verify_tls: true,
            timeout: Duration::from_secs(TIMEOUT_SECS),
        }
    }
}

/// Feed response body
#[derive(Debug, Deserialize)]
struct BannedResponse {
    #[serde(default)]
    ipaddress: Vec<String>,
    #[serde(rename = "ID", default)]
    id: Option<serde_json::Value>,
}

impl BannedResponse {
    /// The ID as a string; the feed has sent it both quoted and bare
    fn id(&self) -> Option<String> {
        match self.id.as_ref()? {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

/// HTTP client for the APIBAN feed
pub struct ApibanClient {
    client: Client,
    base_url: Url,
}

impl ApibanClient {
    pub fn new(options: ClientOptions) -> Result<Self> {
        if !options.verify_tls {
            warn!("TLS certificate verification is disabled for the APIBAN feed");
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(format!("apiban-nft-client/{}", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(!options.verify_tls)
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(&options.base_url)
            .with_context(|| format!("Invalid feed URL: {}", options.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("Invalid feed URL: {}", options.base_url);
        }

        Ok(Self { client, base_url })
    }
}

// Note: Default is intentionally not implemented for ApibanClient
// because new() can fail and we want explicit error handling.

#[async_trait]
impl FeedClient for ApibanClient {
    async fn fetch(
        &self,
        api_key: &str,
        cursor: &str,
        dataset: &str,
    ) -> Result<FeedPage, FetchError> {
        let url = banned_url(&self.base_url, api_key, cursor, dataset);
        debug!("Requesting banned list from {} (cursor {})", self.base_url, cursor);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transient(describe(&e)))?;

        let status = response.status();
        if let Some(len) = response.content_length() {
            if len as usize > MAX_RESPONSE_SIZE {
                return Err(FetchError::Transient(format!(
                    "Response too large: {} bytes (max: {} bytes)",
                    len, MAX_RESPONSE_SIZE
                )));
            }
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Transient(format!("Failed to read response body: {}", describe(&e))))?;

        if body.len() > MAX_RESPONSE_SIZE {
            return Err(FetchError::Transient(format!(
                "Downloaded content too large: {} bytes (max: {} bytes)",
                body.len(),
                MAX_RESPONSE_SIZE
            )));
        }

        interpret_response(status, &body, cursor)
    }
}

/// Build `{base}/{api_key}/banned/{cursor}[?set={dataset}]`.
fn banned_url(base: &Url, api_key: &str, cursor: &str, dataset: &str) -> Url {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().extend([api_key, "banned", cursor]);
    }
    if !dataset.is_empty() {
        url.query_pairs_mut().append_pair("set", dataset);
    }
    url
}

/// reqwest error text without the request URL, which carries the API key
fn describe(err: &reqwest::Error) -> String {
    let kind = if err.is_timeout() {
        "timeout"
    } else if err.is_connect() {
        "connection failed"
    } else if err.is_body() || err.is_decode() {
        "bad response body"
    } else {
        "request failed"
    };
    match std::error::Error::source(err) {
        Some(source) => format!("{}: {}", kind, source),
        None => kind.to_string(),
    }
}

/// Classify a feed response into a page or an error.
fn interpret_response(status: StatusCode, body: &str, cursor: &str) -> Result<FeedPage, FetchError> {
    let parsed = serde_json::from_str::<BannedResponse>(body);

    if let Ok(ref response) = parsed {
        if response.id().as_deref() == Some(NO_NEW_BANS_ID) {
            return Ok(FeedPage {
                next_cursor: cursor.to_string(),
                addresses: Vec::new(),
            });
        }
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(FetchError::Permanent(format!(
            "HTTP {}: the API key was rejected",
            status
        )));
    }
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        return Err(FetchError::Transient(format!("HTTP {}", status)));
    }
    if status.is_client_error() {
        return Err(FetchError::Permanent(format!("HTTP {}", status)));
    }
    if !status.is_success() {
        return Err(FetchError::Transient(format!("HTTP {}", status)));
    }

    let response =
        parsed.map_err(|e| FetchError::Transient(format!("Undecodable feed response: {}", e)))?;
    let next_cursor = response
        .id()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| FetchError::Transient("Feed response has no ID".to_string()))?;

    let addresses = response
        .ipaddress
        .into_iter()
        .filter(|entry| match validate_ip(entry) {
            Ok(_) => true,
            Err(_) => {
                debug!("Ignoring non-address feed entry: {:?}", entry);
                false
            }
        })
        .map(|entry| entry.trim().to_string())
        .collect();

    Ok(FeedPage {
        next_cursor,
        addresses,
    })
}
