//! Attachment byte-fetch boundary.
//!
//! The pipeline depends on a single capability: turn an attachment id into
//! bytes. [`AttachmentFetcher`] is that seam; [`HttpFetcher`] is the
//! production implementation that calls the dashboard's file proxy route,
//! which in turn talks to the field-service file store with its own credential.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, DEFAULT_MAX_ATTACHMENT_BYTES, READ_TIMEOUT_SECS};
use super::error::{BundleError, FetchError};

/// Retrieves the raw bytes of one attachment.
///
/// Implementations own their authentication, base URL resolution, and
/// transport timeouts. They must eventually resolve (or time out); the
/// pipeline adds its own optional per-fetch timeout on top.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    /// Fetches the attachment identified by `id`.
    ///
    /// # Errors
    ///
    /// Any [`FetchError`]; the pipeline records it against the descriptor
    /// and carries on with the remaining attachments.
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, FetchError>;
}

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    base_url: Url,
    bearer_token: Option<String>,
    connect_timeout: Duration,
    read_timeout: Duration,
    max_attachment_bytes: u64,
}

impl HttpFetcherConfig {
    /// Creates a config for the proxy route at `base_url`.
    ///
    /// Attachment ids are appended as a single encoded path segment, so
    /// `https://host/api/attachments` fetches `https://host/api/attachments/{id}`.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::InvalidBaseUrl`] if the URL does not parse, is
    /// not http(s), or cannot carry path segments.
    pub fn new(base_url: &str) -> Result<Self, BundleError> {
        let parsed = Url::parse(base_url).map_err(|e| BundleError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(BundleError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: "expected an http(s) URL".to_string(),
            });
        }

        Ok(Self {
            base_url: parsed,
            bearer_token: None,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        })
    }

    /// Sends `Authorization: Bearer {token}` with every request.
    #[must_use]
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// Overrides the connect and overall request timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    /// Overrides the per-attachment size cap.
    #[must_use]
    pub fn with_max_attachment_bytes(mut self, limit: u64) -> Self {
        self.max_attachment_bytes = limit;
        self
    }

    /// Proxy URL for one attachment.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::UnaddressableId`] for `""`, `"."` and `".."`.
    /// URL parsing drops or resolves those segments even when
    /// percent-encoded, so they would address the collection route instead.
    pub fn attachment_url(&self, id: &str) -> Result<Url, FetchError> {
        if matches!(id, "" | "." | "..") {
            return Err(FetchError::UnaddressableId { id: id.to_string() });
        }
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(id);
        }
        Ok(url)
    }

    /// Configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Configured size cap in bytes.
    #[must_use]
    pub fn max_attachment_bytes(&self) -> u64 {
        self.max_attachment_bytes
    }
}

/// Fetches attachments with HTTP GET against the file proxy route.
///
/// Created once per run and shared by every worker, so connections are pooled.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    config: HttpFetcherConfig,
}

impl HttpFetcher {
    /// Builds the underlying HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`BundleError::HttpClient`] if reqwest rejects the configuration.
    #[instrument(level = "debug", skip(config), fields(base_url = %config.base_url))]
    pub fn new(config: HttpFetcherConfig) -> Result<Self, BundleError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.read_timeout)
            .gzip(true)
            .user_agent(default_user_agent())
            .build()
            .map_err(|source| BundleError::HttpClient { source })?;

        debug!(
            connect_timeout_ms = config.connect_timeout.as_millis(),
            read_timeout_ms = config.read_timeout.as_millis(),
            max_attachment_bytes = config.max_attachment_bytes,
            authenticated = config.bearer_token.is_some(),
            "created attachment HTTP fetcher"
        );

        Ok(Self { client, config })
    }

    /// Returns the fetcher configuration.
    #[must_use]
    pub fn config(&self) -> &HttpFetcherConfig {
        &self.config
    }
}

#[async_trait]
impl AttachmentFetcher for HttpFetcher {
    #[instrument(skip(self), fields(id = %id))]
    async fn fetch(&self, id: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.config.attachment_url(id)?;
        let mut request = self.client.get(url);
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| map_transport_error(id, e))?;

        let status = response.status();
        if !status.is_success() {
            let code = status.as_u16();
            if matches!(code, 401 | 403) {
                return Err(FetchError::auth_required(id, code));
            }
            return Err(FetchError::http_status(id, code));
        }

        let limit = self.config.max_attachment_bytes;
        let expected_len = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if expected_len.is_some_and(|len| len > limit) {
            return Err(FetchError::too_large(id, limit));
        }

        let mut body = Vec::with_capacity(
            expected_len
                .and_then(|len| usize::try_from(len).ok())
                .unwrap_or_default(),
        );
        let mut stream = response.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| map_transport_error(id, e))?;
            if body.len() as u64 + chunk.len() as u64 > limit {
                return Err(FetchError::too_large(id, limit));
            }
            body.extend_from_slice(&chunk);
        }

        if let Some(expected) = expected_len
            && expected != body.len() as u64
        {
            return Err(FetchError::malformed(
                id,
                format!(
                    "expected {expected} bytes from Content-Length, received {}",
                    body.len()
                ),
            ));
        }

        debug!(bytes = body.len(), "attachment fetched");
        Ok(body)
    }
}

fn map_transport_error(id: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::timeout(id)
    } else if error.is_decode() || error.is_body() {
        FetchError::malformed(id, error.to_string())
    } else {
        FetchError::network(id, error)
    }
}

fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("attachment-bundler/{version}")
}
