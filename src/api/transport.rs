//! Pluggable HTTP execution primitive.
//!
//! The client composes over this trait instead of extending a transport
//! base type, so tests can inject an in-memory double and production code
//! uses [`ReqwestTransport`].

use std::collections::HashMap;
use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use thiserror::Error;
use tracing::debug;

/// Default HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Raw result of one HTTP exchange: response headers plus the body, if any.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// Connection-level failure from the transport. Propagated to callers
/// unchanged; the client never retries.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct TransportError {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::with_source(err.to_string(), err)
    }
}

/// One synchronous-from-the-caller's-view HTTP exchange: a single attempt,
/// erroring on connection failure. No retry, no backoff.
#[async_trait]
pub trait HttpExecute: Send + Sync {
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        headers: &HashMap<String, String>,
    ) -> Result<RawResponse, TransportError>;
}

/// Production transport over reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Transport with a caller-chosen request timeout, e.g. from
    /// [`Config::timeout`](crate::config::Config::timeout).
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    fn header_map(headers: &HashMap<String, String>) -> Result<HeaderMap, TransportError> {
        let mut map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportError::with_source(format!("invalid header name {name:?}"), e))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| TransportError::with_source(format!("invalid value for header {name}"), e))?;
            map.insert(name, value);
        }
        Ok(map)
    }
}

#[async_trait]
impl HttpExecute for ReqwestTransport {
    async fn execute(
        &self,
        method: Method,
        url: &str,
        body: Option<String>,
        headers: &HashMap<String, String>,
    ) -> Result<RawResponse, TransportError> {
        debug!(%method, url, "sending HTTP request");

        let mut request = self
            .client
            .request(method, url)
            .headers(Self::header_map(headers)?);
        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body);
        }

        // Status handling is left to the caller: any response that arrives
        // is returned as-is, only connection failures become errors.
        let response = request.send().await?;
        let status = response.status();
        debug!(url, %status, "received HTTP response");

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let text = response.text().await?;
        let body = if text.is_empty() { None } else { Some(text) };

        Ok(RawResponse { headers, body })
    }
}
