//! HTTP client abstraction and the shared transaction manager.
//!
//! [`AsyncHttpClient`] lets tests inject canned responses in place of the
//! reqwest client. [`HttpTransactionManager`] runs each request as a tokio
//! task and routes the body back to the caller's completion callback.

mod transactions;

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::error::ErrorCode;

pub use transactions::{HttpCallback, HttpRequest, HttpTransactionManager, HttpTransport, TaskId};

/// Default request timeout.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default User-Agent. Nominatim's usage policy rejects anonymous clients.
pub const DEFAULT_USER_AGENT: &str = concat!("geolocd/", env!("CARGO_PKG_VERSION"));

/// HTTP failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HttpError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request failed: {0}")]
    Request(String),
}

impl From<HttpError> for ErrorCode {
    fn from(e: HttpError) -> Self {
        match e {
            HttpError::Timeout(_) => ErrorCode::Timeout,
            HttpError::Status {
                status: 401 | 403, ..
            } => ErrorCode::LicenseKeyInvalid,
            HttpError::Status { .. } | HttpError::Request(_) => ErrorCode::NetworkError,
        }
    }
}

/// Asynchronous HTTP operations used by geocoding and XTRA downloads.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs an async HTTP GET request and returns the body.
    fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, HttpError>> + Send;

    /// Performs an async HTTP GET request with extra headers.
    fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Vec<u8>, HttpError>> + Send;
}

/// HTTP client backed by reqwest.
#[derive(Clone)]
pub struct AsyncReqwestClient {
    client: reqwest::Client,
}

impl AsyncReqwestClient {
    pub fn new() -> Result<Self, HttpError> {
        Self::with_timeout(DEFAULT_HTTP_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()
            .map_err(|e| HttpError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    async fn send(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Vec<u8>, HttpError> {
        trace!(url = url, "HTTP GET request starting");

        let response = match request.send().await {
            Ok(resp) => {
                debug!(url = url, status = resp.status().as_u16(), "HTTP response received");
                resp
            }
            Err(e) => {
                warn!(
                    url = url,
                    error = %e,
                    is_connect = e.is_connect(),
                    is_timeout = e.is_timeout(),
                    "HTTP request failed"
                );
                if e.is_timeout() {
                    return Err(HttpError::Timeout(url.to_string()));
                }
                return Err(HttpError::Request(e.to_string()));
            }
        };

        if !response.status().is_success() {
            warn!(url = url, status = response.status().as_u16(), "HTTP error status");
            return Err(HttpError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        response
            .bytes()
            .await
            .map(|b| b.to_vec())
            .map_err(|e| HttpError::Request(format!("Failed to read response: {}", e)))
    }
}

impl AsyncHttpClient for AsyncReqwestClient {
    async fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.send(self.client.get(url), url).await
    }

    async fn get_with_headers(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<Vec<u8>, HttpError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }
        self.send(request, url).await
    }
}
