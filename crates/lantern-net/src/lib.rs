//! # Lantern Net
//!
//! Request and response model plus the network side of the offline agent.
//!
//! ## Design Goals
//!
//! 1. **One seam**: everything that touches the network goes through [`Fetcher`]
//! 2. **Snapshot responses**: bodies are fully buffered so they can be cached and cloned
//! 3. **Scriptable**: [`StaticFetcher`] serves a fixed route table and can be taken offline

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use url::Url;

pub mod fixture;
pub mod http_fetcher;

pub use fixture::StaticFetcher;
pub use http_fetcher::{HttpFetcher, LoaderConfig};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Unique identifier for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl RequestId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// Request mode, as reported by the host for an intercepted fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    /// Loading a full document.
    Navigate,
    SameOrigin,
    #[default]
    NoCors,
    Cors,
}

/// HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub mode: RequestMode,
}

impl Request {
    /// Create a GET request for a subresource.
    pub fn get(url: Url) -> Self {
        Self {
            id: RequestId::new(),
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            mode: RequestMode::default(),
        }
    }

    /// Create a GET navigation request.
    pub fn navigate(url: Url) -> Self {
        Self::get(url).mode(RequestMode::Navigate)
    }

    /// Parse a URL and create a GET request for it.
    pub fn parse(url: &str) -> Result<Self, NetError> {
        let url = Url::parse(url).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        Ok(Self::get(url))
    }

    /// Set the method.
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the mode.
    pub fn mode(mut self, mode: RequestMode) -> Self {
        self.mode = mode;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn is_navigation(&self) -> bool {
        self.mode == RequestMode::Navigate
    }

    /// Whether the URL scheme is http or https.
    pub fn is_http(&self) -> bool {
        matches!(self.url.scheme(), "http" | "https")
    }
}

/// Where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
}

/// HTTP response with a fully buffered body.
#[derive(Debug, Clone)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub source: ResponseSource,
}

impl Response {
    /// Build a network response.
    pub fn new(url: Url, status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            body: body.into(),
            source: ResponseSource::Network,
        }
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    pub fn from_cache(&self) -> bool {
        self.source == ResponseSource::Cache
    }

    /// Get the body as text.
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Get the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.body).map_err(|e| NetError::RequestFailed(e.to_string()))
    }

    /// Content-Type header, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// The network collaborator: issues a request and resolves with a response,
/// or rejects on transport failure.
///
/// A resolved response may still be non-ok (404, 500, ...); only transport
/// failures are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let url = Url::parse("https://example.com/book/ch01.html").unwrap();
        let request = Request::navigate(url.clone()).header(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("text/html"),
        );

        assert_eq!(request.url, url);
        assert_eq!(request.method, Method::GET);
        assert!(request.is_navigation());
        assert!(request.headers.contains_key("accept"));
    }

    #[test]
    fn test_request_id_uniqueness() {
        let id1 = RequestId::new();
        let id2 = RequestId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_is_http() {
        assert!(Request::parse("http://example.com/").unwrap().is_http());
        assert!(Request::parse("https://example.com/").unwrap().is_http());
        assert!(!Request::parse("chrome-extension://abc/script.js")
            .unwrap()
            .is_http());
        assert!(!Request::parse("data:text/plain,hi").unwrap().is_http());
    }

    #[test]
    fn test_parse_invalid_url() {
        assert!(matches!(
            Request::parse("not a url"),
            Err(NetError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_response_ok() {
        let url = Url::parse("https://example.com/").unwrap();
        assert!(Response::new(url.clone(), StatusCode::OK, "").ok());
        assert!(Response::new(url.clone(), StatusCode::NO_CONTENT, "").ok());
        assert!(!Response::new(url.clone(), StatusCode::NOT_FOUND, "").ok());
        assert!(!Response::new(url, StatusCode::INTERNAL_SERVER_ERROR, "").ok());
    }

    #[test]
    fn test_response_text_and_json() {
        let url = Url::parse("https://example.com/manifest.json").unwrap();
        let response = Response::new(url, StatusCode::OK, r#"{"name":"Rust Tutorial"}"#);
        assert_eq!(response.text().unwrap(), r#"{"name":"Rust Tutorial"}"#);

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["name"], "Rust Tutorial");
        assert!(!response.from_cache());
    }
}
