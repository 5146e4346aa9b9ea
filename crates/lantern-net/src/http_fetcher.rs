//! reqwest-backed fetcher for real origins.

use std::time::Duration;

use async_trait::async_trait;
use lantern_common::NetworkConfig;
use reqwest::Client;
use tracing::{debug, info, trace};

use crate::{Fetcher, NetError, Request, Response, ResponseSource};

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Default timeout.
    pub timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self::from(&NetworkConfig::default())
    }
}

impl From<&NetworkConfig> for LoaderConfig {
    fn from(config: &NetworkConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_redirects: 10,
        }
    }
}

/// Fetches over HTTP(S) with reqwest.
pub struct HttpFetcher {
    client: Client,
    config: LoaderConfig,
}

impl HttpFetcher {
    /// Create a new fetcher.
    pub fn new(config: LoaderConfig) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(user_agent = %config.user_agent, "HttpFetcher initialized");

        Ok(Self { client, config })
    }

    fn map_error(&self, err: reqwest::Error) -> NetError {
        if err.is_timeout() {
            NetError::Timeout(self.config.timeout)
        } else if err.is_connect() {
            NetError::Offline(err.to_string())
        } else {
            NetError::HttpError(err)
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        let response = req_builder.send().await.map_err(|e| self.map_error(e))?;

        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();

        let body = response.bytes().await.map_err(|e| self.map_error(e))?;

        trace!(
            url = %url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        Ok(Response {
            url,
            status,
            headers,
            body,
            source: ResponseSource::Network,
        })
    }
}
