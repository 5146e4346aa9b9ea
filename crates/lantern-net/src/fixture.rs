//! Scripted fetcher serving a fixed route table.
//!
//! Lets the agent run without a live origin, which is how the agent crates
//! test their offline paths. Routes can be swapped at runtime and the whole
//! fetcher can be taken offline, which makes every fetch reject.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use hashbrown::HashMap;
use http::{header, HeaderValue, StatusCode};
use tracing::trace;

use crate::{Fetcher, NetError, Request, Response};

#[derive(Debug, Clone)]
struct Route {
    status: StatusCode,
    content_type: Option<&'static str>,
    body: Bytes,
}

/// In-memory fetcher with an offline switch.
#[derive(Debug, Default)]
pub struct StaticFetcher {
    routes: Mutex<HashMap<String, Route>>,
    offline: AtomicBool,
    latency: Mutex<Option<Duration>>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` with status 200 at `url`.
    pub fn with_page(self, url: &str, body: impl Into<Bytes>) -> Self {
        self.set_route(url, StatusCode::OK, body);
        self
    }

    /// Replace the response for `url`.
    pub fn set_route(&self, url: &str, status: StatusCode, body: impl Into<Bytes>) {
        let route = Route {
            status,
            content_type: guess_content_type(url),
            body: body.into(),
        };
        self.lock_routes().insert(normalize(url), route);
    }

    pub fn remove_route(&self, url: &str) {
        self.lock_routes().remove(&normalize(url));
    }

    /// Make every subsequent fetch reject (or resolve again).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn is_offline(&self) -> bool {
        self.offline.load(Ordering::SeqCst)
    }

    /// Delay every fetch by `latency` before it resolves or rejects.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    /// Number of fetches issued so far.
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn lock_routes(&self) -> std::sync::MutexGuard<'_, HashMap<String, Route>> {
        self.routes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let latency = self.latency.lock().ok().and_then(|guard| *guard);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        if self.is_offline() {
            return Err(NetError::Offline(format!("{} (offline)", request.url)));
        }

        let route = self.lock_routes().get(&normalize(request.url.as_str())).cloned();
        trace!(url = %request.url, hit = route.is_some(), "Static fetch");

        let response = match route {
            Some(route) => {
                let mut response = Response::new(request.url.clone(), route.status, route.body);
                if let Some(content_type) = route.content_type {
                    response
                        .headers
                        .insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
                }
                response
            }
            None => Response::new(request.url.clone(), StatusCode::NOT_FOUND, "Not Found"),
        };
        Ok(response)
    }
}

fn normalize(url: &str) -> String {
    match url.split_once('#') {
        Some((base, _)) => base.to_string(),
        None => url.to_string(),
    }
}

fn guess_content_type(url: &str) -> Option<&'static str> {
    let path = normalize(url);
    let ext = path.rsplit_once('.').map(|(_, ext)| ext);
    match ext {
        Some("html") => Some("text/html; charset=utf-8"),
        Some("css") => Some("text/css"),
        Some("js") => Some("application/javascript"),
        Some("json") => Some("application/json"),
        Some("png") => Some("image/png"),
        Some("svg") => Some("image/svg+xml"),
        _ if path.ends_with('/') => Some("text/html; charset=utf-8"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_serves_routes_and_404() {
        let fetcher = StaticFetcher::new().with_page("https://site.test/index.html", "<h1>Home</h1>");

        let hit = fetcher
            .fetch(&Request::parse("https://site.test/index.html").unwrap())
            .await
            .unwrap();
        assert!(hit.ok());
        assert_eq!(hit.text().unwrap(), "<h1>Home</h1>");
        assert_eq!(hit.content_type(), Some("text/html; charset=utf-8"));

        let miss = fetcher
            .fetch(&Request::parse("https://site.test/missing.css").unwrap())
            .await
            .unwrap();
        assert_eq!(miss.status, StatusCode::NOT_FOUND);
        assert_eq!(fetcher.request_count(), 2);
    }

    #[tokio::test]
    async fn test_offline_rejects() {
        let fetcher = StaticFetcher::new().with_page("https://site.test/", "root");
        fetcher.set_offline(true);

        let result = fetcher
            .fetch(&Request::parse("https://site.test/").unwrap())
            .await;
        assert!(matches!(result, Err(NetError::Offline(_))));

        fetcher.set_offline(false);
        assert!(fetcher
            .fetch(&Request::parse("https://site.test/").unwrap())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_fragment_ignored() {
        let fetcher = StaticFetcher::new().with_page("https://site.test/ch01.html", "chapter");
        let response = fetcher
            .fetch(&Request::parse("https://site.test/ch01.html#intro").unwrap())
            .await
            .unwrap();
        assert!(response.ok());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("https://a.test/app.js"), Some("application/javascript"));
        assert_eq!(guess_content_type("https://a.test/"), Some("text/html; charset=utf-8"));
        assert_eq!(guess_content_type("https://a.test/LICENSE"), None);
    }
}
