//! Request classification.

use http::Method;
use lantern_net::Request;

/// How an intercepted request is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Network-first, cache fallback, index document as last resort.
    Navigation,
    /// Stale-while-revalidate from the runtime generation.
    Asset,
    /// Not ours: left to default network handling.
    Passthrough,
}

/// Classify a request. Only GET over http(s) is handled.
pub fn classify(request: &Request) -> Route {
    if request.method != Method::GET || !request.is_http() {
        return Route::Passthrough;
    }
    if request.is_navigation() {
        Route::Navigation
    } else {
        Route::Asset
    }
}
